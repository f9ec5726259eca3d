//! Signal interception and exit-code propagation.
//!
//! libFuzzer registers an `atexit` hook that treats any process exit during
//! a run as "the fuzz target exited" and replaces the exit code. When a
//! handled signal arrives, the bridge therefore:
//!
//! 1. writes a diagnostic naming the signal to stderr,
//! 2. records the signal number as the exit code,
//! 3. runs its shutdown hooks straight from the handler.
//!
//! The standard terminal hook ends the process with `_exit`, so no `atexit`
//! hook, the driver's included, gets a chance to run. Only when every hook
//! lets shutdown continue does the handler fall back to `exit`.
//!
//! libFuzzer leaves signal handlers that already exist in place, so
//! [`install`] must run before the fuzzing loop starts.

use once_cell::sync::OnceCell;
use std::ffi::c_int;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use crate::config::HandledSignal;
use crate::error::{BridgeError, Result};

/// Where the process is in its shutdown sequence.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle = 0,
    Running = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Phase::Running,
            2 => Phase::ShuttingDown,
            3 => Phase::Terminated,
            _ => Phase::Idle,
        }
    }
}

static PHASE: AtomicU8 = AtomicU8::new(Phase::Idle as u8);
static EXIT_CODE: AtomicI32 = AtomicI32::new(0);
static HOOKS: OnceCell<ShutdownHooks> = OnceCell::new();

pub fn phase() -> Phase {
    Phase::from_u8(PHASE.load(Ordering::SeqCst))
}

/// Whether a shutdown hook lets process exit carry on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Run the next hook; once the list is exhausted, the process exits
    /// normally and its exit handlers (including the native driver's) run.
    Continue,
    /// The hook ended the process. Returned only by test doubles, since a
    /// real terminal hook never returns.
    Exit,
}

/// A hook run at shutdown with the recorded exit code. Runs in signal
/// context, so it must be async-signal-safe.
pub type ShutdownHook = fn(exit_code: i32) -> Flow;

/// Ordering of shutdown hooks; higher runs first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub u8);

impl Priority {
    /// Work that must happen before the process goes away.
    pub const FLUSH: Priority = Priority(200);
    /// The bridge's own exit, superseding the native driver's exit hook.
    pub const TERMINATE: Priority = Priority(100);
}

/// A priority-ordered list of shutdown hooks.
#[derive(Clone, Default)]
pub struct ShutdownHooks {
    hooks: Vec<(Priority, &'static str, ShutdownHook)>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bridge's standard sequence: terminate with the recorded code.
    pub fn standard() -> Self {
        let mut hooks = Self::new();
        hooks.register(Priority::TERMINATE, "terminate", terminate_process);
        hooks
    }

    /// Adds `hook`. Hooks of equal priority run in registration order.
    pub fn register(&mut self, priority: Priority, name: &'static str, hook: ShutdownHook) {
        let at = self
            .hooks
            .iter()
            .position(|(p, _, _)| *p < priority)
            .unwrap_or(self.hooks.len());
        self.hooks.insert(at, (priority, name, hook));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|(_, name, _)| *name).collect()
    }

    /// Runs hooks in priority order until one ends the process.
    pub fn run(&self, exit_code: i32) -> Flow {
        for (_, _, hook) in &self.hooks {
            if hook(exit_code) == Flow::Exit {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }
}

fn terminate_process(exit_code: i32) -> Flow {
    PHASE.store(Phase::Terminated as u8, Ordering::SeqCst);
    unsafe { libc::_exit(exit_code) }
}

/// Installs the signal handlers, moving the controller from `Idle` to
/// `Running`. Later calls are no-ops; the first hook list wins.
///
/// On failure every handler already replaced is restored and the controller
/// stays `Idle`.
pub fn install(signals: &[HandledSignal], hooks: ShutdownHooks) -> Result<()> {
    let numbers: Vec<c_int> = signals.iter().map(|s| s.number()).collect();
    install_handlers(&numbers, hooks)
}

fn install_handlers(signals: &[c_int], hooks: ShutdownHooks) -> Result<()> {
    if phase() != Phase::Idle {
        return Ok(());
    }
    let mut replaced: Vec<(c_int, libc::sigaction)> = Vec::with_capacity(signals.len());
    for &signal in signals {
        // SAFETY: `handle_signal` only performs async-signal-safe work, and
        // `previous` is a valid out-pointer.
        let installed = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            let mut previous: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handle_signal as extern "C" fn(c_int) as usize;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);
            let ok = libc::sigaction(signal, &action, &mut previous) == 0;
            if ok {
                replaced.push((signal, previous));
            }
            ok
        };
        if !installed {
            restore(&replaced);
            return Err(BridgeError::InvalidArgument(format!(
                "cannot install a handler for signal {signal} ({})",
                signal_name(signal)
            )));
        }
    }

    HOOKS.get_or_init(|| hooks);
    // A concurrent install may have won; its handlers are identical.
    let _ = PHASE.compare_exchange(
        Phase::Idle as u8,
        Phase::Running as u8,
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
    Ok(())
}

fn restore(replaced: &[(c_int, libc::sigaction)]) {
    for (signal, previous) in replaced.iter().rev() {
        unsafe {
            libc::sigaction(*signal, previous, std::ptr::null_mut());
        }
    }
}

extern "C" fn handle_signal(signal: c_int) {
    if PHASE
        .compare_exchange(
            Phase::Running as u8,
            Phase::ShuttingDown as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_err()
    {
        // Not installed yet, or already on the way out.
        unsafe { libc::_exit(signal) }
    }

    report_signal(signal);
    EXIT_CODE.store(signal, Ordering::SeqCst);

    if run_shutdown_hooks() == Flow::Continue {
        unsafe { libc::exit(signal) }
    }
}

fn run_shutdown_hooks() -> Flow {
    let exit_code = EXIT_CODE.load(Ordering::SeqCst);
    match HOOKS.get() {
        Some(hooks) => hooks.run(exit_code),
        None => Flow::Continue,
    }
}

/// A short, static description of `signal`.
pub fn signal_name(signal: c_int) -> &'static str {
    match signal {
        libc::SIGINT => "Interrupt",
        libc::SIGTERM => "Terminated",
        libc::SIGHUP => "Hangup",
        libc::SIGQUIT => "Quit",
        _ => "Unknown signal",
    }
}

/// Writes the shutdown diagnostic without allocating.
fn report_signal(signal: c_int) {
    let mut buf = StackBuf::<128>::new();
    let err = BridgeError::FatalSignal {
        signal,
        name: signal_name(signal),
    };
    let _ = writeln!(buf, "{err}");
    let bytes = buf.as_bytes();
    unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len());
    }
}

/// A fixed-size `fmt::Write` target that truncates on overflow.
struct StackBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> StackBuf<N> {
    fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl<const N: usize> fmt::Write for StackBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(N - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}
