//! A forked fuzz session that interrupts itself.
//!
//! The child stands in for a libFuzzer process: its engine registers an
//! `atexit` hook that ends the process with libFuzzer's crash exit code, the
//! way libFuzzer does, and then replays inputs through the trampoline. The
//! fuzz target raises SIGINT on the [`INTERRUPT_AT`]th input.

use std::ffi::c_int;
use std::os::fd::RawFd;
use std::sync::Arc;

use covbridge::argv::Argv;
use covbridge::config::HandledSignal;
use covbridge::constants::LIBFUZZER_ERROR_EXITCODE;
use covbridge::coverage::CoverageMap;
use covbridge::engine::{Engine, TestOneInput};
use covbridge::lifecycle::{self, Phase, ShutdownHooks};
use covbridge::{Bridge, BridgeConfig, Proc, Value};

pub const INPUTS: usize = 10;
pub const INTERRUPT_AT: usize = 3;

extern "C" fn driver_exit_hook() {
    unsafe { libc::_exit(LIBFUZZER_ERROR_EXITCODE) }
}

/// Feeds a fixed number of inputs through the trampoline.
struct Replay;

impl Engine for Replay {
    fn is_loaded(&self) -> bool {
        true
    }

    fn run_driver(&self, _argv: &mut Argv, test_one_input: TestOneInput) -> covbridge::Result<c_int> {
        unsafe { libc::atexit(driver_exit_hook) };
        for i in 0..INPUTS {
            let input = [i as u8];
            unsafe { test_one_input(input.as_ptr(), input.len()) };
        }
        Ok(0)
    }

    fn register_coverage(&self, _map: &Arc<CoverageMap>) -> covbridge::Result<()> {
        Ok(())
    }

    fn trace_cmp8(&self, _arg1: u64, _arg2: u64) {}

    fn trace_div8(&self, _val: u64) {}
}

fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as c_int; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    (fds[0], fds[1])
}

fn read_all(fd: RawFd) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            break;
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
    unsafe { libc::close(fd) };
    out
}

fn run_child(calls_fd: RawFd, hooks: ShutdownHooks) -> ! {
    let status = (|| -> covbridge::Result<()> {
        lifecycle::install(&[HandledSignal::Interrupt], hooks)?;
        assert_eq!(lifecycle::phase(), Phase::Running);

        let bridge = Bridge::new(Replay, BridgeConfig::default())?;
        let calls = std::cell::Cell::new(0usize);
        let test_one_input = Value::from(Proc::new(move |_data| {
            unsafe { libc::write(calls_fd, b"x".as_ptr().cast(), 1) };
            calls.set(calls.get() + 1);
            if calls.get() == INTERRUPT_AT {
                unsafe { libc::raise(libc::SIGINT) };
            }
            Ok(Value::Nil)
        }));
        bridge.fuzz(&test_one_input, &["lifecycle-test"])?;
        Ok(())
    })();

    // Reaching this point means the signal did not end the process.
    let code = if status.is_ok() { 100 } else { 101 };
    unsafe { libc::_exit(code) }
}

/// What the parent observed of an interrupted child.
pub struct Outcome {
    pub exit_code: c_int,
    pub calls: usize,
    pub stderr: String,
}

/// Runs an interrupted session in a forked child with `hooks` installed.
pub fn interrupted_session(hooks: ShutdownHooks) -> Outcome {
    let (calls_read, calls_write) = pipe();
    let (err_read, err_write) = pipe();

    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        unsafe {
            libc::close(calls_read);
            libc::close(err_read);
            libc::dup2(err_write, libc::STDERR_FILENO);
        }
        run_child(calls_write, hooks);
    }

    unsafe {
        libc::close(calls_write);
        libc::close(err_write);
    }
    let calls = read_all(calls_read);
    let stderr = read_all(err_read);

    let mut status: c_int = 0;
    assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
    assert!(libc::WIFEXITED(status), "child did not exit normally: {status:#x}");

    Outcome {
        exit_code: libc::WEXITSTATUS(status),
        calls: calls.len(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}
