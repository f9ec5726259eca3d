//! The driver bridge: runs a host fuzz target under the native driver.
//!
//! The native run loop only knows a C callback of the shape
//! `int (*)(const uint8_t *data, size_t size)`, with no user data pointer.
//! The bridge keeps the host callback in a per-thread slot for the duration
//! of [`Bridge::fuzz`], and a trampoline looks it up for every input.
//!
//! Concurrent or nested fuzz sessions are not supported: a second `fuzz`
//! call on the same thread overwrites the active callback.

use slog::{Logger, debug, error, info, warn};
use std::cell::RefCell;
use std::ffi::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use num_traits::ToPrimitive;

use crate::argv::Argv;
use crate::config::BridgeConfig;
use crate::constants::ACCEPT_INPUT;
use crate::coverage::CoverageMap;
use crate::engine::Engine;
use crate::error::{BridgeError, Result};
use crate::logging::discard_logger;
use crate::recorder::BranchRecorder;
use crate::runtime::{CoverageMode, HostRuntime};
use crate::value::{Proc, Value};
use crate::value_profile::native_operand;

thread_local! {
    static ACTIVE_CALLBACK: RefCell<Option<Proc>> = const { RefCell::new(None) };
}

/// Holds the callback in the active slot; clears the slot on drop, including
/// when the run is aborted by an unwinding fuzz target.
struct ActiveCallback;

impl ActiveCallback {
    fn set(callback: Proc) -> Self {
        ACTIVE_CALLBACK.with(|slot| *slot.borrow_mut() = Some(callback));
        ActiveCallback
    }
}

impl Drop for ActiveCallback {
    fn drop(&mut self) {
        ACTIVE_CALLBACK.with(|slot| slot.borrow_mut().take());
    }
}

/// Translates a fuzz target's return value into the driver's per-input signal.
///
/// `nil` accepts the input, so callbacks need not return anything. Integers
/// are forwarded as-is: 0 keeps the input eligible for the corpus, -1 asks
/// libFuzzer to reject it.
pub fn input_signal(result: &Value) -> Result<c_int> {
    match result {
        Value::Nil => Ok(ACCEPT_INPUT),
        Value::Int(i) => c_int::try_from(*i).map_err(|_| out_of_range(result)),
        Value::BigInt(i) => i.to_i32().ok_or_else(|| out_of_range(result)),
        _ => Err(BridgeError::TypeMismatch(
            "fuzz target function did not return an integer or nil".into(),
        )),
    }
}

fn out_of_range(result: &Value) -> BridgeError {
    BridgeError::TypeMismatch(format!(
        "fuzz target returned {result:?}, which does not fit in a C int"
    ))
}

/// Called by the native driver for every input.
unsafe extern "C-unwind" fn test_one_input(data: *const u8, size: usize) -> c_int {
    // Copy out of the driver's buffer: the host owns its strings.
    let input = if size == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(data, size) }.to_vec()
    };

    let Some(callback) = ACTIVE_CALLBACK.with(|slot| slot.borrow().clone()) else {
        abort_run(BridgeError::InvalidArgument(
            "the native driver produced an input outside of a fuzz session".into(),
        ))
    };

    let outcome = callback
        .call(&input)
        .map_err(BridgeError::Raised)
        .and_then(|result| input_signal(&result));

    match outcome {
        Ok(signal) => signal,
        Err(err) => abort_run(err),
    }
}

/// Unwinds out of the native run loop back into [`Bridge::fuzz`].
fn abort_run(err: BridgeError) -> ! {
    panic::resume_unwind(Box::new(err))
}

/// Owns the coverage tables and the native engine for one process.
pub struct Bridge<E: Engine> {
    engine: E,
    config: BridgeConfig,
    coverage: Arc<CoverageMap>,
    trace_sessions: AtomicUsize,
    log: Logger,
}

impl<E: Engine> Bridge<E> {
    /// Creates a bridge over `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] if `config` fails validation.
    pub fn new(engine: E, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            coverage: Arc::new(CoverageMap::new(config.max_counters)),
            engine,
            config,
            trace_sessions: AtomicUsize::new(0),
            log: discard_logger(),
        })
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.log
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn coverage(&self) -> &Arc<CoverageMap> {
        &self.coverage
    }

    /// Runs `test_one_input` under the native driver with `args` as its
    /// command line and returns the driver's exit code.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::InvalidArgument`] if `test_one_input` is not a proc or
    ///   `args` cannot be marshalled. Nothing native has run at that point.
    /// * [`BridgeError::EnvironmentUnavailable`] if the process does not
    ///   carry the native driver.
    /// * [`BridgeError::TypeMismatch`] or [`BridgeError::Raised`] if the fuzz
    ///   target misbehaved. The run is abandoned mid-input; the driver still
    ///   considers that input in flight and reports it as a crash when the
    ///   process exits.
    pub fn fuzz<S: AsRef<str>>(&self, test_one_input_cb: &Value, args: &[S]) -> Result<i32> {
        let Value::Proc(callback) = test_one_input_cb else {
            return Err(BridgeError::InvalidArgument(format!(
                "expected a proc or lambda, got {}",
                test_one_input_cb.type_name()
            )));
        };
        let mut argv = Argv::new(args, self.config.max_args)?;

        let _active = ActiveCallback::set(callback.clone());
        info!(self.log, "starting native driver"; "argc" => argv.len());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.run_driver(&mut argv, test_one_input)
        }));

        match outcome {
            Ok(Ok(exit_code)) => {
                info!(self.log, "native driver finished"; "exit_code" => exit_code);
                Ok(exit_code)
            }
            Ok(Err(err)) => Err(err),
            Err(payload) => match payload.downcast::<BridgeError>() {
                Ok(err) => {
                    error!(self.log, "fuzz run aborted"; "error" => %err);
                    Err(*err)
                }
                Err(payload) => panic::resume_unwind(payload),
            },
        }
    }

    /// Starts branch coverage for host code.
    ///
    /// Publishes the counter and PC tables to the native driver, registers a
    /// fresh branch recorder with `runtime`, and enables the runtime's own
    /// branch coverage. Every later branch event bumps a counter.
    ///
    /// Calling this twice registers a second recorder over the same table.
    pub fn trace_branch(&self, runtime: &mut dyn HostRuntime) -> Result<()> {
        if self.trace_sessions.fetch_add(1, Ordering::SeqCst) > 0 {
            warn!(self.log, "branch tracing enabled more than once; hooks will be registered again");
        }

        self.engine.register_coverage(&self.coverage)?;
        debug!(self.log, "published coverage tables"; "counters" => self.coverage.capacity());

        let mut recorder = BranchRecorder::new(Arc::clone(&self.coverage));
        runtime.add_branch_hook(Box::new(move |location| {
            recorder.record_branch(location);
        }));
        runtime.enable_coverage(CoverageMode::Branches)
    }

    /// Enables branch tracing, then runs `harness` so that everything it
    /// executes is traced.
    pub fn trace<R, F>(&self, runtime: &mut dyn HostRuntime, harness: F) -> Result<R>
    where
        F: FnOnce(&mut dyn HostRuntime) -> R,
    {
        self.trace_branch(runtime)?;
        Ok(harness(runtime))
    }

    /// Forwards a comparison's operands to the native value profile. Operands
    /// that are not 64-bit integers are ignored.
    pub fn trace_cmp8(&self, arg1: &Value, arg2: &Value) {
        let policy = self.config.big_integer_operands;
        if let (Some(a), Some(b)) = (native_operand(arg1, policy), native_operand(arg2, policy)) {
            self.engine.trace_cmp8(a, b);
        }
    }

    /// Forwards a division operand to the native value profile. Operands that
    /// are not 64-bit integers are ignored.
    pub fn trace_div8(&self, val: &Value) {
        if let Some(v) = native_operand(val, self.config.big_integer_operands) {
            self.engine.trace_div8(v);
        }
    }
}
