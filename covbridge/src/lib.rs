//! Drive libFuzzer from a dynamically-typed host language.
//!
//! The bridge lets a host-language callback act as libFuzzer's fuzz target,
//! and feeds the native driver software coverage for host code that was never
//! compiled with sanitizer instrumentation:
//!
//! * branch events reported by the host runtime become hits in an 8-bit
//!   counter table published through the sanitizer coverage ABI;
//! * integer comparison and division operands are forwarded to libFuzzer's
//!   value-profile hooks.
//!
//! ## Getting Started
//!
//! The process must carry libFuzzer's symbols in its dynamic symbol table,
//! typically by linking `libclang_rt.fuzzer_no_main.a` with
//! `--whole-archive` and `--export-dynamic`. See `demos/harnesses/build.rs`.
//!
//! ```no_run
//! use covbridge::runtime::EventHooks;
//! use covbridge::value::{HostException, Proc, Value};
//!
//! let mut hooks = EventHooks::new();
//! covbridge::trace_branch(&mut hooks).expect("libFuzzer is linked in");
//!
//! let test_one_input = Value::from(Proc::new(|data| {
//!     if data == b"FUZZ" {
//!         return Err(HostException::runtime_error("found it"));
//!     }
//!     Ok(Value::Nil)
//! }));
//!
//! let exit_code = covbridge::fuzz(&test_one_input, &covbridge::default_args());
//! ```
//!
//! The module-level functions operate on one process-wide [`Bridge`]. It is
//! created on first use with the default [`BridgeConfig`], or explicitly with
//! [`init`]. Creating it installs the lifecycle signal handlers.

pub mod argv;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod coverage;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod recorder;
pub mod runtime;
pub mod value;
pub mod value_profile;

use once_cell::sync::OnceCell;
use slog::info;

pub use crate::bridge::Bridge;
pub use crate::config::BridgeConfig;
pub use crate::engine::{Engine, LibFuzzer};
pub use crate::error::{BridgeError, Result};
pub use crate::runtime::{EventHooks, HostRuntime};
pub use crate::value::{HostException, Proc, Value};

use crate::constants::RUN_DRIVER_SYMBOL;
use crate::lifecycle::ShutdownHooks;
use crate::logging::stderr_logger;

static NATIVE: OnceCell<Bridge<LibFuzzer>> = OnceCell::new();

/// Creates the process-wide bridge from `config`.
///
/// # Errors
///
/// Fails if `config` is invalid, if a signal handler cannot be installed, or
/// if the bridge already exists.
pub fn init(config: BridgeConfig) -> Result<&'static Bridge<LibFuzzer>> {
    let mut fresh = false;
    let bridge = NATIVE.get_or_try_init(|| {
        fresh = true;
        create(config)
    })?;
    if !fresh {
        return Err(BridgeError::InvalidArgument(
            "the process-wide bridge is already initialized".into(),
        ));
    }
    Ok(bridge)
}

fn create(config: BridgeConfig) -> Result<Bridge<LibFuzzer>> {
    let log = stderr_logger(config.log_level.into());
    let bridge = Bridge::new(LibFuzzer::resolve(), config)?.with_logger(log);
    lifecycle::install(&bridge.config().handled_signals, ShutdownHooks::standard())?;

    info!(bridge.logger(), "bridge initialized";
        "libfuzzer_loaded" => bridge.engine().is_loaded(),
        "max_counters" => bridge.config().max_counters);
    Ok(bridge)
}

fn native() -> Result<&'static Bridge<LibFuzzer>> {
    NATIVE.get_or_try_init(|| create(BridgeConfig::default()))
}

/// Runs `test_one_input` under libFuzzer with `args` as its command line and
/// returns libFuzzer's exit code. See [`Bridge::fuzz`].
pub fn fuzz<S: AsRef<str>>(test_one_input: &Value, args: &[S]) -> Result<i32> {
    native()?.fuzz(test_one_input, args)
}

/// Whether libFuzzer's run loop is present in this process.
pub fn libfuzzer_is_loaded() -> bool {
    engine::lookup_symbol(RUN_DRIVER_SYMBOL).is_some()
}

/// Enables branch coverage for host code reported through `runtime`.
/// See [`Bridge::trace_branch`].
pub fn trace_branch(runtime: &mut dyn HostRuntime) -> Result<()> {
    native()?.trace_branch(runtime)
}

/// Forwards a comparison's operands to libFuzzer's value profile.
pub fn trace_cmp8(arg1: &Value, arg2: &Value) {
    if let Ok(bridge) = native() {
        bridge.trace_cmp8(arg1, arg2);
    }
}

/// Forwards a division operand to libFuzzer's value profile.
pub fn trace_div8(val: &Value) {
    if let Ok(bridge) = native() {
        bridge.trace_div8(val);
    }
}

/// The process's own command line, program name first.
pub fn default_args() -> Vec<String> {
    std::env::args().collect()
}
