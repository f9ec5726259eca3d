//! The native fuzzing engine behind the bridge.
//!
//! [`Engine`] is the narrow surface the bridge needs from a libFuzzer-style
//! driver: run the fuzzing loop, accept software coverage tables and receive
//! value-profile events. [`LibFuzzer`] implements it by resolving libFuzzer's
//! symbols from the running process, so the bridge can be built and loaded
//! without libFuzzer and report its absence instead of failing to link.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::argv::Argv;
use crate::constants::{
    COUNTERS_INIT_SYMBOL, PCS_INIT_SYMBOL, RUN_DRIVER_SYMBOL, TRACE_CMP8_SYMBOL,
    TRACE_DIV8_SYMBOL,
};
use crate::coverage::CoverageMap;
use crate::error::{BridgeError, Result};

/// The per-input callback handed to the native run loop.
///
/// Uses the `C-unwind` ABI: a fuzz target that fails unwinds through the
/// native frames back into the bridge instead of aborting the process.
pub type TestOneInput = unsafe extern "C-unwind" fn(data: *const u8, size: usize) -> c_int;

type RunDriverFn = unsafe extern "C-unwind" fn(
    argc: *mut c_int,
    argv: *mut *mut *mut c_char,
    callback: TestOneInput,
) -> c_int;
type CountersInitFn = unsafe extern "C" fn(start: *mut u8, stop: *mut u8);
type PcsInitFn = unsafe extern "C" fn(start: *const usize, end: *const usize);
type TraceCmp8Fn = unsafe extern "C" fn(arg1: u64, arg2: u64);
type TraceDiv8Fn = unsafe extern "C" fn(val: u64);

/// A libFuzzer-compatible native driver.
pub trait Engine {
    /// Whether the run loop entry point is available.
    fn is_loaded(&self) -> bool;

    /// Runs the fuzzing loop until the driver decides to stop and returns its
    /// exit code. `test_one_input` is invoked once per generated input.
    fn run_driver(&self, argv: &mut Argv, test_one_input: TestOneInput) -> Result<c_int>;

    /// Publishes `map`'s counter and PC ranges to the driver. The driver
    /// keeps reading them for the rest of the process.
    fn register_coverage(&self, map: &Arc<CoverageMap>) -> Result<()>;

    fn trace_cmp8(&self, arg1: u64, arg2: u64);

    fn trace_div8(&self, val: u64);
}

/// Looks `name` up in the global symbol table of the running process.
pub fn lookup_symbol(name: &str) -> Option<NonNull<c_void>> {
    let name = CString::new(name).ok()?;
    unsafe {
        let handle = libc::dlopen(std::ptr::null(), libc::RTLD_LAZY);
        if handle.is_null() {
            return None;
        }
        let sym = libc::dlsym(handle, name.as_ptr());
        // The main program's handle is never unloaded, so `sym` outlives it.
        libc::dlclose(handle);
        NonNull::new(sym)
    }
}

/// libFuzzer, resolved from the current process.
pub struct LibFuzzer {
    run_driver: Option<RunDriverFn>,
    counters_init: Option<CountersInitFn>,
    pcs_init: Option<PcsInitFn>,
    trace_cmp8: Option<TraceCmp8Fn>,
    trace_div8: Option<TraceDiv8Fn>,
    /// Every map ever published; the driver holds raw pointers into them.
    published: Mutex<Vec<Arc<CoverageMap>>>,
}

impl LibFuzzer {
    /// Resolves whichever libFuzzer symbols the process carries.
    pub fn resolve() -> Self {
        // SAFETY: each symbol is libFuzzer's public C entry point with the
        // signature declared by the matching type alias.
        unsafe {
            Self {
                run_driver: lookup_symbol(RUN_DRIVER_SYMBOL)
                    .map(|p| std::mem::transmute::<*mut c_void, RunDriverFn>(p.as_ptr())),
                counters_init: lookup_symbol(COUNTERS_INIT_SYMBOL)
                    .map(|p| std::mem::transmute::<*mut c_void, CountersInitFn>(p.as_ptr())),
                pcs_init: lookup_symbol(PCS_INIT_SYMBOL)
                    .map(|p| std::mem::transmute::<*mut c_void, PcsInitFn>(p.as_ptr())),
                trace_cmp8: lookup_symbol(TRACE_CMP8_SYMBOL)
                    .map(|p| std::mem::transmute::<*mut c_void, TraceCmp8Fn>(p.as_ptr())),
                trace_div8: lookup_symbol(TRACE_DIV8_SYMBOL)
                    .map(|p| std::mem::transmute::<*mut c_void, TraceDiv8Fn>(p.as_ptr())),
                published: Mutex::new(Vec::new()),
            }
        }
    }
}

impl Engine for LibFuzzer {
    fn is_loaded(&self) -> bool {
        self.run_driver.is_some()
    }

    fn run_driver(&self, argv: &mut Argv, test_one_input: TestOneInput) -> Result<c_int> {
        let run = self.run_driver.ok_or(BridgeError::EnvironmentUnavailable {
            symbol: RUN_DRIVER_SYMBOL,
        })?;
        let mut argc = argv.argc();
        let mut argv_ptr = argv.as_mut_ptr();
        // SAFETY: `argv` stays alive and null-terminated for the whole call.
        Ok(unsafe { run(&mut argc, &mut argv_ptr, test_one_input) })
    }

    fn register_coverage(&self, map: &Arc<CoverageMap>) -> Result<()> {
        let counters_init = self.counters_init.ok_or(BridgeError::EnvironmentUnavailable {
            symbol: COUNTERS_INIT_SYMBOL,
        })?;
        let pcs_init = self.pcs_init.ok_or(BridgeError::EnvironmentUnavailable {
            symbol: PCS_INIT_SYMBOL,
        })?;

        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::clone(map));

        let (counters_start, counters_stop) = map.counters_range();
        let (pcs_start, pcs_end) = map.pcs_range();
        // SAFETY: both ranges belong to a map kept alive by `published`.
        unsafe {
            counters_init(counters_start, counters_stop);
            pcs_init(pcs_start, pcs_end);
        }
        Ok(())
    }

    fn trace_cmp8(&self, arg1: u64, arg2: u64) {
        if let Some(hook) = self.trace_cmp8 {
            unsafe { hook(arg1, arg2) }
        }
    }

    fn trace_div8(&self, val: u64) {
        if let Some(hook) = self.trace_div8 {
            unsafe { hook(val) }
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! An in-memory engine that replays canned inputs.

    use super::*;
    use std::cell::RefCell;
    use std::ffi::CStr;

    #[derive(Default)]
    pub struct ScriptedEngine {
        pub loaded: bool,
        pub inputs: Vec<Vec<u8>>,
        pub exit_code: c_int,
        pub seen_argv: RefCell<Vec<String>>,
        pub signals: RefCell<Vec<c_int>>,
        pub registered: RefCell<Vec<usize>>,
        pub cmp8: RefCell<Vec<(u64, u64)>>,
        pub div8: RefCell<Vec<u64>>,
    }

    impl ScriptedEngine {
        pub fn new(inputs: &[&[u8]]) -> Self {
            Self {
                loaded: true,
                inputs: inputs.iter().map(|i| i.to_vec()).collect(),
                ..Default::default()
            }
        }
    }

    impl Engine for ScriptedEngine {
        fn is_loaded(&self) -> bool {
            self.loaded
        }

        fn run_driver(&self, argv: &mut Argv, test_one_input: TestOneInput) -> Result<c_int> {
            if !self.loaded {
                return Err(BridgeError::EnvironmentUnavailable {
                    symbol: RUN_DRIVER_SYMBOL,
                });
            }
            *self.seen_argv.borrow_mut() = argv.as_slots()[..argv.len()]
                .iter()
                .map(|p| unsafe { CStr::from_ptr(*p) }.to_string_lossy().into_owned())
                .collect();
            for input in &self.inputs {
                let signal = unsafe { test_one_input(input.as_ptr(), input.len()) };
                self.signals.borrow_mut().push(signal);
            }
            Ok(self.exit_code)
        }

        fn register_coverage(&self, map: &Arc<CoverageMap>) -> Result<()> {
            self.registered.borrow_mut().push(map.capacity());
            Ok(())
        }

        fn trace_cmp8(&self, arg1: u64, arg2: u64) {
            self.cmp8.borrow_mut().push((arg1, arg2));
        }

        fn trace_div8(&self, val: u64) {
            self.div8.borrow_mut().push(val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_does_not_carry_libfuzzer() {
        let engine = LibFuzzer::resolve();
        assert!(!engine.is_loaded());
    }

    #[test]
    fn missing_driver_is_reported_not_fatal() {
        let engine = LibFuzzer::resolve();
        let mut argv = Argv::new(&["prog"], 4).unwrap();

        unsafe extern "C-unwind" fn never(_: *const u8, _: usize) -> c_int {
            unreachable!("no driver, no inputs")
        }

        let err = engine.run_driver(&mut argv, never).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::EnvironmentUnavailable { symbol } if symbol == RUN_DRIVER_SYMBOL
        ));
        assert!(engine.register_coverage(&Arc::new(CoverageMap::new(4))).is_err());

        // Forwarders silently do nothing.
        engine.trace_cmp8(1, 2);
        engine.trace_div8(3);
    }

    #[test]
    fn lookup_finds_libc_symbols() {
        assert!(lookup_symbol("malloc").is_some());
        assert!(lookup_symbol("definitely_not_a_symbol_in_this_process").is_none());
        assert!(lookup_symbol("bad\0name").is_none());
    }
}
