//! This module defines constants used throughout the bridge.
//! These constants are related to the libFuzzer driver entry point, the
//! sanitizer coverage ABI and the default sizing of the bridge's tables.

/// The default number of argv slots handed to the native driver, including
/// the terminating null pointer.
pub const DEFAULT_MAX_ARGS: usize = 128;

/// The default number of 8-bit counters (and PC table entries) exposed to the
/// native driver for host-language branch coverage.
pub const DEFAULT_MAX_COUNTERS: usize = 8192;

/// The libFuzzer entry point used to run the fuzzing loop as a library.
/// See <https://llvm.org/docs/LibFuzzer.html#using-libfuzzer-as-a-library>.
pub const RUN_DRIVER_SYMBOL: &str = "LLVMFuzzerRunDriver";

/// Registers an inline 8-bit counter region with the native driver.
pub const COUNTERS_INIT_SYMBOL: &str = "__sanitizer_cov_8bit_counters_init";

/// Registers the PC table that parallels the counter region.
pub const PCS_INIT_SYMBOL: &str = "__sanitizer_cov_pcs_init";

/// Value-profile hook for 64-bit comparisons.
pub const TRACE_CMP8_SYMBOL: &str = "__sanitizer_cov_trace_cmp8";

/// Value-profile hook for 64-bit division operands.
pub const TRACE_DIV8_SYMBOL: &str = "__sanitizer_cov_trace_div8";

/// libFuzzer's default exit code when the fuzz target crashes or the run
/// otherwise ends with an error (`-error_exitcode`).
pub const LIBFUZZER_ERROR_EXITCODE: i32 = 77;

/// The per-input signal that keeps an input eligible for the corpus.
pub const ACCEPT_INPUT: i32 = 0;

/// The per-input signal that asks libFuzzer not to add the input to the corpus.
/// See <https://llvm.org/docs/LibFuzzer.html#rejecting-unwanted-inputs>.
pub const REJECT_INPUT: i32 = -1;
