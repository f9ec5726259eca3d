//! Pieces shared by the demo harnesses.

// Each harness uses a subset.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use covbridge::{EventHooks, Value};
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

/// Reports a branch to `$rt` when `$cond` holds, keyed by the call site.
macro_rules! branch {
    ($rt:expr, $cond:expr) => {
        if $cond {
            $rt.branch_at(file!(), line!());
            true
        } else {
            false
        }
    };
}

/// Bounded runs that never write crash artifacts, plus anything passed on
/// the command line.
pub fn fuzz_args(program: &str) -> Vec<String> {
    let mut args = vec![
        program.to_string(),
        "-max_total_time=30".to_string(),
        "-exact_artifact_path=/dev/null".to_string(),
    ];
    args.extend(covbridge::default_args().into_iter().skip(1));
    args
}

/// Reads `data` as a big-endian unsigned integer, the way a host script
/// would hex-decode it. Empty input reads as zero.
pub fn host_integer(data: &[u8]) -> Value {
    let n = BigInt::from_bytes_be(Sign::Plus, data);
    match n.to_i64() {
        Some(small) => Value::Int(small),
        None => Value::BigInt(n),
    }
}

/// Enables branch tracing on `hooks`, runs `test_one_input` and exits with
/// libFuzzer's exit code.
pub fn run(
    program: &str,
    hooks: &Rc<RefCell<EventHooks>>,
    test_one_input: Value,
) -> anyhow::Result<()> {
    covbridge::trace_branch(&mut *hooks.borrow_mut())?;
    let code = covbridge::fuzz(&test_one_input, &fuzz_args(program))?;
    std::process::exit(code)
}
