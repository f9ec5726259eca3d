//! Conversion of host integers into value-profile operands.
//!
//! libFuzzer's `__sanitizer_cov_trace_cmp8`/`__sanitizer_cov_trace_div8`
//! take 64-bit operands. Host integers of native width always convert;
//! arbitrary-precision integers convert when they fit in an `i64`, and
//! otherwise follow the configured [`BigIntegerPolicy`].

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::config::BigIntegerPolicy;
use crate::value::Value;

/// The 64-bit operand for `value`, or `None` when it cannot be traced.
pub fn native_operand(value: &Value, policy: BigIntegerPolicy) -> Option<u64> {
    match value {
        Value::Int(i) => Some(*i as u64),
        Value::BigInt(i) => match i.to_i64() {
            Some(fits) => Some(fits as u64),
            None => match policy {
                BigIntegerPolicy::Ignore => None,
                BigIntegerPolicy::Truncate => Some(low_u64(i)),
            },
        },
        _ => None,
    }
}

/// The low 64 bits of `i` in two's complement.
fn low_u64(i: &BigInt) -> u64 {
    let low = i & BigInt::from(u64::MAX);
    // Masking with a positive value always yields a non-negative result.
    low.to_u64().unwrap_or_default()
}
