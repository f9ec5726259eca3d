use thiserror::Error;

use crate::value::HostException;

/// Errors reported by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A call-time input was malformed: an empty or oversized argument
    /// vector, an argument with an interior NUL byte, a callback that cannot
    /// be invoked, or an invalid configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The fuzz target returned a value that is neither nil nor an integer
    /// the native driver understands.
    #[error("TypeError: {0}")]
    TypeMismatch(String),

    /// The fuzz target raised a host-language exception.
    #[error("{0}")]
    Raised(HostException),

    /// The process does not carry the native driver symbol that the
    /// operation needs.
    #[error("native fuzzing driver unavailable: symbol `{symbol}` not found in this process")]
    EnvironmentUnavailable { symbol: &'static str },

    /// A handled termination signal arrived. Only ever formatted by the
    /// lifecycle controller on its way out of the process.
    #[error("Signal {signal} ({name}) received. Exiting...")]
    FatalSignal { signal: i32, name: &'static str },
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
