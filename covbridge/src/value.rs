//! Host-language values as seen by the bridge.
//!
//! The host is dynamically typed, so everything crossing the boundary is a
//! [`Value`]. Fuzz targets are [`Proc`]s: callables taking one byte string
//! and returning either a value or a raised [`HostException`].

use num_bigint::BigInt;
use std::fmt;
use std::rc::Rc;

/// A dynamically-typed host value.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// An integer of native width.
    Int(i64),
    /// An arbitrary-precision integer.
    BigInt(BigInt),
    Float(f64),
    /// A byte string. Host strings are not required to be valid UTF-8.
    Str(Vec<u8>),
    Proc(Proc),
}

impl Value {
    /// The host-facing name of this value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::BigInt(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Proc(_) => "proc",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Value::Proc(_) => f.write_str("#<proc>"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Value::BigInt(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(s: Vec<u8>) -> Self {
        Value::Str(s)
    }
}

impl From<Proc> for Value {
    fn from(p: Proc) -> Self {
        Value::Proc(p)
    }
}

/// An exception raised by host code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{class}: {message}")]
pub struct HostException {
    pub class: String,
    pub message: String,
}

impl HostException {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    /// The exception a bare `raise "message"` produces.
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }
}

type ProcBody = dyn Fn(&[u8]) -> Result<Value, HostException>;

/// An invocable host callback, shared by reference like host procs are.
#[derive(Clone)]
pub struct Proc {
    body: Rc<ProcBody>,
}

impl Proc {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Value, HostException> + 'static,
    {
        Self {
            body: Rc::new(body),
        }
    }

    /// Invokes the callback with a single byte-string argument.
    pub fn call(&self, data: &[u8]) -> Result<Value, HostException> {
        (self.body)(data)
    }
}
