//! Marshalling of host argument lists into a native `argv`.

use std::ffi::{CString, c_char, c_int};
use std::ptr;

use crate::error::{BridgeError, Result};

/// A null-terminated native argument vector.
///
/// The pointers borrow from `CString`s owned by this value, so an `Argv` must
/// outlive every native call that receives it.
#[derive(Debug)]
pub struct Argv {
    _storage: Vec<CString>,
    ptrs: Vec<*mut c_char>,
}

impl Argv {
    /// Builds an argument vector from `args`.
    ///
    /// `args[0]` is conventionally the program name. `max_slots` counts the
    /// terminating null pointer, so at most `max_slots - 1` arguments fit.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] if `args` is empty, does not
    /// fit in `max_slots`, or contains an interior NUL byte.
    pub fn new<S: AsRef<str>>(args: &[S], max_slots: usize) -> Result<Self> {
        if args.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "zero arguments passed, we assume at least the program name is present".into(),
            ));
        }

        // Account for the null terminator
        if args.len() + 1 > max_slots {
            return Err(BridgeError::InvalidArgument(format!(
                "cannot specify {} or more arguments",
                max_slots
            )));
        }

        let storage = args
            .iter()
            .map(|arg| {
                CString::new(arg.as_ref()).map_err(|_| {
                    BridgeError::InvalidArgument(format!(
                        "argument {:?} contains a NUL byte",
                        arg.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut ptrs = Vec::with_capacity(storage.len() + 1);
        ptrs.extend(storage.iter().map(|s| s.as_ptr() as *mut c_char));
        ptrs.push(ptr::null_mut());

        Ok(Self {
            _storage: storage,
            ptrs,
        })
    }

    /// The number of arguments, not counting the terminator.
    pub fn len(&self) -> usize {
        self.ptrs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn argc(&self) -> c_int {
        // Bounded by `max_slots`, which is validated to fit in a c_int.
        self.len() as c_int
    }

    /// All slots, including the trailing null pointer.
    pub fn as_slots(&self) -> &[*mut c_char] {
        &self.ptrs
    }

    pub fn as_mut_ptr(&mut self) -> *mut *mut c_char {
        self.ptrs.as_mut_ptr()
    }
}
