//! Finds the input `FUZZ` by forwarding a 32-bit comparison to the value
//! profile.

#[macro_use]
mod common;

use std::cell::RefCell;
use std::rc::Rc;

use covbridge::{EventHooks, HostException, Proc, Value};

fn main() -> anyhow::Result<()> {
    let hooks = Rc::new(RefCell::new(EventHooks::new()));
    let target = common::host_integer(b"FUZZ");

    let rt = Rc::clone(&hooks);
    let test_one_input = Proc::new(move |data| {
        let input = common::host_integer(data);
        covbridge::trace_cmp8(&input, &target);
        let equal = matches!((&input, &target), (Value::Int(a), Value::Int(b)) if a == b);
        if branch!(rt.borrow_mut(), equal) {
            return Err(HostException::runtime_error("TEST HARNESS CMP"));
        }
        Ok(Value::Int(0))
    });

    common::run("harness_cmp", &hooks, test_one_input.into())
}
