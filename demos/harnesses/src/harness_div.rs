//! Finds a zero divisor by forwarding division operands to the value profile.

#[macro_use]
mod common;

use std::cell::RefCell;
use std::rc::Rc;

use covbridge::{EventHooks, HostException, Proc, Value};

fn main() -> anyhow::Result<()> {
    let hooks = Rc::new(RefCell::new(EventHooks::new()));

    let rt = Rc::clone(&hooks);
    let test_one_input = Proc::new(move |data| {
        let divisor = common::host_integer(data);
        covbridge::trace_div8(&divisor);
        if branch!(rt.borrow_mut(), matches!(divisor, Value::Int(0))) {
            return Err(HostException::runtime_error("TEST HARNESS DIV"));
        }
        Ok(Value::Int(0))
    });

    common::run("harness_div", &hooks, test_one_input.into())
}
