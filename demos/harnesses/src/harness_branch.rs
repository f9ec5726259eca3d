//! Finds the input `FUZZ` through branch coverage alone.

#[macro_use]
mod common;

use std::cell::RefCell;
use std::rc::Rc;

use covbridge::{EventHooks, HostException, Proc, Value};

fn main() -> anyhow::Result<()> {
    let hooks = Rc::new(RefCell::new(EventHooks::new()));

    let rt = Rc::clone(&hooks);
    let test_one_input = Proc::new(move |data| {
        let mut rt = rt.borrow_mut();
        if branch!(rt, data.len() == 4)
            && branch!(rt, data[0] == b'F')
            && branch!(rt, data[1] == b'U')
            && branch!(rt, data[2] == b'Z')
            && branch!(rt, data[3] == b'Z')
        {
            return Err(HostException::runtime_error("TEST HARNESS BRANCH"));
        }
        Ok(Value::Int(0))
    });

    common::run("harness_branch", &hooks, test_one_input.into())
}
