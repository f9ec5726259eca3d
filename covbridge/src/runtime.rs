//! The seam between the bridge and the host runtime's own instrumentation.
//!
//! The bridge never walks host code itself. Instead the host runtime reports
//! branch executions to the listeners registered through [`HostRuntime`].

use crate::error::Result;
use crate::recorder::Location;

/// Granularity of the host runtime's built-in coverage facility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoverageMode {
    Lines,
    Branches,
}

/// A listener invoked on every branch-execution event.
pub type BranchHook = Box<dyn FnMut(&Location)>;

/// A host runtime able to report branch executions.
pub trait HostRuntime {
    /// Registers `hook` to be called for every branch event from now on.
    fn add_branch_hook(&mut self, hook: BranchHook);

    /// Enables the runtime's own coverage facility. Branch events are only
    /// delivered once branch granularity is enabled.
    fn enable_coverage(&mut self, mode: CoverageMode) -> Result<()>;
}

/// A [`HostRuntime`] for interpreters driven from Rust.
///
/// The interpreter calls [`EventHooks::branch`] whenever it takes a branch;
/// the event reaches every registered hook once branch coverage is enabled.
#[derive(Default)]
pub struct EventHooks {
    hooks: Vec<BranchHook>,
    mode: Option<CoverageMode>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a branch executed at `location`.
    pub fn branch(&mut self, location: &Location) {
        if self.mode != Some(CoverageMode::Branches) {
            return;
        }
        for hook in self.hooks.iter_mut() {
            hook(location);
        }
    }

    /// Convenience wrapper around [`EventHooks::branch`].
    pub fn branch_at(&mut self, path: &str, line: u32) {
        self.branch(&Location::new(path, line));
    }

    pub fn mode(&self) -> Option<CoverageMode> {
        self.mode
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

impl HostRuntime for EventHooks {
    fn add_branch_hook(&mut self, hook: BranchHook) {
        self.hooks.push(hook);
    }

    fn enable_coverage(&mut self, mode: CoverageMode) -> Result<()> {
        // Branch coverage implies line coverage; never downgrade.
        if self.mode != Some(CoverageMode::Branches) {
            self.mode = Some(mode);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn counting_hook(seen: &Rc<RefCell<Vec<Location>>>) -> BranchHook {
        let seen = Rc::clone(seen);
        Box::new(move |loc| seen.borrow_mut().push(loc.clone()))
    }

    #[test]
    fn events_are_dropped_until_branch_coverage_is_enabled() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = EventHooks::new();
        hooks.add_branch_hook(counting_hook(&seen));

        hooks.branch_at("a.rb", 1);
        hooks.enable_coverage(CoverageMode::Lines).unwrap();
        hooks.branch_at("a.rb", 2);
        assert!(seen.borrow().is_empty());

        hooks.enable_coverage(CoverageMode::Branches).unwrap();
        hooks.branch_at("a.rb", 3);
        assert_eq!(*seen.borrow(), vec![Location::new("a.rb", 3)]);
    }

    #[test]
    fn every_registered_hook_sees_each_event() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = EventHooks::new();
        hooks.add_branch_hook(counting_hook(&seen));
        hooks.add_branch_hook(counting_hook(&seen));
        hooks.enable_coverage(CoverageMode::Branches).unwrap();

        hooks.branch_at("a.rb", 9);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(hooks.hook_count(), 2);
    }

    #[test]
    fn branch_mode_is_not_downgraded() {
        let mut hooks = EventHooks::new();
        hooks.enable_coverage(CoverageMode::Branches).unwrap();
        hooks.enable_coverage(CoverageMode::Lines).unwrap();
        assert_eq!(hooks.mode(), Some(CoverageMode::Branches));
    }
}
