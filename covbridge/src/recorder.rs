//! Branch-hit recording for host code.
//!
//! Each branch event carries the source location that executed. The first
//! time a location is seen it is assigned the next counter index; afterwards
//! the same index is reused, so a location maps to a stable counter slot for
//! the whole tracing session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::coverage::CoverageMap;

/// A host source location reported by a branch event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub path: String,
    pub line: u32,
}

impl Location {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

/// Lazily assigned, sequential counter indices per location.
#[derive(Debug, Default)]
pub struct LocationIndex {
    slots: HashMap<Location, usize>,
    cursor: usize,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `location`, assigning the next one on first sight.
    pub fn index_of(&mut self, location: &Location) -> usize {
        if let Some(&index) = self.slots.get(location) {
            return index;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.slots.insert(location.clone(), index);
        index
    }

    pub fn get(&self, location: &Location) -> Option<usize> {
        self.slots.get(location).copied()
    }

    /// Number of distinct locations seen so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Turns branch events into counter hits.
pub struct BranchRecorder {
    index: LocationIndex,
    map: Arc<CoverageMap>,
}

impl BranchRecorder {
    pub fn new(map: Arc<CoverageMap>) -> Self {
        Self {
            index: LocationIndex::new(),
            map,
        }
    }

    /// Records one execution of the branch at `location` and returns the
    /// counter index it maps to. Indices beyond the table's capacity alias
    /// earlier slots.
    pub fn record_branch(&mut self, location: &Location) -> usize {
        let index = self.index.index_of(location);
        self.map.hit(index);
        index
    }

    pub fn locations(&self) -> &LocationIndex {
        &self.index
    }
}
