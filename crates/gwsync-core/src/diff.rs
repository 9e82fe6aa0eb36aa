//! Set difference between desired and current remote membership

use std::collections::BTreeSet;

/// What has to change to turn `current` into `desired`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<T: Ord> {
    /// In desired, missing from current
    pub to_add: BTreeSet<T>,
    /// In current, not desired
    pub to_remove: BTreeSet<T>,
}

impl<T: Ord> SetDiff<T> {
    /// True when the two sets were already equal
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

impl<T: Ord> Default for SetDiff<T> {
    fn default() -> Self {
        Self {
            to_add: BTreeSet::new(),
            to_remove: BTreeSet::new(),
        }
    }
}

/// Compute the diff between a desired and a current set
pub fn diff<T: Ord + Clone>(desired: &BTreeSet<T>, current: &BTreeSet<T>) -> SetDiff<T> {
    SetDiff {
        to_add: desired.difference(current).cloned().collect(),
        to_remove: current.difference(desired).cloned().collect(),
    }
}
