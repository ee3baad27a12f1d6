use std::collections::{HashMap, VecDeque};

use shared::domain::{ParentId, PivotRow};

pub(crate) const DEFAULT_CAPACITY: usize = 1024;

/// Read-through copies of recently loaded scopes, keyed by parent.
///
/// Holds at most `capacity` scopes; once full, the scope cached longest ago is
/// evicted first.
#[derive(Debug)]
pub(crate) struct MembershipCache {
    capacity: usize,
    entries: HashMap<ParentId, Vec<PivotRow>>,
    // Insertion order of the keys in `entries`.
    order: VecDeque<ParentId>,
}

impl MembershipCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn get(&self, parent_id: ParentId) -> Option<&[PivotRow]> {
        self.entries.get(&parent_id).map(Vec::as_slice)
    }

    pub(crate) fn insert(&mut self, parent_id: ParentId, rows: Vec<PivotRow>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(parent_id, rows).is_some() {
            return;
        }
        self.order.push_back(parent_id);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub(crate) fn invalidate(&mut self, parent_id: ParentId) {
        if self.entries.remove(&parent_id).is_some() {
            self.order.retain(|cached| *cached != parent_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
