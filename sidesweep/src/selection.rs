use serde::Serialize;
use std::collections::HashSet;

/// The set of user-selected item ids plus the multi-select mode flag.
///
/// The only mutable shared state in the system. Membership carries no
/// ordering; processing order is derived from live list positions at batch
/// start, never from this set. Nothing here is persisted.
#[derive(Debug, Default, Serialize)]
pub struct SelectionSet {
    ids: HashSet<String>,
    multi_select: bool,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership for `id`; returns whether the id is now selected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn insert(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Copy of the current membership, for use as a batch snapshot.
    pub fn snapshot(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn multi_select(&self) -> bool {
        self.multi_select
    }

    /// Toggle multi-select mode. Leaving the mode discards the selection,
    /// matching the host affordance that hides the checkboxes.
    pub fn set_multi_select(&mut self, on: bool) {
        self.multi_select = on;
        if !on {
            self.ids.clear();
        }
    }

    /// Drop every id not present in `known`; returns how many were dropped.
    pub fn retain_known<'a>(&mut self, known: impl IntoIterator<Item = &'a str>) -> usize {
        let known: HashSet<&str> = known.into_iter().collect();
        let before = self.ids.len();
        self.ids.retain(|id| known.contains(id.as_str()));
        before - self.ids.len()
    }
}
