// file: src/sync/planner.rs
// description: pure diff between the previous and current identity snapshots
// reference: content-identity change detection

use crate::models::IdentityMap;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// Partition of `previous ∪ current` into four disjoint sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncDiff {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl SyncDiff {
    /// Paths whose content must be retrieved: `added ∪ modified`, sorted.
    pub fn fetch_paths(&self) -> Vec<String> {
        self.added.union(&self.modified).cloned().collect()
    }

    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    pub fn total_changes(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn len(&self) -> usize {
        self.total_changes() + self.unchanged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn classify(&self, path: &str) -> Option<ChangeKind> {
        if self.added.contains(path) {
            Some(ChangeKind::Added)
        } else if self.modified.contains(path) {
            Some(ChangeKind::Modified)
        } else if self.deleted.contains(path) {
            Some(ChangeKind::Deleted)
        } else if self.unchanged.contains(path) {
            Some(ChangeKind::Unchanged)
        } else {
            None
        }
    }
}

/// Classifies every path of `previous ∪ current` by comparing identity tokens.
///
/// Tokens are compared byte for byte. An empty `current` deletes everything;
/// guarding against a bogus empty listing is the caller's job.
pub fn plan(previous: &IdentityMap, current: &IdentityMap) -> SyncDiff {
    let mut diff = SyncDiff::default();

    for (path, token) in current {
        match previous.get(path) {
            None => {
                diff.added.insert(path.clone());
            }
            Some(old) if old == token => {
                diff.unchanged.insert(path.clone());
            }
            Some(_) => {
                diff.modified.insert(path.clone());
            }
        }
    }

    diff.deleted.extend(
        previous
            .keys()
            .filter(|path| !current.contains_key(*path))
            .cloned(),
    );

    diff
}
