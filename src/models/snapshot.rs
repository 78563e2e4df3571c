// file: src/models/snapshot.rs
// description: per-file identity records and the snapshot recorded after each sync
// reference: internal data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path to identity token (git blob sha), the planner's input shape.
pub type IdentityMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    pub last_seen: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, sha: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            sha: sha.into(),
            size,
            last_seen: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub files: BTreeMap<String, FileRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        Self {
            files: records
                .into_iter()
                .map(|record| (record.path.clone(), record))
                .collect(),
        }
    }

    pub fn identities(&self) -> IdentityMap {
        self.files
            .iter()
            .map(|(path, record)| (path.clone(), record.sha.clone()))
            .collect()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn upsert(&mut self, record: FileRecord) {
        self.files.insert(record.path.clone(), record);
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        self.files.remove(path)
    }

    pub fn touch(&mut self, path: &str, at: DateTime<Utc>) {
        if let Some(record) = self.files.get_mut(path) {
            record.last_seen = at;
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_projection() {
        let snapshot = Snapshot::from_records(vec![
            FileRecord::new("b.md", "h2", 10),
            FileRecord::new("a.md", "h1", 5),
        ]);

        let identities = snapshot.identities();
        assert_eq!(identities.len(), 2);
        assert_eq!(identities.get("a.md").map(String::as_str), Some("h1"));
        assert_eq!(identities.keys().next().map(String::as_str), Some("a.md"));
    }

    #[test]
    fn test_upsert_replaces_token() {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(FileRecord::new("a.md", "h1", 1));
        snapshot.upsert(FileRecord::new("a.md", "h9", 2));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a.md").unwrap().sha, "h9");
        assert!(snapshot.remove("a.md").is_some());
        assert!(snapshot.is_empty());
    }
}
