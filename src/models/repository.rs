// file: src/models/repository.rs
// description: repository coordinates and tracked repository records
// reference: internal data structures

use crate::error::Result;
use crate::utils::Validator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// `owner/repo` pair identifying a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoordinate {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinate {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn parse(full_name: &str) -> Result<Self> {
        let (owner, name) = Validator::validate_repository_name(full_name)?;
        Ok(Self { owner, name })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Deterministic knowledge-base identifier for this repository on `branch`.
    ///
    /// The readable part is lossy (every non-alphanumeric becomes `_`), so a
    /// short digest of the exact coordinate keeps `my-repo` and `my_repo` apart.
    pub fn knowledge_base_id(&self, branch: &str) -> String {
        let readable: String = format!("{}_{}_{}", self.owner, self.name, branch)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(format!("{}@{}", self.full_name(), branch).as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        format!("kb_{}_{}", readable, &digest[..8])
    }
}

impl fmt::Display for RepoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoCoordinate {
    type Err = crate::error::DocsKbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A (repository, branch) pair under active synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRepository {
    pub id: String,
    pub name: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub file_count: usize,
}

impl TrackedRepository {
    pub fn new(repo: &RepoCoordinate, branch: &str) -> Self {
        Self {
            id: repo.knowledge_base_id(branch),
            name: repo.full_name(),
            branch: branch.to_string(),
            created_at: Utc::now(),
            last_synced_at: None,
            file_count: 0,
        }
    }

    pub fn coordinate(&self) -> Result<RepoCoordinate> {
        RepoCoordinate::parse(&self.name)
    }

    pub fn mark_synced(&mut self, file_count: usize) {
        self.last_synced_at = Some(Utc::now());
        self.file_count = file_count;
    }

    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let repo: RepoCoordinate = "mindsdb/docs".parse().unwrap();
        assert_eq!(repo.owner, "mindsdb");
        assert_eq!(repo.to_string(), "mindsdb/docs");
        assert!(RepoCoordinate::parse("nope").is_err());
    }

    #[test]
    fn test_knowledge_base_id_is_stable_and_distinct() {
        let dashed = RepoCoordinate::new("acme", "my-repo");
        let underscored = RepoCoordinate::new("acme", "my_repo");

        let id = dashed.knowledge_base_id("main");
        assert!(id.starts_with("kb_acme_my_repo_main_"));
        assert_eq!(id, dashed.knowledge_base_id("main"));
        assert_ne!(id, underscored.knowledge_base_id("main"));
        assert_ne!(id, dashed.knowledge_base_id("dev"));
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_tracked_repository_lifecycle() {
        let repo = RepoCoordinate::new("facebook", "react");
        let mut tracked = TrackedRepository::new(&repo, "main");
        assert_eq!(tracked.name, "facebook/react");
        assert!(tracked.last_synced_at.is_none());

        tracked.mark_synced(42);
        assert_eq!(tracked.file_count, 42);
        assert!(tracked.last_synced_at.is_some());
        assert_eq!(tracked.coordinate().unwrap(), repo);
        assert_eq!(tracked.label(), "facebook/react@main");
    }
}
