// file: src/models/document.rs
// description: knowledge-base document built from a fetched repository file
// reference: internal data structures

use crate::models::fetch::FetchedFile;
use crate::models::repository::TrackedRepository;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One knowledge-base entry; a file maps to exactly one document keyed by `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub repository: String,
    pub branch: String,
    pub path: String,
    pub name: String,
    pub title: Option<String>,
    pub content: String,
    pub sha: String,
    pub size: u64,
    pub indexed_at: i64,
}

impl Document {
    pub fn from_fetched(repository: &TrackedRepository, file: &FetchedFile) -> Self {
        Self {
            id: Self::compute_id(&repository.id, &file.path),
            repository: repository.name.clone(),
            branch: repository.branch.clone(),
            path: file.path.clone(),
            name: file.name.clone(),
            title: None,
            content: file.content.clone(),
            sha: file.sha.clone(),
            size: file.size,
            indexed_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Stable row id: the same path in the same knowledge base always maps to one id.
    pub fn compute_id(knowledge_base_id: &str, path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(knowledge_base_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::repository::RepoCoordinate;

    #[test]
    fn test_document_from_fetched() {
        let repo = TrackedRepository::new(&RepoCoordinate::new("acme", "docs"), "main");
        let file = FetchedFile::new("guide/setup.md", "# Setup".to_string(), "abc123");

        let doc = Document::from_fetched(&repo, &file);
        assert_eq!(doc.repository, "acme/docs");
        assert_eq!(doc.path, "guide/setup.md");
        assert_eq!(doc.name, "setup.md");
        assert_eq!(doc.sha, "abc123");
        assert_eq!(doc.size, 7);
        assert_eq!(doc.id.len(), 64);
    }

    #[test]
    fn test_id_consistency() {
        let a = Document::compute_id("kb_x", "a.md");
        assert_eq!(a, Document::compute_id("kb_x", "a.md"));
        assert_ne!(a, Document::compute_id("kb_y", "a.md"));
        assert_ne!(a, Document::compute_id("kb_x", "b.md"));
    }
}
