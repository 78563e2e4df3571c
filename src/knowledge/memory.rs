// file: src/knowledge/memory.rs
// description: in-process knowledge base with term-overlap scoring
// reference: internal data structures

use crate::error::{DocsKbError, Result};
use crate::knowledge::KnowledgeBase;
use crate::models::{Document, SearchResult, search_result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Knowledge base held in memory; backs the sync and gateway tests.
///
/// Individual paths can be marked as failing so callers can observe how
/// upsert and removal failures are handled.
#[derive(Default)]
pub struct MemoryKnowledgeBase {
    bases: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    failing_paths: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_path(&self, path: &str) {
        self.failing_paths.write().await.insert(path.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing_paths.write().await.clear();
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn document(&self, base_id: &str, path: &str) -> Option<Document> {
        self.bases
            .read()
            .await
            .get(base_id)
            .and_then(|docs| docs.get(path).cloned())
    }

    pub async fn paths(&self, base_id: &str) -> Vec<String> {
        self.bases
            .read()
            .await
            .get(base_id)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn has_base(&self, base_id: &str) -> bool {
        self.bases.read().await.contains_key(base_id)
    }

    async fn check(&self, path: Option<&str>) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DocsKbError::BackendUnavailable(
                "memory knowledge base marked unavailable".to_string(),
            ));
        }
        if let Some(path) = path
            && self.failing_paths.read().await.contains(path)
        {
            return Err(DocsKbError::BackendUnavailable(format!(
                "write rejected for {}",
                path
            )));
        }
        Ok(())
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl KnowledgeBase for MemoryKnowledgeBase {
    async fn ensure(&self, base_id: &str) -> Result<()> {
        self.check(None).await?;
        self.bases
            .write()
            .await
            .entry(base_id.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert(&self, base_id: &str, document: &Document) -> Result<()> {
        if let Err(e) = self.check(Some(&document.path)).await {
            // replacement deletes before it adds, so a rejected write loses the old entry
            if let Some(docs) = self.bases.write().await.get_mut(base_id) {
                docs.remove(&document.path);
            }
            return Err(e);
        }
        self.bases
            .write()
            .await
            .entry(base_id.to_string())
            .or_default()
            .insert(document.path.clone(), document.clone());
        Ok(())
    }

    async fn remove(&self, base_id: &str, path: &str) -> Result<()> {
        self.check(Some(path)).await?;
        if let Some(docs) = self.bases.write().await.get_mut(base_id) {
            docs.remove(path);
        }
        Ok(())
    }

    async fn search(&self, base_id: &str, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.check(None).await?;
        let bases = self.bases.read().await;
        let docs = bases
            .get(base_id)
            .ok_or_else(|| DocsKbError::NotFound(format!("knowledge base {}", base_id)))?;

        let wanted = terms(query);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<SearchResult> = docs
            .values()
            .filter_map(|doc| {
                let have = terms(&format!(
                    "{} {} {}",
                    doc.path,
                    doc.title.as_deref().unwrap_or(""),
                    doc.content
                ));
                let matched = wanted.intersection(&have).count();
                (matched > 0).then(|| SearchResult {
                    path: doc.path.clone(),
                    name: doc.name.clone(),
                    title: doc.title.clone(),
                    content: doc.content.clone(),
                    sha: doc.sha.clone(),
                    score: matched as f32 / wanted.len() as f32,
                    distance: None,
                })
            })
            .collect();

        search_result::rank(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn drop_base(&self, base_id: &str) -> Result<()> {
        self.check(None).await?;
        self.bases.write().await.remove(base_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{FetchedFile, RepoCoordinate, TrackedRepository};
    use pretty_assertions::assert_eq;

    fn doc(repo: &TrackedRepository, path: &str, content: &str) -> Document {
        Document::from_fetched(repo, &FetchedFile::new(path, content.to_string(), "sha"))
    }

    #[tokio::test]
    async fn test_search_ranks_by_overlap() {
        let kb = MemoryKnowledgeBase::new();
        let repo = TrackedRepository::new(&RepoCoordinate::new("acme", "docs"), "main");
        kb.ensure(&repo.id).await.unwrap();
        kb.upsert(&repo.id, &doc(&repo, "a.md", "install with cargo"))
            .await
            .unwrap();
        kb.upsert(&repo.id, &doc(&repo, "b.md", "install from source"))
            .await
            .unwrap();
        kb.upsert(&repo.id, &doc(&repo, "c.md", "unrelated"))
            .await
            .unwrap();

        let results = kb.search(&repo.id, "cargo install", 10).await.unwrap();
        let paths: Vec<_> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md"]);
        assert_eq!(results[0].score, 1.0);

        let limited = kb.search(&repo.id, "install", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_base_is_not_found() {
        let kb = MemoryKnowledgeBase::new();
        let err = kb.search("kb_missing", "anything", 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let kb = MemoryKnowledgeBase::new();
        let repo = TrackedRepository::new(&RepoCoordinate::new("acme", "docs"), "main");
        kb.fail_path("a.md").await;

        let err = kb.upsert(&repo.id, &doc(&repo, "a.md", "x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(kb.document(&repo.id, "a.md").await.is_none());

        kb.set_unavailable(true);
        assert!(kb.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_replacement_drops_old_entry() {
        let kb = MemoryKnowledgeBase::new();
        let repo = TrackedRepository::new(&RepoCoordinate::new("acme", "docs"), "main");
        kb.upsert(&repo.id, &doc(&repo, "a.md", "v1")).await.unwrap();

        kb.fail_path("a.md").await;
        assert!(kb.upsert(&repo.id, &doc(&repo, "a.md", "v2")).await.is_err());

        assert!(kb.document(&repo.id, "a.md").await.is_none());
    }
}
