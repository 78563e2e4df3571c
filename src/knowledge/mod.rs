// file: src/knowledge/mod.rs
// description: knowledge-base seam and its implementations
// reference: internal module structure

pub mod embeddings;
pub mod lance;
pub mod memory;

use crate::error::Result;
use crate::models::{Document, SearchResult};
use async_trait::async_trait;

pub use embeddings::EmbeddingClient;
pub use lance::LanceKnowledgeBase;
pub use memory::MemoryKnowledgeBase;

/// Derived index of one repository's documents, keyed by file path.
///
/// `upsert` replaces whatever was stored for the document's path, `remove`
/// of an absent path succeeds, and `search` on an unknown base is `NotFound`.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn ensure(&self, base_id: &str) -> Result<()>;

    async fn upsert(&self, base_id: &str, document: &Document) -> Result<()>;

    async fn remove(&self, base_id: &str, path: &str) -> Result<()>;

    async fn search(&self, base_id: &str, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    async fn drop_base(&self, base_id: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
