// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod error;
pub mod gateway;
pub mod github;
pub mod knowledge;
pub mod models;
pub mod parser;
pub mod store;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, GitHubConfig, KnowledgeConfig, ServerConfig, StorageConfig, SyncConfig};
pub use error::{DocsKbError, ErrorKind, Result};
pub use gateway::{DocsKbMcp, RetrievalGateway};
pub use github::{ConcurrentFileFetcher, ContentSource, GitHubClient, InclusionPolicy, RemoteLister};
pub use knowledge::{EmbeddingClient, KnowledgeBase, LanceKnowledgeBase, MemoryKnowledgeBase};
pub use models::{
    Document, FetchResult, FetchedFile, RepoCoordinate, SearchResult, Snapshot, SyncReport,
    TrackedRepository,
};
pub use parser::{MarkdownParser, ParsedMarkdown};
pub use store::{JsonStore, RepositoryStore, SnapshotStore};
pub use sync::{SyncDiff, SyncEngine, SyncLocks, SyncOptions, plan};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};
