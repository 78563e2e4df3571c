// file: src/store/mod.rs
// description: persistence seams for tracked repositories and their snapshots
// reference: internal module structure

pub mod json_store;

use crate::error::Result;
use crate::models::{Snapshot, TrackedRepository};
use async_trait::async_trait;

pub use json_store::JsonStore;

/// Per-repository file snapshot; `save` replaces the stored snapshot atomically.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns an empty snapshot when none has been stored yet.
    async fn load(&self, repository_id: &str) -> Result<Snapshot>;

    async fn save(&self, repository_id: &str, snapshot: &Snapshot) -> Result<()>;

    async fn remove(&self, repository_id: &str) -> Result<()>;
}

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn list(&self) -> Result<Vec<TrackedRepository>>;

    async fn get(&self, repository_id: &str) -> Result<Option<TrackedRepository>>;

    async fn put(&self, repository: &TrackedRepository) -> Result<()>;

    /// Removes the record together with its snapshot.
    async fn delete(&self, repository_id: &str) -> Result<()>;
}
