// file: src/store/json_store.rs
// description: JSON file persistence for repository records and snapshots
// reference: atomic write-then-rename metadata store

use crate::error::{DocsKbError, Result};
use crate::models::{Snapshot, TrackedRepository};
use crate::store::{RepositoryStore, SnapshotStore};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const REPOSITORY_FILE: &str = "repository.json";
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Stores each repository under `<root>/<id>/` as two JSON documents.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| DocsKbError::FileOperation {
                path: root.clone(),
                source,
            })?;
        debug!("Repository store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repository_dir(&self, repository_id: &str) -> Result<PathBuf> {
        let valid = !repository_id.is_empty()
            && repository_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DocsKbError::Validation(format!(
                "Invalid repository id: {}",
                repository_id
            )));
        }
        Ok(self.root.join(repository_id))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(source) => Err(DocsKbError::FileOperation {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes to a sibling temp file and renames it over the target.
    async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(value)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| DocsKbError::FileOperation {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, contents)
            .await
            .map_err(|source| DocsKbError::FileOperation {
                path: tmp.clone(),
                source,
            })?;

        if let Err(source) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(DocsKbError::FileOperation {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(())
    }

    async fn remove_file_if_present(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(source) => Err(DocsKbError::FileOperation {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonStore {
    async fn load(&self, repository_id: &str) -> Result<Snapshot> {
        let path = self.repository_dir(repository_id)?.join(SNAPSHOT_FILE);
        Ok(Self::read_json(&path).await?.unwrap_or_default())
    }

    async fn save(&self, repository_id: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.repository_dir(repository_id)?.join(SNAPSHOT_FILE);
        Self::write_json_atomic(&path, snapshot).await?;
        debug!("Saved snapshot of {} files for {}", snapshot.len(), repository_id);
        Ok(())
    }

    async fn remove(&self, repository_id: &str) -> Result<()> {
        let path = self.repository_dir(repository_id)?.join(SNAPSHOT_FILE);
        Self::remove_file_if_present(&path).await
    }
}

#[async_trait]
impl RepositoryStore for JsonStore {
    async fn list(&self) -> Result<Vec<TrackedRepository>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|source| DocsKbError::FileOperation {
                path: self.root.clone(),
                source,
            })?;

        let mut repositories = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(REPOSITORY_FILE);
            match Self::read_json::<TrackedRepository>(&path).await {
                Ok(Some(repository)) => repositories.push(repository),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }

        repositories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.branch.cmp(&b.branch)));
        Ok(repositories)
    }

    async fn get(&self, repository_id: &str) -> Result<Option<TrackedRepository>> {
        let path = self.repository_dir(repository_id)?.join(REPOSITORY_FILE);
        Self::read_json(&path).await
    }

    async fn put(&self, repository: &TrackedRepository) -> Result<()> {
        let path = self.repository_dir(&repository.id)?.join(REPOSITORY_FILE);
        Self::write_json_atomic(&path, repository).await
    }

    async fn delete(&self, repository_id: &str) -> Result<()> {
        let dir = self.repository_dir(repository_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Removed stored state for {}", repository_id);
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(source) => Err(DocsKbError::FileOperation { path: dir, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{FileRecord, RepoCoordinate};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn tracked(name: &str) -> TrackedRepository {
        TrackedRepository::new(&RepoCoordinate::parse(name).unwrap(), "main")
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_and_default() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path()).await.unwrap();
        let repo = tracked("acme/docs");

        assert!(SnapshotStore::load(&store, &repo.id).await.unwrap().is_empty());

        let snapshot = Snapshot::from_records([
            FileRecord::new("a.md", "h1", 10),
            FileRecord::new("b.md", "h2", 20),
        ]);
        store.save(&repo.id, &snapshot).await.unwrap();

        let loaded = SnapshotStore::load(&store, &repo.id).await.unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path()).await.unwrap();
        let repo = tracked("acme/docs");

        for i in 0..3 {
            let snapshot = Snapshot::from_records([FileRecord::new("a.md", format!("h{}", i), 1)]);
            store.save(&repo.id, &snapshot).await.unwrap();
        }

        let names: Vec<String> = std::fs::read_dir(temp.path().join(&repo.id))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![SNAPSHOT_FILE.to_string()]);

        let loaded = SnapshotStore::load(&store, &repo.id).await.unwrap();
        assert_eq!(loaded.get("a.md").unwrap().sha, "h2");
    }

    #[tokio::test]
    async fn test_repository_records_and_cascade_delete() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path()).await.unwrap();
        let docs = tracked("acme/docs");
        let api = tracked("acme/api");

        store.put(&docs).await.unwrap();
        store.put(&api).await.unwrap();
        store
            .save(&docs.id, &Snapshot::from_records([FileRecord::new("a.md", "h1", 1)]))
            .await
            .unwrap();

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["acme/api", "acme/docs"]);

        store.delete(&docs.id).await.unwrap();
        assert!(store.get(&docs.id).await.unwrap().is_none());
        assert!(SnapshotStore::load(&store, &docs.id).await.unwrap().is_empty());
        assert_eq!(store.list().await.unwrap().len(), 1);

        // deleting twice is not an error
        store.delete(&docs.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_io_failure_is_backend_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path()).await.unwrap();
        let repo = tracked("acme/docs");
        // a plain file where the repository directory should be
        std::fs::write(temp.path().join(&repo.id), "not a directory").unwrap();

        let err = SnapshotStore::load(&store, &repo.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);

        let err = store.put(&repo).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_records() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path()).await.unwrap();
        store.put(&tracked("acme/docs")).await.unwrap();

        let broken = temp.path().join("kb_broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(REPOSITORY_FILE), "{ not json").unwrap();

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["acme/docs"]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path()).await.unwrap();
        assert!(store.get("../escape").await.is_err());
        assert!(SnapshotStore::load(&store, "").await.is_err());
    }
}
