// file: src/sync/lock.rs
// description: per-repository sync serialization across tasks and processes
// reference: create_new lock files with staleness detection

use crate::error::{DocsKbError, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Registry of repositories with a sync in progress.
///
/// Holding a [`SyncGuard`] is the only way to mutate a repository's snapshot
/// or knowledge base. With a lock directory configured the claim is also
/// visible to other processes through `<dir>/<id>.lock`. The file carries the
/// holder's nonce; its mtime is the heartbeat, and a file whose heartbeat is
/// older than `stale_after` may be taken over.
#[derive(Clone)]
pub struct SyncLocks {
    held: Arc<Mutex<HashSet<String>>>,
    lock_dir: Option<PathBuf>,
    stale_after: Duration,
}

#[derive(Debug)]
pub struct SyncGuard {
    repository_id: String,
    nonce: String,
    held: Arc<Mutex<HashSet<String>>>,
    lock_file: Option<PathBuf>,
}

impl SyncLocks {
    pub fn in_process() -> Self {
        Self {
            held: Arc::new(Mutex::new(HashSet::new())),
            lock_dir: None,
            stale_after: Duration::MAX,
        }
    }

    pub fn with_lock_dir(lock_dir: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            held: Arc::new(Mutex::new(HashSet::new())),
            lock_dir: Some(lock_dir.into()),
            stale_after,
        }
    }

    pub fn is_locked(&self, repository_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(repository_id)
    }

    /// Claims `repository_id` or fails immediately with `Conflict`.
    pub fn try_acquire(&self, repository_id: &str) -> Result<SyncGuard> {
        {
            let mut held = self
                .held
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !held.insert(repository_id.to_string()) {
                return Err(DocsKbError::Conflict(repository_id.to_string()));
            }
        }

        let nonce = Uuid::new_v4().to_string();
        let lock_file = match &self.lock_dir {
            Some(dir) => match self.create_lock_file(dir, repository_id, &nonce) {
                Ok(path) => Some(path),
                Err(e) => {
                    self.release(repository_id);
                    return Err(e);
                }
            },
            None => None,
        };

        debug!("Acquired sync lock for {}", repository_id);
        Ok(SyncGuard {
            repository_id: repository_id.to_string(),
            nonce,
            held: Arc::clone(&self.held),
            lock_file,
        })
    }

    fn release(&self, repository_id: &str) {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(repository_id);
    }

    fn create_lock_file(&self, dir: &Path, repository_id: &str, nonce: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|source| DocsKbError::FileOperation {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{}.lock", repository_id));

        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(lock_stamp(nonce).as_bytes())
                        .map_err(|source| DocsKbError::FileOperation {
                            path: path.clone(),
                            source,
                        })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists && attempt == 0 => {
                    if !self.is_stale(&path) {
                        return Err(DocsKbError::Conflict(repository_id.to_string()));
                    }
                    warn!("Removing stale sync lock {}", path.display());
                    let _ = fs::remove_file(&path);
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    return Err(DocsKbError::Conflict(repository_id.to_string()));
                }
                Err(source) => {
                    return Err(DocsKbError::FileOperation { path, source });
                }
            }
        }

        Err(DocsKbError::Conflict(repository_id.to_string()))
    }

    fn is_stale(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.stale_after)
    }
}

impl SyncGuard {
    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    /// Refreshes the lock file so other processes keep treating it as live.
    ///
    /// Fails with `Conflict` when the file no longer carries this guard's
    /// nonce, i.e. another process took the lock over as stale.
    pub fn heartbeat(&self) -> Result<()> {
        let Some(path) = &self.lock_file else {
            return Ok(());
        };
        if !self.owns(path) {
            warn!("Sync lock {} was taken over by another process", path.display());
            return Err(DocsKbError::Conflict(self.repository_id.clone()));
        }
        fs::write(path, lock_stamp(&self.nonce)).map_err(|source| DocsKbError::FileOperation {
            path: path.clone(),
            source,
        })?;
        debug!("Refreshed sync lock for {}", self.repository_id);
        Ok(())
    }

    fn owns(&self, path: &Path) -> bool {
        fs::read_to_string(path)
            .map(|stamp| stamp_nonce(&stamp) == Some(self.nonce.as_str()))
            .unwrap_or(false)
    }
}

fn lock_stamp(nonce: &str) -> String {
    format!(
        "pid={} nonce={} heartbeat_at={}\n",
        std::process::id(),
        nonce,
        chrono::Utc::now().to_rfc3339()
    )
}

fn stamp_nonce(stamp: &str) -> Option<&str> {
    stamp
        .split_whitespace()
        .find_map(|field| field.strip_prefix("nonce="))
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.lock_file {
            if self.owns(path) {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Failed to remove sync lock {}: {}", path.display(), e);
                }
            } else {
                warn!("Leaving sync lock {} to its new holder", path.display());
            }
        }
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.repository_id);
        debug!("Released sync lock for {}", self.repository_id);
    }
}
