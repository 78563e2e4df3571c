// file: src/test_support.rs
// description: in-memory remote repository shared by unit tests
// reference: internal test doubles

use crate::error::{DocsKbError, ErrorKind, Result};
use crate::github::{ContentSource, InclusionPolicy, RemoteLister};
use crate::models::{FetchedFile, RemoteFile, RemoteListing, RepoCoordinate};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Remote repository double serving both listings and contents.
#[derive(Default)]
pub(crate) struct StubRemote {
    files: Mutex<BTreeMap<String, (String, String)>>,
    failing: Mutex<HashMap<String, ErrorKind>>,
    flaky: Mutex<HashSet<String>>,
    pub(crate) truncated: AtomicBool,
    pub(crate) fetches: AtomicUsize,
}

impl StubRemote {
    /// Adds or replaces `path`; the content embeds the sha so changes are visible.
    pub(crate) fn put(&self, path: &str, sha: &str) {
        self.files.lock().unwrap().insert(
            path.to_string(),
            (sha.to_string(), format!("# {}\n\ncontent {}", path, sha)),
        );
    }

    pub(crate) fn put_content(&self, path: &str, sha: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (sha.to_string(), content.to_string()));
    }

    pub(crate) fn drop_file(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub(crate) fn clear(&self) {
        self.files.lock().unwrap().clear();
    }

    pub(crate) fn fail(&self, path: &str, kind: ErrorKind) {
        self.failing.lock().unwrap().insert(path.to_string(), kind);
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// The next fetch of `path` fails with a transient error.
    pub(crate) fn fail_once(&self, path: &str) {
        self.flaky.lock().unwrap().insert(path.to_string());
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteLister for StubRemote {
    async fn list_files(
        &self,
        _repo: &RepoCoordinate,
        _branch: &str,
        policy: &InclusionPolicy,
    ) -> Result<RemoteListing> {
        let files = self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| policy.matches(path))
            .map(|(path, (sha, content))| RemoteFile {
                path: path.clone(),
                sha: sha.clone(),
                size: content.len() as u64,
            })
            .collect();
        Ok(RemoteListing {
            files,
            truncated: self.truncated.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl ContentSource for StubRemote {
    async fn get_file(
        &self,
        _repo: &RepoCoordinate,
        path: &str,
        _branch: &str,
    ) -> Result<FetchedFile> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.flaky.lock().unwrap().remove(path) {
            return Err(DocsKbError::Transient(format!("flaky {}", path)));
        }
        let failure = self.failing.lock().unwrap().get(path).copied();
        match failure {
            Some(ErrorKind::NotFound) => return Err(DocsKbError::NotFound(path.to_string())),
            Some(ErrorKind::DecodeError) => return Err(DocsKbError::Decode(path.to_string())),
            Some(_) => return Err(DocsKbError::Transient(path.to_string())),
            None => {}
        }
        let files = self.files.lock().unwrap();
        let (sha, content) = files
            .get(path)
            .ok_or_else(|| DocsKbError::NotFound(path.to_string()))?;
        Ok(FetchedFile::new(path, content.clone(), sha.clone()))
    }
}
