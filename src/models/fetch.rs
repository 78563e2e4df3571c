// file: src/models/fetch.rs
// description: remote listing entries and per-file fetch outcomes
// reference: internal data structures

use crate::error::{DocsKbError, ErrorKind};
use serde::{Deserialize, Serialize};

/// One entry of a remote listing: path plus the identity token supplied upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    pub sha: String,
    pub size: u64,
}

/// A listing together with the remote's own completeness signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteListing {
    pub files: Vec<RemoteFile>,
    pub truncated: bool,
}

impl RemoteListing {
    pub fn complete(files: Vec<RemoteFile>) -> Self {
        Self {
            files,
            truncated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedFile {
    pub path: String,
    pub name: String,
    pub content: String,
    pub sha: String,
    pub size: u64,
}

impl FetchedFile {
    pub fn new(path: impl Into<String>, content: String, sha: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let size = content.len() as u64;
        Self {
            path,
            name,
            content,
            sha: sha.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self::new(ErrorKind::Transient, format!("fetch timed out after {}s", secs))
    }
}

impl From<DocsKbError> for FetchFailure {
    /// Only `not_found` and `decode_error` survive as-is; anything else a content
    /// source raises is worth retrying and is reported as `transient`.
    fn from(err: DocsKbError) -> Self {
        let kind = match err.kind() {
            ErrorKind::NotFound => ErrorKind::NotFound,
            ErrorKind::DecodeError => ErrorKind::DecodeError,
            _ => ErrorKind::Transient,
        };
        Self::new(kind, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub path: String,
    pub outcome: Result<FetchedFile, FetchFailure>,
}

impl FetchResult {
    pub fn success(file: FetchedFile) -> Self {
        Self {
            path: file.path.clone(),
            outcome: Ok(file),
        }
    }

    pub fn failure(path: impl Into<String>, failure: FetchFailure) -> Self {
        Self {
            path: path.into(),
            outcome: Err(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.outcome.as_ref().err().map(|failure| failure.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_file_name_and_size() {
        let file = FetchedFile::new("docs/guide/intro.md", "# Intro".to_string(), "abc");
        assert_eq!(file.name, "intro.md");
        assert_eq!(file.size, 7);

        let root = FetchedFile::new("README.md", String::new(), "def");
        assert_eq!(root.name, "README.md");
    }

    #[test]
    fn test_failure_classification_from_error() {
        let not_found: FetchFailure = DocsKbError::NotFound("docs/a.md".to_string()).into();
        assert_eq!(not_found.kind, ErrorKind::NotFound);

        let decode: FetchFailure = DocsKbError::Decode("invalid utf-8".to_string()).into();
        assert_eq!(decode.kind, ErrorKind::DecodeError);

        let backend: FetchFailure =
            DocsKbError::BackendUnavailable("connection reset".to_string()).into();
        assert_eq!(backend.kind, ErrorKind::Transient);
    }

    #[test]
    fn test_result_accessors() {
        let ok = FetchResult::success(FetchedFile::new("a.md", "x".to_string(), "h1"));
        assert!(ok.is_success());
        assert_eq!(ok.failure_kind(), None);

        let failed = FetchResult::failure("b.md", FetchFailure::timeout(30));
        assert_eq!(failed.failure_kind(), Some(ErrorKind::Transient));
    }
}
