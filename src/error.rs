// file: src/error.rs
// description: Custom error types, failure taxonomy and result type aliases
// reference: https://docs.rs/thiserror

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocsKbError>;

/// Coarse classification shared by sync reports, fetch results and tool responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Transient,
    DecodeError,
    BackendUnavailable,
    Conflict,
    Invalid,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::BackendUnavailable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DocsKbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Branch '{branch}' not found in repository {repository}")]
    BranchNotFound { repository: String, branch: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Knowledge base unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Sync already in progress for {0}")]
    Conflict(String),

    #[error("Remote listing for {0} returned no files; refusing to treat it as a deletion of every tracked file")]
    EmptyListing(String),

    #[error("Remote listing for {0} was truncated; absence from it is not authoritative")]
    IncompleteListing(String),

    #[error("File operation failed for {path}: {source}")]
    FileOperation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DocsKbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocsKbError::RepositoryNotFound(_)
            | DocsKbError::BranchNotFound { .. }
            | DocsKbError::NotFound(_) => ErrorKind::NotFound,
            DocsKbError::Transient(_) => ErrorKind::Transient,
            DocsKbError::Decode(_) => ErrorKind::DecodeError,
            DocsKbError::BackendUnavailable(_)
            | DocsKbError::FileOperation { .. }
            | DocsKbError::Io(_) => ErrorKind::BackendUnavailable,
            DocsKbError::Conflict(_) => ErrorKind::Conflict,
            DocsKbError::Config(_)
            | DocsKbError::Validation(_)
            | DocsKbError::EmptyListing(_)
            | DocsKbError::IncompleteListing(_)
            | DocsKbError::Serialization(_) => ErrorKind::Invalid,
        }
    }
}

impl From<serde_json::Error> for DocsKbError {
    fn from(err: serde_json::Error) -> Self {
        DocsKbError::Serialization(err.to_string())
    }
}
