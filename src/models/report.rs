// file: src/models/report.rs
// description: aggregate outcome of one sync invocation
// reference: replaces the per-run PipelineStats summary

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPath {
    pub path: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub repository: String,
    pub branch: String,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failures: Vec<FailedPath>,
    /// Paths left unfetched because the run was cancelled between batches.
    pub cancelled_paths: Vec<String>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn new(repository: &str, branch: &str) -> Self {
        Self {
            repository: repository.to_string(),
            branch: branch.to_string(),
            ..Self::default()
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn record_failure(&mut self, path: &str, kind: ErrorKind, message: impl Into<String>) {
        self.failures.push(FailedPath {
            path: path.to_string(),
            kind,
            message: message.into(),
        });
    }

    pub fn failures_of(&self, kind: ErrorKind) -> impl Iterator<Item = &FailedPath> {
        self.failures.iter().filter(move |failure| failure.kind == kind)
    }

    /// True when every failure is worth retrying right away.
    pub fn is_retryable(&self) -> bool {
        !self.failures.is_empty() && self.failures.iter().all(|f| f.kind.is_retryable())
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn total_changes(&self) -> usize {
        self.added + self.modified + self.deleted
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}@{}: {} added, {} modified, {} deleted, {} unchanged, {} failed{}",
            self.repository,
            self.branch,
            self.added,
            self.modified,
            self.deleted,
            self.unchanged,
            self.failed(),
            if self.dry_run {
                " (dry run)"
            } else if self.cancelled {
                " (cancelled)"
            } else {
                ""
            }
        )
    }
}
