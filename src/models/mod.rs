// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod document;
pub mod fetch;
pub mod report;
pub mod repository;
pub mod search_result;
pub mod snapshot;

pub use document::Document;
pub use fetch::{FetchFailure, FetchResult, FetchedFile, RemoteFile, RemoteListing};
pub use report::{FailedPath, SyncReport};
pub use repository::{RepoCoordinate, TrackedRepository};
pub use search_result::SearchResult;
pub use snapshot::{FileRecord, IdentityMap, Snapshot};
