// file: src/github/mod.rs
// description: remote repository access: listing, content retrieval and bounded fetching
// reference: internal module structure

pub mod client;
pub mod fetcher;
pub mod policy;

use crate::error::Result;
use crate::models::{FetchedFile, RemoteListing, RepoCoordinate};
use async_trait::async_trait;

pub use client::GitHubClient;
pub use fetcher::ConcurrentFileFetcher;
pub use policy::InclusionPolicy;

/// Enumerates the files of a repository branch that match a policy.
///
/// Implementations must return `Ok` only when the remote confirmed the listing;
/// an empty `files` vector is then authoritative unless `truncated` is set.
#[async_trait]
pub trait RemoteLister: Send + Sync {
    async fn list_files(
        &self,
        repo: &RepoCoordinate,
        branch: &str,
        policy: &InclusionPolicy,
    ) -> Result<RemoteListing>;
}

/// Retrieves a single file's content and identity token.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn get_file(&self, repo: &RepoCoordinate, path: &str, branch: &str)
    -> Result<FetchedFile>;
}
