// file: src/gateway/service.rs
// description: stateless retrieval operations over tracked repositories
// reference: query, browse and load operations exposed to agents

use crate::config::{ServerConfig, SyncConfig};
use crate::error::{DocsKbError, ErrorKind, Result};
use crate::github::{ConcurrentFileFetcher, InclusionPolicy, RemoteLister};
use crate::knowledge::KnowledgeBase;
use crate::models::{FailedPath, FetchFailure, FetchedFile, RepoCoordinate, SearchResult, TrackedRepository};
use crate::store::RepositoryStore;
use crate::utils::Validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// Repository in `owner/repo` form
    pub repository: String,
    /// Branch that was ingested (default: main)
    #[serde(default)]
    pub branch: Option<String>,
    /// Natural-language question or keywords
    pub query: String,
    /// Maximum number of results (default: 10)
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TreeParams {
    /// Repository in `owner/repo` form
    pub repository: String,
    /// Branch to list (default: main)
    #[serde(default)]
    pub branch: Option<String>,
    /// File extensions to include (default: [".md", ".mdx"])
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    /// Only include paths starting with this prefix, e.g. "docs/"
    #[serde(default)]
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FileParams {
    /// Repository in `owner/repo` form
    pub repository: String,
    /// File path within the repository
    pub path: String,
    /// Branch to read from (default: main)
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FilesParams {
    /// Repository in `owner/repo` form
    pub repository: String,
    /// File paths within the repository
    pub paths: Vec<String>,
    /// Branch to read from (default: main)
    #[serde(default)]
    pub branch: Option<String>,
    /// Parallel requests (default: 10)
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositorySummary {
    pub id: String,
    pub name: String,
    pub branch: String,
    pub knowledge_base: String,
    pub created_at: String,
    pub last_synced_at: Option<String>,
    pub file_count: usize,
}

impl From<TrackedRepository> for RepositorySummary {
    fn from(repo: TrackedRepository) -> Self {
        Self {
            knowledge_base: repo.id.clone(),
            id: repo.id,
            name: repo.name,
            branch: repo.branch,
            created_at: repo.created_at.to_rfc3339(),
            last_synced_at: repo.last_synced_at.map(|at| at.to_rfc3339()),
            file_count: repo.file_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryList {
    pub repositories: Vec<RepositorySummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub repository: String,
    pub branch: String,
    pub knowledge_base: String,
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeResponse {
    pub repository: String,
    pub branch: String,
    pub files: Vec<TreeEntry>,
    pub total: usize,
    pub truncated: bool,
    pub extensions: Vec<String>,
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub path: String,
    pub name: String,
    pub content: String,
    pub sha: String,
    pub size: u64,
}

impl From<FetchedFile> for FileContent {
    fn from(file: FetchedFile) -> Self {
        Self {
            path: file.path,
            name: file.name,
            content: file.content,
            sha: file.sha,
            size: file.size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesResponse {
    pub repository: String,
    pub branch: String,
    pub files: Vec<FileContent>,
    pub failed: Vec<FailedPath>,
    pub total_requested: usize,
    pub total_loaded: usize,
    pub total_failed: usize,
}

/// Read-only operations over the knowledge base and the remote repository.
///
/// Holds no per-call state; every operation receives its full context.
pub struct RetrievalGateway {
    lister: Arc<dyn RemoteLister>,
    fetcher: ConcurrentFileFetcher,
    knowledge: Arc<dyn KnowledgeBase>,
    repositories: Arc<dyn RepositoryStore>,
    limits: ServerConfig,
    default_extensions: Vec<String>,
}

impl RetrievalGateway {
    pub fn new(
        lister: Arc<dyn RemoteLister>,
        fetcher: ConcurrentFileFetcher,
        knowledge: Arc<dyn KnowledgeBase>,
        repositories: Arc<dyn RepositoryStore>,
        limits: ServerConfig,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            lister,
            fetcher,
            knowledge,
            repositories,
            limits,
            default_extensions: sync.extensions.clone(),
        }
    }

    pub async fn list_repositories(&self) -> Result<RepositoryList> {
        let repositories: Vec<RepositorySummary> = self
            .repositories
            .list()
            .await?
            .into_iter()
            .map(RepositorySummary::from)
            .collect();

        Ok(RepositoryList {
            total: repositories.len(),
            repositories,
        })
    }

    /// Semantic search within one tracked repository.
    ///
    /// An untracked repository is `NotFound`; a tracked one with no
    /// matches yields an empty result list.
    pub async fn query_repository(&self, params: QueryParams) -> Result<QueryResponse> {
        Validator::validate_query(&params.query)?;
        let (repo, branch) = resolve(&params.repository, params.branch.as_deref())?;

        let id = repo.knowledge_base_id(&branch);
        if self.repositories.get(&id).await?.is_none() {
            return Err(DocsKbError::NotFound(format!(
                "{}@{} has not been ingested",
                repo, branch
            )));
        }

        let limit = params
            .limit
            .unwrap_or(self.limits.default_query_limit)
            .clamp(1, self.limits.max_query_limit);
        let results = self.knowledge.search(&id, params.query.trim(), limit).await?;
        info!(
            "Query on {}@{} returned {} results",
            repo,
            branch,
            results.len()
        );

        Ok(QueryResponse {
            repository: repo.full_name(),
            branch,
            knowledge_base: id,
            query: params.query,
            total: results.len(),
            results,
        })
    }

    pub async fn get_repository_tree(&self, params: TreeParams) -> Result<TreeResponse> {
        let (repo, branch) = resolve(&params.repository, params.branch.as_deref())?;
        let extensions = params
            .extensions
            .filter(|exts| !exts.is_empty())
            .unwrap_or_else(|| self.default_extensions.clone());
        let policy = InclusionPolicy::new(&extensions, params.path_prefix.as_deref());

        let listing = self.lister.list_files(&repo, &branch, &policy).await?;
        let files: Vec<TreeEntry> = listing
            .files
            .into_iter()
            .map(|file| TreeEntry {
                path: file.path,
                sha: file.sha,
                size: file.size,
            })
            .collect();

        Ok(TreeResponse {
            repository: repo.full_name(),
            branch,
            total: files.len(),
            files,
            truncated: listing.truncated,
            extensions: policy.extensions().to_vec(),
            path_prefix: policy.path_prefix().map(str::to_string),
        })
    }

    pub async fn get_file(&self, params: FileParams) -> Result<FileContent> {
        let (repo, branch) = resolve(&params.repository, params.branch.as_deref())?;
        let path = clean_path(&params.path)?;

        let result = self
            .fetcher
            .fetch_all(&repo, &branch, std::slice::from_ref(&path), 1)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| DocsKbError::Transient(format!("no result for {}", path)))?;

        match result.outcome {
            Ok(file) => Ok(file.into()),
            Err(failure) => Err(failure_to_error(&path, failure)),
        }
    }

    pub async fn get_files(&self, params: FilesParams) -> Result<FilesResponse> {
        let (repo, branch) = resolve(&params.repository, params.branch.as_deref())?;
        if params.paths.is_empty() {
            return Err(DocsKbError::Validation("paths must not be empty".to_string()));
        }
        if params.paths.len() > self.limits.max_files_per_request {
            return Err(DocsKbError::Validation(format!(
                "at most {} files per request, got {}",
                self.limits.max_files_per_request,
                params.paths.len()
            )));
        }

        let mut paths = Vec::with_capacity(params.paths.len());
        for path in &params.paths {
            let path = clean_path(path)?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }

        let concurrency = params
            .max_concurrency
            .unwrap_or(10)
            .clamp(1, self.limits.max_concurrency);
        let results = self.fetcher.fetch_all(&repo, &branch, &paths, concurrency).await;

        let mut files = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result.outcome {
                Ok(file) => files.push(FileContent::from(file)),
                Err(failure) => failed.push(FailedPath {
                    path: result.path,
                    kind: failure.kind,
                    message: failure.message,
                }),
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        failed.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(FilesResponse {
            repository: repo.full_name(),
            branch,
            total_requested: paths.len(),
            total_loaded: files.len(),
            total_failed: failed.len(),
            files,
            failed,
        })
    }
}

fn resolve(repository: &str, branch: Option<&str>) -> Result<(RepoCoordinate, String)> {
    let repo = RepoCoordinate::parse(repository)?;
    let branch = branch
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_BRANCH)
        .to_string();
    Validator::validate_branch(&branch)?;
    Ok((repo, branch))
}

fn clean_path(path: &str) -> Result<String> {
    let path = Validator::sanitize_file_path(path);
    if path.is_empty() {
        return Err(DocsKbError::Validation("file path must not be empty".to_string()));
    }
    Ok(path)
}

fn failure_to_error(path: &str, failure: FetchFailure) -> DocsKbError {
    match failure.kind {
        ErrorKind::NotFound => DocsKbError::NotFound(format!("{}: {}", path, failure.message)),
        ErrorKind::DecodeError => DocsKbError::Decode(format!("{}: {}", path, failure.message)),
        _ => DocsKbError::Transient(format!("{}: {}", path, failure.message)),
    }
}
