// file: src/gateway/mod.rs
// description: retrieval gateway module exports
// reference: internal module structure

pub mod server;
pub mod service;

pub use server::DocsKbMcp;
pub use service::{
    DEFAULT_BRANCH, FileContent, FileParams, FilesParams, FilesResponse, QueryParams,
    QueryResponse, RepositoryList, RepositorySummary, RetrievalGateway, TreeEntry, TreeParams,
    TreeResponse,
};
