// file: src/gateway/server.rs
// description: MCP server exposing the retrieval gateway as tools
// reference: https://docs.rs/rmcp

use super::service::{FileParams, FilesParams, QueryParams, RetrievalGateway, TreeParams};
use crate::error::DocsKbError;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const INSTRUCTIONS: &str = "docs_kb serves documentation from GitHub repositories that were \
ingested into a local knowledge base. Start with list_repositories to see what is tracked. \
Use query_repository for semantic search inside one repository, get_repository_tree to \
browse documentation paths, then get_file or get_files to load full contents. Repositories \
are named owner/repo and the branch defaults to main. Errors are returned as JSON with a \
kind of not_found, transient, decode_error, backend_unavailable, conflict or invalid.";

#[derive(Clone)]
pub struct DocsKbMcp {
    gateway: Arc<RetrievalGateway>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DocsKbMcp {
    pub fn new(gateway: Arc<RetrievalGateway>) -> Self {
        Self {
            gateway,
            tool_router: Self::tool_router(),
        }
    }

    pub fn get_tool_router(&self) -> &ToolRouter<Self> {
        &self.tool_router
    }

    #[tool(description = "List every repository that has been ingested, with its branch, knowledge base id, file count and last sync time.")]
    async fn list_repositories(&self) -> Result<CallToolResult, McpError> {
        info!("MCP: list_repositories");
        respond(self.gateway.list_repositories().await)
    }

    #[tool(description = "Semantic search over the documentation of one ingested repository. Returns ranked passages with path, sha and score.")]
    async fn query_repository(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("MCP: query_repository {} '{}'", params.repository, params.query);
        respond(self.gateway.query_repository(params).await)
    }

    #[tool(description = "List documentation files of a GitHub repository, filtered by extension and path prefix.")]
    async fn get_repository_tree(
        &self,
        Parameters(params): Parameters<TreeParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("MCP: get_repository_tree {}", params.repository);
        respond(self.gateway.get_repository_tree(params).await)
    }

    #[tool(description = "Load the full content of a single file from a GitHub repository.")]
    async fn get_file(
        &self,
        Parameters(params): Parameters<FileParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("MCP: get_file {}:{}", params.repository, params.path);
        respond(self.gateway.get_file(params).await)
    }

    #[tool(description = "Load several files from a GitHub repository in parallel. Failed paths are reported individually.")]
    async fn get_files(
        &self,
        Parameters(params): Parameters<FilesParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "MCP: get_files {} ({} paths)",
            params.repository,
            params.paths.len()
        );
        respond(self.gateway.get_files(params).await)
    }
}

#[tool_handler]
impl ServerHandler for DocsKbMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "docs_kb".to_string(),
                title: Some("Documentation Knowledge Base".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some(env!("CARGO_PKG_DESCRIPTION").to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}

/// Domain failures become tool-level errors the agent can read; only a
/// serialization failure is a protocol error.
fn respond<T: Serialize>(result: crate::error::Result<T>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).map_err(|e| {
                McpError::new(
                    ErrorCode::INTERNAL_ERROR,
                    format!("Failed to serialize response: {}", e),
                    None,
                )
            })?;
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) => {
            warn!("MCP tool failed: {}", e);
            Ok(CallToolResult::error(vec![Content::text(error_body(&e))]))
        }
    }
}

fn error_body(error: &DocsKbError) -> String {
    serde_json::json!({
        "error": error.kind(),
        "message": error.to_string(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::github::ConcurrentFileFetcher;
    use crate::knowledge::MemoryKnowledgeBase;
    use crate::store::JsonStore;
    use crate::test_support::StubRemote;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn server(temp: &TempDir) -> DocsKbMcp {
        let remote = Arc::new(StubRemote::default());
        let config = Config::default_config();
        let gateway = RetrievalGateway::new(
            remote.clone(),
            ConcurrentFileFetcher::new(remote, Duration::from_secs(5)),
            Arc::new(MemoryKnowledgeBase::new()),
            Arc::new(JsonStore::new(temp.path()).await.unwrap()),
            config.server.clone(),
            &config.sync,
        );
        DocsKbMcp::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn test_tool_table() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp).await;

        let mut names: Vec<String> = server
            .get_tool_router()
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();

        assert_eq!(
            names,
            vec![
                "get_file",
                "get_files",
                "get_repository_tree",
                "list_repositories",
                "query_repository",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_repository_is_tool_error() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp).await;

        let result = server
            .query_repository(Parameters(QueryParams {
                repository: "acme/missing".to_string(),
                branch: None,
                query: "install".to_string(),
                limit: None,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn test_error_body_carries_kind() {
        let body = error_body(&DocsKbError::Conflict("kb_acme".to_string()));
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["error"], "conflict");
    }

    #[tokio::test]
    async fn test_server_info_has_instructions() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp).await;
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("query_repository"));
    }
}
