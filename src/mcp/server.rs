//! Book search MCP server implementation

use anyhow::Result;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use book_rag::search::VectorIndex;
use book_rag::{BookSearchTool, RagError};

/// Parameters for search_books tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchBooksParams {
    /// Study goal or topic (e.g., "전기기사 필기 대비")
    #[schemars(description = "What the user wants to study, in natural language")]
    pub query: String,
    /// Maximum number of books to return (default: 5)
    #[schemars(description = "Maximum number of books (default: 5)")]
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

/// Explicit k is honored (0 means an empty result); only the upper end is capped.
fn clamp_k(k: usize) -> usize {
    k.min(50)
}

/// Book search MCP service. The index is loaded once and shared by every call.
#[derive(Clone)]
pub struct BookService {
    tool: Arc<BookSearchTool>,
    index_path: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl BookService {
    pub fn new(tool: Arc<BookSearchTool>, index_path: PathBuf) -> Self {
        Self {
            tool,
            index_path,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl BookService {
    /// Search indexed books, falling back to the live catalog
    #[tool(description = "Recommend study books for a topic. Searches the local book index (semantic + keyword); when the best match is not confident enough, returns live catalog results instead. Each book has title, author, pubDate, categoryName and toc (table of contents markup).")]
    async fn search_books(
        &self,
        params: Parameters<SearchBooksParams>,
    ) -> Result<CallToolResult, McpError> {
        let k = clamp_k(params.0.k);
        let query = params.0.query;
        let tool = self.tool.clone();

        let result = tokio::task::spawn_blocking(move || tool.search_books(&query, k))
            .await
            .map_err(|e| McpError::internal_error(format!("Search task failed: {}", e), None))?
            .map_err(|e| McpError::internal_error(format!("Search failed: {}", e), None))?;

        let output = serde_json::to_string_pretty(&result).map_err(|e| {
            McpError::internal_error(format!("JSON serialization failed: {}", e), None)
        })?;

        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    /// Get persisted index summary
    #[tool(description = "Get the book index status: number of books and units, embedding model, build time and file size.")]
    async fn index_status(&self) -> Result<CallToolResult, McpError> {
        let output = match VectorIndex::stats(&self.index_path) {
            Ok(stats) => serde_json::json!({
                "exists": true,
                "books": stats.document_count,
                "units": stats.unit_count,
                "embedder": stats.meta.embedder_id,
                "dim": stats.meta.dim,
                "built_at": chrono::DateTime::from_timestamp(stats.meta.built_at, 0)
                    .map(|d| d.to_rfc3339()),
                "file_size_bytes": stats.file_size,
            }),
            Err(RagError::IndexNotFound(path)) => serde_json::json!({
                "exists": false,
                "path": path.display().to_string(),
            }),
            Err(e) => {
                return Err(McpError::internal_error(
                    format!("Failed to read index: {}", e),
                    None,
                ))
            }
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&output).unwrap_or_default(),
        )]))
    }
}

#[tool_handler]
impl ServerHandler for BookService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Book recommendation MCP server. Hybrid search over a curated book corpus with live catalog fallback.".to_string()
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Run the MCP server over stdio until the client disconnects.
pub async fn run_mcp_server(tool: Arc<BookSearchTool>, index_path: PathBuf) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let service = BookService::new(tool, index_path);
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SearchBooksParams {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_missing_k_defaults_to_five() {
        let params = parse(r#"{"query":"x"}"#);
        assert_eq!(clamp_k(params.k), 5);
    }

    #[test]
    fn test_zero_k_is_kept() {
        let params = parse(r#"{"query":"x","k":0}"#);
        assert_eq!(params.k, 0);
        assert_eq!(clamp_k(params.k), 0);
    }

    #[test]
    fn test_large_k_is_capped() {
        assert_eq!(clamp_k(parse(r#"{"query":"x","k":500}"#).k), 50);
    }
}
