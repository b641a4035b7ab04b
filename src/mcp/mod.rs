//! MCP server for the book-search tool
//!
//! Exposes `search_books` and `index_status` to a conversational client over stdio.

mod server;

pub use server::run_mcp_server;
