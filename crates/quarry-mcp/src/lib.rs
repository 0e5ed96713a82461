//! MCP session layer for quarry.
//!
//! Talks to stdio-based MCP servers over newline-delimited JSON-RPC 2.0. The
//! [`McpSession`] trait is what the client depends on; [`StdioSession`] is the
//! process-backed implementation.

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod response;
pub mod session;
mod transport;

pub use config::ServerParams;
pub use error::McpError;
pub use response::{McpToolContent, RawResponse, ResourceContents};
pub use session::{McpSession, McpToolInfo, SessionFuture, StdioSession};
