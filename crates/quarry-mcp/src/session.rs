//! MCP session: the handle every client call funnels through.
//!
//! [`McpSession`] is the seam between the client and the wire. The stdio
//! implementation performs the MCP handshake (initialize + initialized
//! notification), discovers tools once, and then serves `tools/call` and
//! `resources/read`.

use crate::config::ServerParams;
use crate::error::McpError;
use crate::response::{McpToolContent, RawResponse, ResourceContents};
use crate::transport::StdioTransport;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

/// MCP protocol version we speak.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Boxed future returned by session methods.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, McpError>> + Send + 'a>>;

/// A tool advertised by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// An established session with one MCP server.
///
/// Implementations must be shareable across tasks; the client hands clones of
/// an `Arc<dyn McpSession>` to detached background work.
pub trait McpSession: Send + Sync {
    /// Invoke a tool by name.
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Value,
    ) -> SessionFuture<'a, RawResponse>;

    /// Read a URI-addressed resource.
    fn read_resource<'a>(&'a self, uri: &'a str) -> SessionFuture<'a, RawResponse>;

    /// Tools exposed by the server.
    fn list_tools(&self) -> SessionFuture<'_, Vec<McpToolInfo>>;

    /// Release the underlying channel. The default does nothing.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

#[derive(Deserialize)]
struct ToolsListResult {
    tools: Vec<ToolEntry>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Deserialize)]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<McpToolContent>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

#[derive(Deserialize)]
struct ReadResourceResult {
    #[serde(default)]
    contents: Vec<ResourceContents>,
}

/// Session with a server spawned as a child process.
pub struct StdioSession {
    name: String,
    transport: StdioTransport,
    tools: Vec<McpToolInfo>,
}

impl StdioSession {
    /// Spawn the server, run the handshake and cache its tool list.
    pub async fn connect(name: impl Into<String>, params: &ServerParams) -> Result<Self, McpError> {
        let name = name.into();
        tracing::info!("Connecting to MCP server '{name}': {}", params.command);

        let transport = StdioTransport::spawn(
            &name,
            &params.command,
            &params.args,
            &params.env,
            params.timeout_ms,
        )?;

        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "quarry",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let init = transport
            .send_request("initialize", Some(init_params))
            .await
            .and_then(|resp| resp.into_result(&name, "initialize"));
        if let Err(e) = init {
            transport.close().await;
            return Err(e);
        }

        if let Err(e) = transport
            .send_notification("notifications/initialized", None)
            .await
        {
            transport.close().await;
            return Err(e);
        }

        let mut session = Self {
            name,
            transport,
            tools: Vec::new(),
        };
        match session.fetch_tools().await {
            Ok(tools) => session.tools = tools,
            Err(e) => {
                session.transport.close().await;
                return Err(e);
            }
        }

        tracing::info!(
            "MCP server '{}' connected with tools: {:?}",
            session.name,
            session.tools.iter().map(|t| &t.name).collect::<Vec<_>>()
        );
        Ok(session)
    }

    async fn fetch_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result = self
            .transport
            .send_request("tools/list", None)
            .await?
            .into_result(&self.name, "tools/list")?;
        let list: ToolsListResult = serde_json::from_value(result).map_err(|e| {
            McpError::Protocol(format!("Failed to parse tools/list response: {e}"))
        })?;
        Ok(list
            .tools
            .into_iter()
            .map(|t| McpToolInfo {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
            })
            .collect())
    }

    /// Tools discovered during the handshake.
    pub fn tools(&self) -> &[McpToolInfo] {
        &self.tools
    }

    pub fn server_name(&self) -> &str {
        &self.name
    }
}

impl McpSession for StdioSession {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Value,
    ) -> SessionFuture<'a, RawResponse> {
        Box::pin(async move {
            let params = serde_json::json!({
                "name": name,
                "arguments": arguments,
            });
            let result = self
                .transport
                .send_request("tools/call", Some(params))
                .await?
                .into_result(&self.name, "tools/call")?;
            let call: ToolCallResult = serde_json::from_value(result).map_err(|e| {
                McpError::Protocol(format!("Failed to parse tools/call result: {e}"))
            })?;
            Ok(RawResponse::ToolResult {
                content: call.content,
                is_error: call.is_error,
            })
        })
    }

    fn read_resource<'a>(&'a self, uri: &'a str) -> SessionFuture<'a, RawResponse> {
        Box::pin(async move {
            let result = self
                .transport
                .send_request("resources/read", Some(serde_json::json!({ "uri": uri })))
                .await?
                .into_result(&self.name, "resources/read")?;
            let read: ReadResourceResult = serde_json::from_value(result).map_err(|e| {
                McpError::Protocol(format!("Failed to parse resources/read result: {e}"))
            })?;
            Ok(RawResponse::Resource {
                contents: read.contents,
            })
        })
    }

    fn list_tools(&self) -> SessionFuture<'_, Vec<McpToolInfo>> {
        let tools = self.tools.clone();
        Box::pin(async move { Ok(tools) })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.transport.close().await;
            tracing::info!("MCP server '{}' shut down", self.name);
        })
    }
}
