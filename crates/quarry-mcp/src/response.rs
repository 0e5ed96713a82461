//! Raw response shapes returned by an MCP session.
//!
//! These are the payloads before normalization. A tool call yields a content
//! list, a resource read yields resource contents, and in-process sessions may
//! hand back a single content item, bare text or an arbitrary JSON value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One item of a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum McpToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: ResourceContents,
    },
}

impl McpToolContent {
    /// Text carried by this item, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            McpToolContent::Text { text } => Some(text),
            McpToolContent::Resource { resource } => resource.text.as_deref(),
            McpToolContent::Image { .. } => None,
        }
    }
}

/// One entry of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// A response as received from the server, prior to normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawResponse {
    /// `tools/call` result: an ordered content list.
    ToolResult {
        content: Vec<McpToolContent>,
        #[serde(rename = "isError")]
        is_error: bool,
    },
    /// A single wrapped content item.
    Content { content: McpToolContent },
    /// `resources/read` result.
    Resource { contents: Vec<ResourceContents> },
    Text(String),
    Value(serde_json::Value),
}

impl RawResponse {
    pub fn text(text: impl Into<String>) -> Self {
        RawResponse::Text(text.into())
    }

    /// A successful tool result holding a single text item.
    pub fn tool_text(text: impl Into<String>) -> Self {
        RawResponse::ToolResult {
            content: vec![McpToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// A tool result the server flagged as an error.
    pub fn tool_error(text: impl Into<String>) -> Self {
        RawResponse::ToolResult {
            content: vec![McpToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// A resource read with a single text entry.
    pub fn resource_text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        RawResponse::Resource {
            contents: vec![ResourceContents {
                uri: uri.into(),
                mime_type: Some("text/plain".to_string()),
                text: Some(text.into()),
                blob: None,
            }],
        }
    }

    /// Whether the server reported the call itself as failed.
    pub fn is_error(&self) -> bool {
        matches!(self, RawResponse::ToolResult { is_error: true, .. })
    }
}

/// Default rendering: the JSON form of the response.
impl fmt::Display for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawResponse::Text(text) => f.write_str(text),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => write!(f, "{other:?}"),
            },
        }
    }
}
