//! Client error types.

use quarry_mcp::McpError;
use thiserror::Error;

/// Errors surfaced by [`SqliteClient`](crate::SqliteClient).
///
/// Most client operations degrade to an empty result or an embedded message
/// instead of returning these; see the individual methods.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected to server")]
    NotConnected,

    #[error(transparent)]
    ToolCall(#[from] ToolCallError),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),
}

/// A tool call that failed on every attempt.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("Tool '{tool}' timed out after {timeout_ms}ms ({attempts} attempts)")]
    TimedOut {
        tool: String,
        attempts: u32,
        timeout_ms: u64,
    },

    #[error("Tool '{tool}' failed after {attempts} attempts: {message}")]
    Failed {
        tool: String,
        attempts: u32,
        message: String,
    },
}

impl ToolCallError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            ToolCallError::TimedOut { attempts, .. } | ToolCallError::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolCallError::TimedOut { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_failure_read_differently() {
        let timed_out = ToolCallError::TimedOut {
            tool: "read_query".into(),
            attempts: 3,
            timeout_ms: 500,
        };
        let failed = ToolCallError::Failed {
            tool: "read_query".into(),
            attempts: 3,
            message: "broken pipe".into(),
        };
        assert!(timed_out.to_string().contains("timed out after 500ms"));
        assert!(failed.to_string().contains("failed after 3 attempts: broken pipe"));
        assert!(timed_out.is_timeout());
        assert!(!failed.is_timeout());
        assert_eq!(failed.attempts(), 3);
    }

    #[test]
    fn tool_call_error_is_transparent_in_client_error() {
        let err: ClientError = ToolCallError::Failed {
            tool: "list_tables".into(),
            attempts: 1,
            message: "gone".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Tool 'list_tables' failed after 1 attempts: gone");
    }
}
