//! In-process session with scripted replies for unit tests.

use quarry_mcp::{McpError, McpSession, McpToolInfo, RawResponse, SessionFuture};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Raw(RawResponse),
    Fail(String),
    /// Never answers.
    Hang,
    Delayed(Duration, RawResponse),
}

impl Reply {
    async fn play(self) -> Result<RawResponse, McpError> {
        match self {
            Reply::Raw(raw) => Ok(raw),
            Reply::Fail(message) => Err(McpError::Protocol(message)),
            Reply::Hang => std::future::pending().await,
            Reply::Delayed(delay, raw) => {
                tokio::time::sleep(delay).await;
                Ok(raw)
            }
        }
    }
}

/// Replays tool replies in order; the last one repeats once the script runs
/// out. Resource reads use their own script.
pub(crate) struct ScriptedSession {
    tool_script: Mutex<Vec<Reply>>,
    resource_script: Mutex<Vec<Reply>>,
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

fn next_reply(script: &Mutex<Vec<Reply>>) -> Reply {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.remove(0)
    } else {
        script
            .first()
            .cloned()
            .unwrap_or_else(|| Reply::Fail("no scripted reply".into()))
    }
}

impl ScriptedSession {
    pub(crate) fn new(tool_script: Vec<Reply>) -> Arc<Self> {
        Self::with_resources(tool_script, vec![Reply::Fail("no resources".into())])
    }

    pub(crate) fn with_resources(tool_script: Vec<Reply>, resource_script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            tool_script: Mutex::new(tool_script),
            resource_script: Mutex::new(resource_script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn tool_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl McpSession for ScriptedSession {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Value,
    ) -> SessionFuture<'a, RawResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        let reply = next_reply(&self.tool_script);
        Box::pin(reply.play())
    }

    fn read_resource<'a>(&'a self, _uri: &'a str) -> SessionFuture<'a, RawResponse> {
        let reply = next_reply(&self.resource_script);
        Box::pin(reply.play())
    }

    fn list_tools(&self) -> SessionFuture<'_, Vec<McpToolInfo>> {
        Box::pin(async {
            Ok(vec![McpToolInfo {
                name: "read_query".into(),
                description: "Execute a SELECT query".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }])
        })
    }
}
