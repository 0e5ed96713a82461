//! Insights memo retrieval with a local fallback.
//!
//! The server memo is returned verbatim when it can be read. Otherwise the memo
//! is rebuilt from the local mirror. The two are never merged, so a later read
//! may show richer server-side content than an earlier fallback did.

use crate::insight::{InsightMirror, InsightRecord};
use crate::normalize::text_content;
use quarry_mcp::McpSession;
use std::sync::Arc;
use std::time::Duration;

/// URI of the server's aggregated insights memo.
pub const MEMO_URI: &str = "memo://insights";

pub const NO_INSIGHTS: &str = "No business insights have been discovered yet.";

const MEMO_HEADER: &str = "📊 Business Intelligence Memo 📊\n\nKey Insights Discovered:\n\n";

/// Reads the memo resource, falling back to the local mirror.
#[derive(Clone)]
pub struct MemoReader {
    session: Arc<dyn McpSession>,
    mirror: InsightMirror,
    uri: String,
    timeout: Duration,
}

impl MemoReader {
    pub fn new(
        session: Arc<dyn McpSession>,
        mirror: InsightMirror,
        uri: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            session,
            mirror,
            uri: uri.into(),
            timeout,
        }
    }

    /// Current memo text. Never fails.
    pub async fn read(&self) -> String {
        tracing::info!("Retrieving insights memo");
        match self.read_remote().await {
            Ok(text) => text,
            Err(reason) => {
                tracing::warn!("Server memo retrieval failed: {reason}, using local insights");
                render_local_memo(&self.mirror.snapshot())
            }
        }
    }

    async fn read_remote(&self) -> Result<String, String> {
        let raw = tokio::time::timeout(self.timeout, self.session.read_resource(&self.uri))
            .await
            .map_err(|_| format!("timed out after {}ms", self.timeout.as_millis()))?
            .map_err(|e| e.to_string())?;
        text_content(&raw)
            .map(str::to_string)
            .ok_or_else(|| format!("memo resource has no text content: {raw}"))
    }
}

/// Memo text built from locally recorded insights.
pub fn render_local_memo(records: &[InsightRecord]) -> String {
    if records.is_empty() {
        return NO_INSIGHTS.to_string();
    }

    let mut memo = String::from(MEMO_HEADER);
    let lines: Vec<String> = records.iter().map(|r| format!("- {}", r.text)).collect();
    memo.push_str(&lines.join("\n"));

    if records.len() > 1 {
        memo.push_str("\n\nSummary:\n");
        memo.push_str(&format!(
            "Analysis has revealed {} key business insights that suggest opportunities for strategic optimization and growth.",
            records.len()
        ));
    }
    memo
}
