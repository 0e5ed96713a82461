//! Tool calls with per-call timeouts and bounded retries.
//!
//! Attempt 0 is the initial try; attempts `1..=max_retries` are retries with a
//! fixed delay in between. A timeout only cancels the in-flight attempt. Worst
//! case latency is `(max_retries + 1) * timeout + max_retries * retry_delay`.

use crate::error::ToolCallError;
use crate::normalize::{NormalizedValue, extract_text, normalize};
use quarry_mcp::McpSession;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Name of the tool that appends to the insights memo.
pub const APPEND_INSIGHT_TOOL: &str = "append_insight";

/// Retry and timeout configuration for tool calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (0 = single attempt).
    pub max_retries: u32,
    /// Fixed pause between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Timeout for tools without an override.
    pub default_timeout_ms: u64,
    /// Per-tool timeout overrides.
    pub tool_timeouts_ms: HashMap<String, u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_ms: 2000,
            default_timeout_ms: 90_000,
            tool_timeouts_ms: HashMap::from([(APPEND_INSIGHT_TOOL.to_string(), 60_000)]),
        }
    }
}

impl RetryPolicy {
    /// Timeout for `tool`: its override if present, else the default.
    pub fn timeout_for(&self, tool: &str) -> Duration {
        Duration::from_millis(
            self.tool_timeouts_ms
                .get(tool)
                .copied()
                .unwrap_or(self.default_timeout_ms),
        )
    }

    /// Upper bound on the time [`RetryingInvoker::invoke`] can take for `tool`.
    pub fn worst_case(&self, tool: &str) -> Duration {
        let attempts = self.max_retries + 1;
        self.timeout_for(tool) * attempts
            + Duration::from_millis(self.retry_delay_ms) * self.max_retries
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    Success(NormalizedValue),
    TimedOut,
    Failed(String),
}

/// Wraps tool calls on a shared session with the retry policy.
#[derive(Clone)]
pub struct RetryingInvoker {
    session: Arc<dyn McpSession>,
    policy: Arc<RetryPolicy>,
}

impl RetryingInvoker {
    pub fn new(session: Arc<dyn McpSession>, policy: RetryPolicy) -> Self {
        Self {
            session,
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn session(&self) -> &Arc<dyn McpSession> {
        &self.session
    }

    /// One attempt under `timeout`.
    ///
    /// A result the server flags as an error counts as a failed attempt.
    pub async fn attempt(
        &self,
        tool: &str,
        arguments: &serde_json::Value,
        timeout: Duration,
    ) -> ToolCallOutcome {
        let call = self.session.call_tool(tool, arguments.clone());
        match tokio::time::timeout(timeout, call).await {
            Err(_) => ToolCallOutcome::TimedOut,
            Ok(Err(e)) if e.is_timeout() => ToolCallOutcome::TimedOut,
            Ok(Err(e)) => ToolCallOutcome::Failed(e.to_string()),
            Ok(Ok(raw)) if raw.is_error() => ToolCallOutcome::Failed(extract_text(&raw)),
            Ok(Ok(raw)) => ToolCallOutcome::Success(normalize(&raw)),
        }
    }

    /// Call `tool`, retrying on timeouts and failures until the policy is
    /// exhausted. The error reflects the last attempt.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<NormalizedValue, ToolCallError> {
        let timeout = self.policy.timeout_for(tool);
        let total = self.policy.max_retries.saturating_add(1);

        let mut attempts = 0;
        loop {
            attempts += 1;
            tracing::debug!("Calling tool '{tool}' (attempt {attempts}/{total})");

            let failure = match self.attempt(tool, &arguments, timeout).await {
                ToolCallOutcome::Success(value) => return Ok(value),
                ToolCallOutcome::TimedOut => ToolCallError::TimedOut {
                    tool: tool.to_string(),
                    attempts,
                    timeout_ms: timeout.as_millis() as u64,
                },
                ToolCallOutcome::Failed(message) => ToolCallError::Failed {
                    tool: tool.to_string(),
                    attempts,
                    message,
                },
            };

            if attempts >= total {
                tracing::error!(
                    "Tool call failed after {} retries: {failure}",
                    self.policy.max_retries
                );
                return Err(failure);
            }

            tracing::warn!(
                "Tool call failed, retrying ({attempts}/{}): {failure}",
                self.policy.max_retries
            );
            tokio::time::sleep(Duration::from_millis(self.policy.retry_delay_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedSession};
    use quarry_mcp::RawResponse;
    use std::time::Instant;

    fn fast_policy(max_retries: u32, timeout_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay_ms: 0,
            default_timeout_ms: timeout_ms,
            tool_timeouts_ms: HashMap::new(),
        }
    }

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.retry_delay_ms, 2000);
        assert_eq!(policy.timeout_for("read_query"), Duration::from_secs(90));
        assert_eq!(
            policy.timeout_for(APPEND_INSIGHT_TOOL),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn worst_case_bound() {
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay_ms: 100,
            default_timeout_ms: 1000,
            tool_timeouts_ms: HashMap::new(),
        };
        assert_eq!(policy.worst_case("any"), Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn always_timing_out_makes_max_retries_plus_one_attempts() {
        let session = ScriptedSession::new(vec![Reply::Hang]);
        let invoker = RetryingInvoker::new(session.clone(), fast_policy(3, 20));

        let err = invoker
            .invoke("read_query", serde_json::json!({"query": "SELECT 1"}))
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "{err}");
        assert_eq!(err.attempts(), 4);
        assert_eq!(session.tool_calls(), 4);
    }

    #[tokio::test]
    async fn succeeds_after_k_failures() {
        for k in 0..=3u32 {
            let mut script = vec![Reply::Fail("connection reset".into()); k as usize];
            script.push(Reply::Raw(RawResponse::tool_text("[{'n': 1}]")));
            let session = ScriptedSession::new(script);
            let invoker = RetryingInvoker::new(session.clone(), fast_policy(3, 50));

            let value = invoker
                .invoke("read_query", serde_json::json!({}))
                .await
                .unwrap();

            assert_eq!(
                value,
                NormalizedValue::Structured(serde_json::json!([{"n": 1}]))
            );
            assert_eq!(session.tool_calls(), k as usize + 1);
        }
    }

    #[tokio::test]
    async fn two_failures_then_ok_returns_text() {
        let session = ScriptedSession::new(vec![
            Reply::Fail("boom".into()),
            Reply::Fail("boom".into()),
            Reply::Raw(RawResponse::text("OK")),
        ]);
        let invoker = RetryingInvoker::new(session.clone(), fast_policy(2, 50));

        let value = invoker.invoke("write_query", serde_json::json!({})).await;
        assert_eq!(value.unwrap(), NormalizedValue::Text("OK".into()));
        assert_eq!(session.tool_calls(), 3);
    }

    #[tokio::test]
    async fn last_error_wins_and_keeps_its_kind() {
        let session = ScriptedSession::new(vec![
            Reply::Hang,
            Reply::Fail("disk I/O error".into()),
        ]);
        let invoker = RetryingInvoker::new(session, fast_policy(1, 20));

        match invoker.invoke("write_query", serde_json::json!({})).await {
            Err(ToolCallError::Failed {
                attempts, message, ..
            }) => {
                assert_eq!(attempts, 2);
                assert!(message.contains("disk I/O error"), "{message}");
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_flagged_error_is_retried() {
        let session = ScriptedSession::new(vec![
            Reply::Raw(RawResponse::tool_error("database is locked")),
            Reply::Raw(RawResponse::tool_text("done")),
        ]);
        let invoker = RetryingInvoker::new(session.clone(), fast_policy(1, 50));

        let value = invoker.invoke("write_query", serde_json::json!({})).await;
        assert_eq!(value.unwrap(), NormalizedValue::Text("done".into()));
        assert_eq!(session.tool_calls(), 2);
    }

    #[tokio::test]
    async fn zero_retries_is_a_single_attempt() {
        let session = ScriptedSession::new(vec![Reply::Fail("nope".into())]);
        let invoker = RetryingInvoker::new(session.clone(), fast_policy(0, 50));

        assert!(invoker.invoke("list_tables", serde_json::json!({})).await.is_err());
        assert_eq!(session.tool_calls(), 1);
    }

    #[tokio::test]
    async fn elapsed_time_respects_worst_case_bound() {
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay_ms: 10,
            default_timeout_ms: 40,
            tool_timeouts_ms: HashMap::new(),
        };
        let bound = policy.worst_case("read_query");
        let session = ScriptedSession::new(vec![Reply::Hang]);
        let invoker = RetryingInvoker::new(session, policy);

        let start = Instant::now();
        let result = invoker.invoke("read_query", serde_json::json!({})).await;
        let elapsed = start.elapsed();

        assert!(result.is_err());
        // Every attempt must have waited out its full timeout
        assert!(elapsed >= Duration::from_millis(140), "{elapsed:?}");
        assert!(elapsed < bound + Duration::from_millis(500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn per_tool_override_is_used() {
        let mut policy = fast_policy(0, 10);
        policy
            .tool_timeouts_ms
            .insert("slow_tool".to_string(), 500);
        let session = ScriptedSession::new(vec![Reply::Delayed(
            Duration::from_millis(100),
            RawResponse::text("finally"),
        )]);
        let invoker = RetryingInvoker::new(session, policy);

        let value = invoker.invoke("slow_tool", serde_json::json!({})).await;
        assert_eq!(value.unwrap(), NormalizedValue::Text("finally".into()));
    }
}
