//! Insight submission with a local mirror.
//!
//! Every insight is recorded in the local mirror before any network I/O, so
//! the memo fallback can always show it. The remote append then runs either
//! inline (one attempt, short timeout) or as a detached background task that
//! goes through the retrying invoker.

use crate::normalize::NormalizedValue;
use crate::retry::{APPEND_INSIGHT_TOOL, RetryingInvoker, ToolCallOutcome};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const NON_BLOCKING_STARTED: &str = "Insight submission started (non-blocking)";
pub const BLOCKING_TIMED_OUT: &str = "Insight submission timed out, but may have succeeded";

/// An insight accepted by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightRecord {
    pub text: String,
}

/// Append-only, insertion-ordered list of submitted insights.
///
/// Clones share the same list. Background tasks run on a multi-threaded
/// runtime, hence the mutex; it is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct InsightMirror {
    records: Arc<Mutex<Vec<InsightRecord>>>,
}

impl InsightMirror {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<InsightRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, text: impl Into<String>) {
        self.lock().push(InsightRecord { text: text.into() });
    }

    /// Copy of the records in submission order.
    pub fn snapshot(&self) -> Vec<InsightRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// How the remote append is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendMode {
    /// Wait for a single attempt bounded by the insight timeout.
    #[default]
    Blocking,
    /// Schedule the append in the background and return at once.
    NonBlocking,
}

/// Message returned by write-style operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub message: String,
}

impl Receipt {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Submits insights to the server's memo.
#[derive(Clone)]
pub struct InsightWorkflow {
    invoker: RetryingInvoker,
    mirror: InsightMirror,
    blocking_timeout: Duration,
}

impl InsightWorkflow {
    pub fn new(invoker: RetryingInvoker, mirror: InsightMirror, blocking_timeout: Duration) -> Self {
        Self {
            invoker,
            mirror,
            blocking_timeout,
        }
    }

    pub fn mirror(&self) -> &InsightMirror {
        &self.mirror
    }

    /// Record `text` locally, then append it remotely according to `mode`.
    ///
    /// Never fails. A blocking timeout is reported as a soft failure because
    /// the server may have committed the write anyway.
    pub async fn append(&self, text: &str, mode: AppendMode) -> Receipt {
        tracing::info!("Appending insight: {text}");
        self.mirror.push(text);

        let arguments = serde_json::json!({ "insight": text });

        if mode == AppendMode::NonBlocking {
            let invoker = self.invoker.clone();
            tokio::spawn(async move {
                match invoker.invoke(APPEND_INSIGHT_TOOL, arguments).await {
                    Ok(_) => tracing::info!("Background insight added successfully"),
                    Err(e) if e.is_timeout() => tracing::warn!(
                        "Background insight submission timed out, but may have succeeded: {e}"
                    ),
                    Err(e) => tracing::error!("Error in background insight task: {e}"),
                }
            });
            return Receipt::new(NON_BLOCKING_STARTED);
        }

        // Single attempt with the dedicated short timeout, no retry loop
        match self
            .invoker
            .attempt(APPEND_INSIGHT_TOOL, &arguments, self.blocking_timeout)
            .await
        {
            ToolCallOutcome::Success(value) => Receipt::new(success_message(&value)),
            ToolCallOutcome::TimedOut => {
                tracing::warn!("Append insight timed out, but the operation may have succeeded");
                Receipt::new(BLOCKING_TIMED_OUT)
            }
            ToolCallOutcome::Failed(details) => {
                tracing::error!("Error appending insight: {details}");
                Receipt::new(format!("Error: {details}"))
            }
        }
    }
}

fn success_message(value: &NormalizedValue) -> String {
    let message = value.to_message();
    if message.trim().is_empty() {
        "Insight added to memo".to_string()
    } else {
        message
    }
}
