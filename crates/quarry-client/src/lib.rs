//! Reliable client for SQLite MCP servers.
//!
//! Wraps an MCP session with per-call timeouts, bounded retries, response
//! normalization, and an insight workflow whose memo stays readable when the
//! server does not answer.

pub mod analysis;
pub mod client;
pub mod error;
pub mod insight;
mod literal;
pub mod memo;
pub mod normalize;
pub mod query;
pub mod retry;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::{ClientOptions, SqliteClient};
pub use error::{ClientError, ToolCallError};
pub use insight::{AppendMode, InsightMirror, InsightRecord, InsightWorkflow, Receipt};
pub use memo::{MEMO_URI, MemoReader};
pub use normalize::NormalizedValue;
pub use retry::{RetryPolicy, RetryingInvoker, ToolCallOutcome};
pub use types::{ColumnInfo, Row, WriteOutcome};
