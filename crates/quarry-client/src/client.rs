//! SQLite client over an MCP session.
//!
//! Every data operation goes through the retrying invoker and degrades instead
//! of failing: reads come back empty, writes carry an error description, and
//! the memo falls back to locally recorded insights. The only error returned
//! is [`ClientError::NotConnected`].

use crate::error::ClientError;
use crate::insight::{AppendMode, InsightMirror, InsightWorkflow, Receipt};
use crate::memo::{MEMO_URI, MemoReader};
use crate::normalize::NormalizedValue;
use crate::retry::{RetryPolicy, RetryingInvoker};
use crate::types::{ColumnInfo, Row, WriteOutcome};
use quarry_mcp::{McpSession, McpToolInfo, ServerParams, StdioSession};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Server name used for logging and error messages.
const SERVER_NAME: &str = "sqlite";

/// Client tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub retry: RetryPolicy,
    /// Timeout of the single blocking `append_insight` attempt.
    pub insight_timeout_ms: u64,
    pub memo_timeout_ms: u64,
    pub memo_uri: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            insight_timeout_ms: 5000,
            memo_timeout_ms: 5000,
            memo_uri: MEMO_URI.to_string(),
        }
    }
}

struct Connection {
    session: Arc<dyn McpSession>,
    invoker: RetryingInvoker,
    insights: InsightWorkflow,
    memo: MemoReader,
    tools: Vec<McpToolInfo>,
}

/// High-level SQLite operations against an MCP SQLite server.
pub struct SqliteClient {
    options: ClientOptions,
    mirror: InsightMirror,
    connection: Option<Connection>,
}

impl SqliteClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            mirror: InsightMirror::new(),
            connection: None,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Spawn the server described by `params` and attach to it.
    pub async fn connect(&mut self, params: &ServerParams) -> Result<(), ClientError> {
        tracing::info!("Connecting to SQLite MCP server: {}", params.command);
        let session = StdioSession::connect(SERVER_NAME, params).await?;
        self.attach(Arc::new(session)).await
    }

    /// Use an already established session. Replaces any current one.
    pub async fn attach(&mut self, session: Arc<dyn McpSession>) -> Result<(), ClientError> {
        let tools = match session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        tracing::info!("Connected to server with tools: {}", names.join(", "));

        self.disconnect().await;

        let invoker = RetryingInvoker::new(session.clone(), self.options.retry.clone());
        let insights = InsightWorkflow::new(
            invoker.clone(),
            self.mirror.clone(),
            Duration::from_millis(self.options.insight_timeout_ms),
        );
        let memo = MemoReader::new(
            session.clone(),
            self.mirror.clone(),
            self.options.memo_uri.clone(),
            Duration::from_millis(self.options.memo_timeout_ms),
        );
        self.connection = Some(Connection {
            session,
            invoker,
            insights,
            memo,
            tools,
        });
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Tools advertised by the server at connect time.
    pub fn tools(&self) -> &[McpToolInfo] {
        self.connection
            .as_ref()
            .map(|c| c.tools.as_slice())
            .unwrap_or_default()
    }

    /// Insights submitted through this client, in order.
    pub fn mirror(&self) -> &InsightMirror {
        &self.mirror
    }

    /// Close the session. The insight mirror is kept.
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::info!("Disconnecting from SQLite MCP server");
            connection.session.close().await;
        }
    }

    fn connection(&self) -> Result<&Connection, ClientError> {
        self.connection.as_ref().ok_or(ClientError::NotConnected)
    }

    /// Call any tool through the retry policy.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<NormalizedValue, ClientError> {
        let connection = self.connection()?;
        Ok(connection.invoker.invoke(tool, arguments).await?)
    }

    /// Run a SELECT. Failures and non-tabular results yield no rows.
    pub async fn execute_read_query(&self, query: &str) -> Result<Vec<Row>, ClientError> {
        let connection = self.connection()?;
        tracing::info!("Executing read query: {query}");

        match connection
            .invoker
            .invoke("read_query", json!({ "query": query }))
            .await
        {
            Ok(value) => Ok(rows_of(&value)),
            Err(e) => {
                tracing::error!("Error executing read query: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Run an INSERT, UPDATE or DELETE.
    pub async fn execute_write_query(&self, query: &str) -> Result<WriteOutcome, ClientError> {
        let connection = self.connection()?;
        tracing::info!("Executing write query: {query}");

        match connection
            .invoker
            .invoke("write_query", json!({ "query": query }))
            .await
        {
            Ok(value) => Ok(write_outcome(&value)),
            Err(e) => {
                tracing::error!("Error executing write query: {e}");
                Ok(WriteOutcome::failed(e.to_string()))
            }
        }
    }

    /// Run a CREATE TABLE. The receipt carries the server's message or
    /// `Error: <details>`.
    pub async fn create_table(&self, query: &str) -> Result<Receipt, ClientError> {
        let connection = self.connection()?;
        tracing::info!("Creating table: {query}");

        match connection
            .invoker
            .invoke("create_table", json!({ "query": query }))
            .await
        {
            Ok(value) => Ok(Receipt::new(value.to_message())),
            Err(e) => {
                tracing::error!("Error creating table: {e}");
                Ok(Receipt::new(format!("Error: {e}")))
            }
        }
    }

    /// Names of all tables. Empty on failure.
    pub async fn list_tables(&self) -> Result<Vec<String>, ClientError> {
        let connection = self.connection()?;
        tracing::info!("Listing tables");

        match connection.invoker.invoke("list_tables", json!({})).await {
            Ok(value) => Ok(rows_of(&value)
                .iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()),
            Err(e) => {
                tracing::error!("Error listing tables: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Column descriptions of `table`. Empty on failure.
    pub async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ClientError> {
        let connection = self.connection()?;
        tracing::info!("Describing table: {table}");

        match connection
            .invoker
            .invoke("describe_table", json!({ "table_name": table }))
            .await
        {
            Ok(value) => Ok(rows_of(&value)
                .into_iter()
                .filter_map(|row| match serde_json::from_value(Value::Object(row)) {
                    Ok(column) => Some(column),
                    Err(e) => {
                        tracing::debug!("Skipping unrecognized column entry: {e}");
                        None
                    }
                })
                .collect()),
            Err(e) => {
                tracing::error!("Error describing table: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Record an insight and append it to the server's memo.
    pub async fn append_insight(
        &self,
        insight: &str,
        mode: AppendMode,
    ) -> Result<Receipt, ClientError> {
        let connection = self.connection()?;
        Ok(connection.insights.append(insight, mode).await)
    }

    /// The server's memo, or one rebuilt from local insights.
    pub async fn get_insights_memo(&self) -> Result<String, ClientError> {
        let connection = self.connection()?;
        Ok(connection.memo.read().await)
    }
}

/// Object elements of a structured array result.
fn rows_of(value: &NormalizedValue) -> Vec<Row> {
    match value.as_array() {
        Some(items) => items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
        None => {
            tracing::warn!("Expected tabular result, got: {}", value.to_message());
            Vec::new()
        }
    }
}

/// `[{"affected_rows": n}]` from the server; anything else is reported back.
fn write_outcome(value: &NormalizedValue) -> WriteOutcome {
    let affected = value
        .as_array()
        .and_then(|items| items.first())
        .and_then(|first| first.get("affected_rows"))
        .and_then(Value::as_u64);

    match affected {
        Some(affected_rows) => WriteOutcome {
            affected_rows,
            error: None,
        },
        None => WriteOutcome::failed(value.to_message()),
    }
}
