//! Stdio transport for MCP server communication.
//!
//! Spawns the server as a child process and exchanges newline-delimited
//! JSON-RPC messages over its stdin/stdout. Requests are matched to responses
//! by id through a pending map filled by a background reader task.

use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

type PendingMap = Arc<StdMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// How long a closing server gets to exit on its own before it is killed.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Async stdio channel to one MCP server process.
pub struct StdioTransport {
    name: String,
    next_id: AtomicU64,
    write_tx: Mutex<Option<mpsc::Sender<String>>>,
    pending: PendingMap,
    /// Set once the server's stdout has closed.
    disconnected: Arc<AtomicBool>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    child: Mutex<Child>,
    timeout_ms: u64,
}

/// Removes a pending entry when a request future is dropped early, e.g. when
/// the caller wraps it in its own timeout.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

fn lock_pending(
    pending: &PendingMap,
) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcResponse>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StdioTransport {
    /// Spawn the server process and start the reader/writer tasks.
    pub fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: command.to_string(),
            source: e,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child stdout unavailable".to_string()))?;

        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));

        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let writer_handle = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = write_rx.recv().await {
                if stdin.write_all(msg.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                    || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        });

        let pending_for_reader = Arc::clone(&pending);
        let disconnected = Arc::new(AtomicBool::new(false));
        let disconnected_for_reader = Arc::clone(&disconnected);
        let server = name.to_string();
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let resp: JsonRpcResponse = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::debug!("Ignoring non-JSON-RPC line from '{server}': {e}");
                        continue;
                    }
                };
                // Server-initiated notifications carry no id and are dropped
                let Some(id) = resp.id else {
                    continue;
                };
                let waiter = lock_pending(&pending_for_reader).remove(&id);
                if let Some(tx) = waiter {
                    let _ = tx.send(resp);
                }
            }
            tracing::debug!("MCP server '{server}' closed its stdout");
            // Fail waiting requests now instead of at their timeout
            disconnected_for_reader.store(true, Ordering::SeqCst);
            lock_pending(&pending_for_reader).clear();
        });

        Ok(Self {
            name: name.to_string(),
            next_id: AtomicU64::new(1),
            write_tx: Mutex::new(Some(write_tx)),
            pending,
            disconnected,
            reader_handle,
            writer_handle,
            child: Mutex::new(child),
            timeout_ms,
        })
    }

    fn closed_error(&self) -> McpError {
        McpError::Closed {
            name: self.name.clone(),
        }
    }

    async fn sender(&self) -> Result<mpsc::Sender<String>, McpError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        self.write_tx
            .lock()
            .await
            .clone()
            .ok_or_else(|| self.closed_error())
    }

    /// Send a request and wait for the matching response.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let serialized = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // Checked after registering, so a concurrent disconnect either shows
        // up here or drops our sender
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }

        self.sender()
            .await?
            .send(serialized)
            .await
            .map_err(|_| self.closed_error())?;

        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(McpError::Protocol(format!(
                "MCP server '{}' exited before answering {method}",
                self.name
            ))),
            Err(_) => Err(McpError::Timeout {
                name: method.to_string(),
                timeout_ms: self.timeout_ms,
            }),
        }
    }

    /// Send a notification; nothing is awaited beyond the write queue.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let serialized = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.sender()
            .await?
            .send(serialized)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Close stdin, give the server a grace period to exit, then kill it.
    ///
    /// Requests issued after this return `McpError::Closed`.
    pub async fn close(&self) {
        drop(self.write_tx.lock().await.take());

        let mut child = self.child.lock().await;
        if tokio::time::timeout(CLOSE_GRACE, child.wait()).await.is_err() {
            tracing::debug!("MCP server '{}' did not exit, killing it", self.name);
            let _ = child.kill().await;
        }

        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}
