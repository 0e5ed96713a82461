//! Launch parameters for an MCP server process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_timeout() -> u64 {
    90_000
}

/// How to start one stdio MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerParams {
    /// Program to run (e.g. "mcp-server-sqlite", "python").
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Ambient timeout for each request in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl ServerParams {
    /// Build parameters from a server path and optional database path.
    ///
    /// Scripts ending in `.py` run under `python` and `.js` under `node`;
    /// anything else is executed directly. The database is passed as
    /// `--db-path <path>`.
    pub fn for_server(server_path: &str, db_path: Option<&str>) -> Self {
        let (command, mut args) = if server_path.ends_with(".py") {
            ("python".to_string(), vec![server_path.to_string()])
        } else if server_path.ends_with(".js") {
            ("node".to_string(), vec![server_path.to_string()])
        } else {
            (server_path.to_string(), Vec::new())
        };

        if let Some(db) = db_path {
            args.push("--db-path".to_string());
            args.push(db.to_string());
        }

        Self {
            command,
            args,
            env: HashMap::new(),
            timeout_ms: default_timeout(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_script_runs_under_python() {
        let params = ServerParams::for_server("servers/sqlite.py", Some("/tmp/test.db"));
        assert_eq!(params.command, "python");
        assert_eq!(
            params.args,
            vec!["servers/sqlite.py", "--db-path", "/tmp/test.db"]
        );
    }

    #[test]
    fn node_script_runs_under_node() {
        let params = ServerParams::for_server("server.js", None);
        assert_eq!(params.command, "node");
        assert_eq!(params.args, vec!["server.js"]);
    }

    #[test]
    fn plain_command_is_executed_directly() {
        let params = ServerParams::for_server("mcp-server-sqlite", Some("~/test.db"));
        assert_eq!(params.command, "mcp-server-sqlite");
        assert_eq!(params.args, vec!["--db-path", "~/test.db"]);
        assert_eq!(params.timeout_ms, 90_000);
    }

    #[test]
    fn parse_from_toml() {
        let toml_str = r#"
command = "uvx"
args = ["mcp-server-sqlite", "--db-path", "shop.db"]
timeout_ms = 30000
env = { LOG_LEVEL = "debug" }
"#;
        let params: ServerParams = toml::from_str(toml_str).unwrap();
        assert_eq!(params.command, "uvx");
        assert_eq!(params.args.len(), 3);
        assert_eq!(params.timeout_ms, 30_000);
        assert_eq!(params.env["LOG_LEVEL"], "debug");
    }
}
