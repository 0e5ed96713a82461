//! Layered configuration for quarry.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

mod error;

pub use error::ConfigError;

use quarry_client::{ClientOptions, RetryPolicy};
use quarry_mcp::ServerParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The default SQLite MCP server executable.
pub const DEFAULT_SERVER_PATH: &str = "mcp-server-sqlite";

/// The default database file.
pub const DEFAULT_DB_PATH: &str = "~/test.db";

/// Resolved configuration for a quarry run.
#[derive(Debug, Clone)]
pub struct QuarryConfig {
    pub server: ServerParams,
    pub options: ClientOptions,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub path: Option<String>,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSettings {
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub insight_timeout_ms: Option<u64>,
    pub memo_timeout_ms: Option<u64>,
    /// Per-tool timeout overrides in milliseconds.
    #[serde(default)]
    pub tool_timeouts: HashMap<String, u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_path: Option<String>,
    pub db_path: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl QuarryConfig {
    /// Load configuration from the process environment and the config file.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables (`SQLITE_SERVER_PATH`, `SQLITE_DB_PATH`,
    ///    `TIMEOUT_SECONDS`, `RETRY_ATTEMPTS`, `RETRY_DELAY`)
    /// 3. Config file (~/.quarry/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::load_with(overrides, config_dir(), |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), with an explicit config dir and env lookup.
    pub fn load_with(
        overrides: CliOverrides,
        config_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let settings = load_settings_file(&config_dir.join("config.toml"));
        let defaults = ClientOptions::default();

        // Resolve server: CLI > env > config file > default
        let server_path = overrides
            .server_path
            .or_else(|| env("SQLITE_SERVER_PATH"))
            .or(settings.server.path)
            .unwrap_or_else(|| DEFAULT_SERVER_PATH.to_string());

        let db_path = overrides
            .db_path
            .or_else(|| env("SQLITE_DB_PATH"))
            .or(settings.server.db_path)
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = expand_home(&db_path);

        // Environment timings are in seconds
        let default_timeout_ms = match overrides.timeout_ms {
            Some(ms) => ms,
            None => match env_seconds(&env, "TIMEOUT_SECONDS")? {
                Some(ms) => ms,
                None => settings
                    .client
                    .timeout_ms
                    .unwrap_or(defaults.retry.default_timeout_ms),
            },
        };

        let max_retries = match overrides.max_retries {
            Some(n) => n,
            None => match env_parse::<u32>(&env, "RETRY_ATTEMPTS")? {
                Some(n) => n,
                None => settings
                    .client
                    .max_retries
                    .unwrap_or(defaults.retry.max_retries),
            },
        };

        let retry_delay_ms = match overrides.retry_delay_ms {
            Some(ms) => ms,
            None => match env_seconds(&env, "RETRY_DELAY")? {
                Some(ms) => ms,
                None => settings
                    .client
                    .retry_delay_ms
                    .unwrap_or(defaults.retry.retry_delay_ms),
            },
        };

        let mut tool_timeouts_ms = defaults.retry.tool_timeouts_ms;
        tool_timeouts_ms.extend(settings.client.tool_timeouts);

        let options = ClientOptions {
            retry: RetryPolicy {
                max_retries,
                retry_delay_ms,
                default_timeout_ms,
                tool_timeouts_ms,
            },
            insight_timeout_ms: settings
                .client
                .insight_timeout_ms
                .unwrap_or(defaults.insight_timeout_ms),
            memo_timeout_ms: settings
                .client
                .memo_timeout_ms
                .unwrap_or(defaults.memo_timeout_ms),
            memo_uri: defaults.memo_uri,
        };

        // The client enforces per-call timeouts; the transport only needs to
        // outlast the longest of them.
        let server = ServerParams::for_server(&server_path, Some(&db_path))
            .with_timeout_ms(longest_timeout_ms(&options));

        Ok(QuarryConfig {
            server,
            options,
            config_dir,
        })
    }
}

fn longest_timeout_ms(options: &ClientOptions) -> u64 {
    options
        .retry
        .tool_timeouts_ms
        .values()
        .copied()
        .chain([
            options.retry.default_timeout_ms,
            options.insight_timeout_ms,
            options.memo_timeout_ms,
        ])
        .max()
        .unwrap_or(options.retry.default_timeout_ms)
}

fn env_parse<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, format!("{raw:?}: {e}"))),
        None => Ok(None),
    }
}

/// A non-negative number of seconds, converted to milliseconds.
fn env_seconds(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, ConfigError> {
    match env_parse::<f64>(env, key)? {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some((secs * 1000.0).round() as u64)),
        Some(secs) => Err(ConfigError::invalid(
            key,
            format!("expected a non-negative number of seconds, got {secs}"),
        )),
        None => Ok(None),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs_next::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

/// Get the quarry config directory path (~/.quarry/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("QUARRY_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quarry")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}
