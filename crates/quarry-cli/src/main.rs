//! quarry: query SQLite MCP servers from the terminal.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quarry_client::SqliteClient;
use quarry_config::{CliOverrides, ConfigError, QuarryConfig};
use std::io;

#[derive(Parser)]
#[command(name = "quarry", version, about = "Query SQLite MCP servers")]
struct Cli {
    /// Server executable or script (.py runs under python, .js under node)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Database file passed to the server
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Per-attempt tool call timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Retries after the first attempt
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Pause between attempts in milliseconds
    #[arg(long, global = true)]
    retry_delay_ms: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// List the tools the server advertises
    Tools,
    /// List tables
    Tables,
    /// Show a table's columns
    Describe { table: String },
    /// Run a SELECT and print the rows
    Query { sql: String },
    /// Run an INSERT, UPDATE or DELETE
    Exec { sql: String },
    /// Run a CREATE TABLE
    CreateTable { sql: String },
    /// Add a business insight to the memo
    Insight {
        text: String,
        /// Hand the append to a background task; it is dropped if quarry
        /// exits before the server answers
        #[arg(long)]
        no_wait: bool,
    },
    /// Print the insights memo
    Memo,
    /// Run a SELECT, derive insights from the rows and add them to the memo
    Analyze {
        sql: String,
        /// Heading for the memo entry
        #[arg(long)]
        context: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = resolve_config(QuarryConfig::load(CliOverrides {
        server_path: cli.server,
        db_path: cli.db_path,
        timeout_ms: cli.timeout_ms,
        max_retries: cli.max_retries,
        retry_delay_ms: cli.retry_delay_ms,
    }))?;
    tracing::debug!(
        "Using config dir {}, server: {} {}",
        config.config_dir.display(),
        config.server.command,
        config.server.args.join(" ")
    );

    let mut client = SqliteClient::new(config.options.clone());
    client
        .connect(&config.server)
        .await
        .with_context(|| format!("Failed to connect to {}", config.server.command))?;

    let result = commands::run(&client, cli.command).await;
    client.disconnect().await;
    result
}

fn resolve_config(loaded: Result<QuarryConfig, ConfigError>) -> Result<QuarryConfig> {
    loaded.context("Failed to load configuration")
}
