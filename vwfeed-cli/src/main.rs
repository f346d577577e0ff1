//! vwfeed CLI: turn a warehouse table into Vowpal Wabbit training input.
//!
//! `run` materializes the converted table, `plan` prints the generated
//! queries, `preview` renders sample rows locally.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// vwfeed: warehouse tables in, Vowpal Wabbit lines out
#[derive(Parser, Debug)]
#[command(name = "vwfeed", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (where `.vwfeed/config.toml` is looked up)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create the destination table and fill it with converted rows
    Run {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Print the generated DDL and materialization query without running them
    Plan {
        #[command(flatten)]
        job: JobArgs,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render rows from a JSON-lines file the way the engine would
    Preview {
        #[command(flatten)]
        job: JobArgs,
        /// JSON-lines file, one object per row
        #[arg(long)]
        rows: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

/// Job description shared by `run`, `plan` and `preview`.
#[derive(clap::Args, Debug, Clone)]
struct JobArgs {
    /// Source table as db.table
    #[arg(long)]
    src: String,

    /// Destination table name (no database; created in the configured destination db)
    #[arg(long)]
    dst: String,

    /// Label column
    #[arg(long)]
    label: String,

    /// Tag column, passed through to identify rows
    #[arg(long)]
    tag: String,

    /// Maximum number of rows to convert
    #[arg(long)]
    limit: Option<u64>,

    /// Extra SQL predicate ANDed into the WHERE clause
    #[arg(long)]
    filter: Option<String>,

    /// Columns to leave out (repeatable or comma-separated)
    #[arg(long = "exclude", value_delimiter = ',')]
    excludes: Vec<String>,

    /// Namespace override as column=namespace (repeatable)
    #[arg(long = "namespace", value_parser = parse_key_val)]
    namespaces: Vec<(String, String)>,

    /// Engine setting as key=value (repeatable)
    #[arg(long = "engine-conf", value_parser = parse_key_val)]
    engine_conf: Vec<(String, String)>,

    /// Read table schemas from this TOML/JSON file instead of the engine
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Kill the engine after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "vwfeed", "vwfeed")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "vwfeed.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = vwfeed_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    commands::handle_command(cli.command, config, &workspace).await
}
