//! Brook daemon — entry point for running a brook node.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use brook_node::{init_logging, BrookNode, LogFormat, NodeConfig};

#[derive(Parser)]
#[command(name = "brook-daemon", about = "Brook content-store node daemon")]
struct Cli {
    /// Address to listen on for peer connections.
    #[arg(long, env = "BROOK_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Root directory for stored content.
    #[arg(long, env = "BROOK_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// Bootstrap peer addresses (comma-separated "host:port").
    #[arg(long, env = "BROOK_BOOTSTRAP_PEERS", value_delimiter = ',')]
    bootstrap_peers: Vec<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "BROOK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "BROOK_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings are
    /// used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => NodeConfig::default(),
    };

    if let Some(listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr;
    }
    if let Some(storage_root) = cli.storage_root {
        config.storage_root = storage_root;
    }
    if !cli.bootstrap_peers.is_empty() {
        config.bootstrap_peers = cli.bootstrap_peers;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }
    if let Some(log_format) = cli.log_format {
        config.log_format = log_format;
    }

    let format = match config.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Human,
    };
    init_logging(format, &config.log_level);

    let node = BrookNode::new(config);
    let addr = node.start().await.context("failed to start node")?;
    tracing::info!(%addr, "brook node running");

    node.shutdown.wait_for_signal().await;
    tracing::info!("brook node stopped");

    Ok(())
}
