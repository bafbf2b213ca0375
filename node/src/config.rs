//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::NodeError;

/// Configuration for a brook node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address to listen on for peer connections.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Root directory for stored content.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Peer addresses to dial on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    /// How long a network get waits for answers after broadcasting, in
    /// milliseconds.
    #[serde(default = "default_get_grace_ms")]
    pub get_grace_ms: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./brook_data")
}

fn default_get_grace_ms() -> u64 {
    500
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage_root: default_storage_root(),
            bootstrap_peers: Vec::new(),
            get_grace_ms: default_get_grace_ms(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
