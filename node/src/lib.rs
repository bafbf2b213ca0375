//! Brook node — the replication engine.
//!
//! The node is the coordinator that:
//! - Maintains the registry of connected peers
//! - Consumes the transport's record channel in a single control loop
//! - Replicates local stores to every peer and serves remote requests
//! - Falls back to the network for reads it cannot satisfy locally

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod registry;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::BrookNode;
pub use registry::PeerRegistry;
pub use shutdown::ShutdownController;
