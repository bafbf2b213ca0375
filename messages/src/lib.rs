//! Control message types exchanged between brook nodes.
//!
//! The set is closed: adding a variant requires updating the control-loop
//! dispatch exhaustively, which is the point — there is no runtime message
//! registration.

use serde::{Deserialize, Serialize};

/// A replication request carried inside a `MESSAGE` frame.
///
/// `StoreFile` announces that `size` raw bytes for `key` follow on the
/// same connection as an out-of-band stream. `GetFile` asks the receiver
/// to stream `key` back if it has it; not having it is signalled by
/// silence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    StoreFile { key: String, size: u64 },
    GetFile { key: String },
}

impl ControlMessage {
    /// The key this message is about.
    pub fn key(&self) -> &str {
        match self {
            Self::StoreFile { key, .. } => key,
            Self::GetFile { key } => key,
        }
    }
}
