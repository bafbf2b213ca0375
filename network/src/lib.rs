//! TCP networking layer for brook.
//!
//! Owns connection establishment and supervision, the per-connection
//! frame decode loop, and the single shared record channel that hands
//! decoded frames to the replication engine.

pub mod codec;
pub mod error;
pub mod peer;
pub mod transport;

pub use codec::{read_frame, DecodeError, Frame};
pub use error::NetworkError;
pub use peer::{Direction, TcpPeer};
pub use transport::{
    no_op_handshake, HandshakeFn, OnDisconnect, OnPeer, ProtocolRecord, TcpTransport,
    TransportOpts,
};
