use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] brook_store::StoreError),

    #[error("network error: {0}")]
    Network(#[from] brook_network::NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] brook_protocol::ProtocolError),

    #[error("peer {0} could not be found in the peer list")]
    UnknownSender(SocketAddr),

    #[error("key {0} not found in the network")]
    NotFoundInNetwork(String),

    #[error("key {0} is not in the local store")]
    NotInStore(String),

    #[error("peer {0} announced a stream that never opened")]
    StreamTimeout(SocketAddr),

    #[error("record channel already consumed")]
    TransportConsumed,

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
