use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("dial to {addr} failed: {source}")]
    Dial {
        addr: String,
        source: std::io::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("peer rejected: {0}")]
    PeerRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
