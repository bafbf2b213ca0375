//! A single established peer connection.
//!
//! The connection's two halves live behind mutexes so the decode loop and
//! the replication engine can share them: the decode loop reads frames,
//! the engine reads raw stream bytes and writes outbound frames. The
//! stream rendezvous below keeps the two readers from ever interleaving.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard, Notify};

use brook_protocol::TAG_STREAM;

/// How the connection came to exist. Informational only — both directions
/// behave identically once established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// We opened the connection.
    Dialed,
    /// The remote connected to our listener.
    Accepted,
}

/// One live TCP connection to a remote node.
///
/// # Stream rendezvous
///
/// When the decode loop reads a `STREAM` tag it calls [`begin_stream`] and
/// parks on [`stream_closed`]; whoever drains the raw bytes first awaits
/// [`wait_stream`] (so it cannot start before the tag has been consumed),
/// reads from [`lock_reader`], and finishes with [`close_stream`]. Both
/// signals are single-permit, matching the one-outstanding-stream rule:
/// while the decode loop is parked it cannot read another tag, so a second
/// stream waits in the socket untouched.
///
/// [`begin_stream`]: TcpPeer::begin_stream
/// [`stream_closed`]: TcpPeer::stream_closed
/// [`wait_stream`]: TcpPeer::wait_stream
/// [`lock_reader`]: TcpPeer::lock_reader
/// [`close_stream`]: TcpPeer::close_stream
pub struct TcpPeer {
    addr: SocketAddr,
    direction: Direction,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    stream_open: Notify,
    stream_done: Notify,
    stream_pending: AtomicBool,
}

impl TcpPeer {
    pub fn new(stream: TcpStream, direction: Direction) -> std::io::Result<Self> {
        let addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            addr,
            direction,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            stream_open: Notify::new(),
            stream_done: Notify::new(),
            stream_pending: AtomicBool::new(false),
        })
    }

    /// Remote address of the connection — the peer's identity.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Write a complete frame (or any raw bytes) to the peer.
    pub async fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Send a `STREAM` frame: the tag, an optional big-endian size
    /// announcement, then everything `reader` yields. Returns the number
    /// of raw bytes streamed.
    ///
    /// The writer lock is held across the whole stream so concurrent
    /// sends cannot splice bytes into it.
    pub async fn send_stream<R>(&self, size: Option<u64>, reader: &mut R) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut writer = self.writer.lock().await;
        writer.write_all(&[TAG_STREAM]).await?;
        if let Some(size) = size {
            writer.write_u64(size).await?;
        }
        let streamed = tokio::io::copy(reader, &mut *writer).await?;
        writer.flush().await?;
        Ok(streamed)
    }

    /// Exclusive access to the read half, for draining raw stream bytes.
    pub async fn lock_reader(&self) -> MutexGuard<'_, OwnedReadHalf> {
        self.reader.lock().await
    }

    /// Called by the decode loop when it reads a `STREAM` tag, before it
    /// parks. Stores the wake-up permit for [`wait_stream`].
    ///
    /// [`wait_stream`]: TcpPeer::wait_stream
    pub fn begin_stream(&self) {
        self.stream_pending.store(true, Ordering::SeqCst);
        self.stream_open.notify_one();
    }

    /// Wait until an announced stream is readable on this connection.
    pub async fn wait_stream(&self) {
        self.stream_open.notified().await;
    }

    /// Whether a stream has been announced and not yet drained.
    pub fn has_pending_stream(&self) -> bool {
        self.stream_pending.load(Ordering::SeqCst)
    }

    /// Signal that the current stream has been fully drained, resuming
    /// the connection's decode loop.
    pub fn close_stream(&self) {
        self.stream_pending.store(false, Ordering::SeqCst);
        self.stream_done.notify_one();
    }

    /// Decode-loop side of [`close_stream`].
    ///
    /// [`close_stream`]: TcpPeer::close_stream
    pub(crate) async fn stream_closed(&self) {
        self.stream_done.notified().await;
    }
}

impl std::fmt::Debug for TcpPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPeer")
            .field("addr", &self.addr)
            .field("direction", &self.direction)
            .field("stream_pending", &self.has_pending_stream())
            .finish()
    }
}
