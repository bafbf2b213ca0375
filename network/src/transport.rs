//! TCP transport — accept/dial loops and the per-connection decode task.
//!
//! Every connection, inbound or outbound, runs the same task: handshake,
//! peer notification, then a decode loop that feeds the transport's single
//! shared record channel. That channel is the only hand-off point to the
//! replication engine; all connections multiplex onto it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use crate::codec::{read_frame, DecodeError, Frame};
use crate::error::NetworkError;
use crate::peer::{Direction, TcpPeer};

/// Capacity of the shared record channel. Kept minimal so connection
/// decode loops stay in lock-step with the single consumer.
const RECORD_CHANNEL_CAPACITY: usize = 1;

/// The unit delivered from the transport to the replication engine: one
/// decoded frame, stamped with the origin peer's address.
#[derive(Debug)]
pub struct ProtocolRecord {
    pub from: SocketAddr,
    /// A `STREAM` frame was read; `payload` is empty and the origin
    /// connection's decode loop is paused until its stream is drained.
    pub stream: bool,
    pub payload: Vec<u8>,
}

/// Connection handshake hook, run before the peer is announced.
///
/// The default accepts everything; a future authentication step slots in
/// here.
pub type HandshakeFn = fn(&TcpPeer) -> Result<(), NetworkError>;

/// The default handshake: a no-op that always succeeds.
pub fn no_op_handshake(_peer: &TcpPeer) -> Result<(), NetworkError> {
    Ok(())
}

/// Invoked once per connection after a successful handshake. An error
/// drops the connection before its decode loop starts.
pub type OnPeer = Arc<dyn Fn(Arc<TcpPeer>) -> Result<(), NetworkError> + Send + Sync>;

/// Invoked with the peer's address when its decode loop exits.
pub type OnDisconnect = Arc<dyn Fn(SocketAddr) + Send + Sync>;

pub struct TransportOpts {
    pub listen_addr: String,
    pub handshake: HandshakeFn,
    pub on_peer: Option<OnPeer>,
    pub on_disconnect: Option<OnDisconnect>,
}

impl TransportOpts {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            handshake: no_op_handshake,
            on_peer: None,
            on_disconnect: None,
        }
    }
}

/// Everything a connection task needs, cheap to clone per connection.
#[derive(Clone)]
struct ConnContext {
    handshake: HandshakeFn,
    on_peer: Option<OnPeer>,
    on_disconnect: Option<OnDisconnect>,
    record_tx: mpsc::Sender<ProtocolRecord>,
}

pub struct TcpTransport {
    listen_addr: String,
    ctx: ConnContext,
    record_rx: StdMutex<Option<mpsc::Receiver<ProtocolRecord>>>,
    close_tx: broadcast::Sender<()>,
}

impl TcpTransport {
    pub fn new(opts: TransportOpts) -> Self {
        let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (close_tx, _) = broadcast::channel(1);
        Self {
            listen_addr: opts.listen_addr,
            ctx: ConnContext {
                handshake: opts.handshake,
                on_peer: opts.on_peer,
                on_disconnect: opts.on_disconnect,
                record_tx,
            },
            record_rx: StdMutex::new(Some(record_rx)),
            close_tx,
        }
    }

    /// Bind the listener and start the accept loop.
    ///
    /// A bind failure is returned to the caller (fatal for the node);
    /// per-connection accept errors are logged and the loop continues.
    /// Returns the bound local address, so `:0` binds are usable.
    pub async fn listen_and_accept(&self) -> Result<SocketAddr, NetworkError> {
        let listener =
            TcpListener::bind(self.listen_addr.as_str())
                .await
                .map_err(|source| NetworkError::Bind {
                    addr: self.listen_addr.clone(),
                    source,
                })?;
        let local_addr = listener.local_addr()?;

        let ctx = self.ctx.clone();
        let mut close_rx = self.close_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = close_rx.recv() => {
                        tracing::debug!("listener closed, accept loop stopped");
                        return;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            let ctx = ctx.clone();
                            tokio::spawn(handle_connection(ctx, stream, Direction::Accepted));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "TCP accept error");
                        }
                    }
                }
            }
        });

        tracing::info!(addr = %local_addr, "TCP transport listening");
        Ok(local_addr)
    }

    /// Open an outbound connection. A dial failure is returned to the
    /// caller and is recoverable — bootstrap just logs and moves on.
    pub async fn dial(&self, addr: &str) -> Result<(), NetworkError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| NetworkError::Dial {
                addr: addr.to_string(),
                source,
            })?;

        tracing::debug!(addr, "dialed peer");
        tokio::spawn(handle_connection(self.ctx.clone(), stream, Direction::Dialed));
        Ok(())
    }

    /// Take the shared record channel. Yields `Some` exactly once.
    pub fn consume(&self) -> Option<mpsc::Receiver<ProtocolRecord>> {
        self.record_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Stop the accept loop. Established connections are unaffected and
    /// close on their own read errors.
    pub fn close(&self) {
        let _ = self.close_tx.send(());
    }
}

/// Per-connection task: handshake → on_peer → decode loop → on_disconnect.
async fn handle_connection(ctx: ConnContext, stream: TcpStream, direction: Direction) {
    let peer = match TcpPeer::new(stream, direction) {
        Ok(peer) => Arc::new(peer),
        Err(e) => {
            tracing::warn!(error = %e, "failed to split connection");
            return;
        }
    };
    let addr = peer.addr();

    if let Err(e) = (ctx.handshake)(&peer) {
        tracing::warn!(peer = %addr, error = %e, "handshake failed, dropping connection");
        return;
    }

    if let Some(on_peer) = &ctx.on_peer {
        if let Err(e) = on_peer(Arc::clone(&peer)) {
            tracing::warn!(peer = %addr, error = %e, "peer rejected, dropping connection");
            return;
        }
    }

    decode_loop(&ctx, &peer).await;
    tracing::info!(peer = %addr, "peer disconnected");

    if let Some(on_disconnect) = &ctx.on_disconnect {
        on_disconnect(addr);
    }
}

/// Read frames until the connection dies, forwarding each as a record.
///
/// After a `STREAM` frame the loop parks until the stream consumer calls
/// `close_stream()` on the peer — reading another frame before the raw
/// bytes are drained would corrupt the stream.
async fn decode_loop(ctx: &ConnContext, peer: &Arc<TcpPeer>) {
    let addr = peer.addr();
    loop {
        let frame = {
            let mut reader = peer.lock_reader().await;
            read_frame(&mut *reader).await
        };

        match frame {
            Ok(Frame::Stream) => {
                peer.begin_stream();
                let record = ProtocolRecord {
                    from: addr,
                    stream: true,
                    payload: Vec::new(),
                };
                if ctx.record_tx.send(record).await.is_err() {
                    return;
                }
                tracing::debug!(peer = %addr, "incoming stream, decode loop paused");
                peer.stream_closed().await;
                tracing::debug!(peer = %addr, "stream drained, decode loop resumed");
            }
            Ok(Frame::Message(payload)) => {
                let record = ProtocolRecord {
                    from: addr,
                    stream: false,
                    payload,
                };
                if ctx.record_tx.send(record).await.is_err() {
                    // the engine is gone; nothing left to deliver to
                    return;
                }
            }
            Err(DecodeError::Closed) => return,
            Err(DecodeError::UnknownTag(tag)) => {
                tracing::warn!(peer = %addr, tag, "skipping unknown frame tag");
            }
            Err(DecodeError::Io(e)) => {
                tracing::warn!(peer = %addr, error = %e, "frame decode error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    use brook_messages::ControlMessage;
    use brook_protocol::{TAG_MESSAGE, TAG_STREAM};

    /// Transport that records every announced peer.
    fn transport_with_peer_capture() -> (TcpTransport, Arc<Mutex<Vec<Arc<TcpPeer>>>>) {
        let peers: Arc<Mutex<Vec<Arc<TcpPeer>>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&peers);
        let mut opts = TransportOpts::new("127.0.0.1:0");
        opts.on_peer = Some(Arc::new(move |peer| {
            captured.lock().unwrap().push(peer);
            Ok(())
        }));
        (TcpTransport::new(opts), peers)
    }

    fn message_frame(msg: &ControlMessage) -> Vec<u8> {
        let mut frame = vec![TAG_MESSAGE];
        frame.extend(brook_protocol::encode(msg).unwrap());
        frame
    }

    #[tokio::test]
    async fn listen_and_accept_binds_ephemeral_port() {
        let transport = TcpTransport::new(TransportOpts::new("127.0.0.1:0"));
        let addr = transport.listen_and_accept().await.unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal_error() {
        let transport = TcpTransport::new(TransportOpts::new("256.256.256.256:1"));
        assert!(matches!(
            transport.listen_and_accept().await,
            Err(NetworkError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn dial_failure_is_recoverable_error() {
        let transport = TcpTransport::new(TransportOpts::new("127.0.0.1:0"));
        assert!(matches!(
            transport.dial("127.0.0.1:1").await,
            Err(NetworkError::Dial { .. })
        ));
    }

    #[tokio::test]
    async fn consume_yields_the_channel_once() {
        let transport = TcpTransport::new(TransportOpts::new("127.0.0.1:0"));
        assert!(transport.consume().is_some());
        assert!(transport.consume().is_none());
    }

    #[tokio::test]
    async fn message_frame_reaches_the_record_channel() {
        let (transport, _peers) = transport_with_peer_capture();
        let mut records = transport.consume().unwrap();
        let addr = transport.listen_and_accept().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let msg = ControlMessage::GetFile {
            key: "Squad 1".to_string(),
        };
        client.write_all(&message_frame(&msg)).await.unwrap();

        let record = timeout(Duration::from_secs(1), records.recv())
            .await
            .expect("record in time")
            .expect("channel open");
        assert!(!record.stream);
        assert_eq!(record.from, client.local_addr().unwrap());
        assert_eq!(brook_protocol::decode(&record.payload).unwrap(), msg);
    }

    #[tokio::test]
    async fn stream_frame_suspends_decode_loop_until_closed() {
        let (transport, peers) = transport_with_peer_capture();
        let mut records = transport.consume().unwrap();
        let addr = transport.listen_and_accept().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();

        // stream announcement, raw bytes, then a frame that must NOT be
        // decoded until the stream is drained
        client.write_all(&[TAG_STREAM]).await.unwrap();
        client.write_all(b"raw stream bytes").await.unwrap();
        let follow_up = ControlMessage::GetFile {
            key: "after".to_string(),
        };
        client.write_all(&message_frame(&follow_up)).await.unwrap();

        let record = timeout(Duration::from_secs(1), records.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(record.stream);

        let peer = peers.lock().unwrap()[0].clone();
        assert!(peer.has_pending_stream());

        // decode loop is parked: the follow-up frame stays undelivered
        assert!(
            timeout(Duration::from_millis(200), records.recv())
                .await
                .is_err(),
            "decode loop must stay suspended while the stream is pending"
        );

        // drain the raw bytes the way a stream consumer would
        peer.wait_stream().await;
        {
            let mut reader = peer.lock_reader().await;
            let mut buf = [0u8; 16];
            reader.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"raw stream bytes");
        }
        peer.close_stream();

        // loop resumed, the follow-up frame arrives intact
        let record = timeout(Duration::from_secs(1), records.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!record.stream);
        assert_eq!(brook_protocol::decode(&record.payload).unwrap(), follow_up);
    }

    #[tokio::test]
    async fn rejected_peer_is_dropped_before_decode() {
        let mut opts = TransportOpts::new("127.0.0.1:0");
        opts.on_peer = Some(Arc::new(|_peer| {
            Err(NetworkError::PeerRejected("not today".to_string()))
        }));
        let transport = TcpTransport::new(opts);
        let mut records = transport.consume().unwrap();
        let addr = transport.listen_and_accept().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let msg = ControlMessage::GetFile {
            key: "ignored".to_string(),
        };
        // the write may or may not error depending on close timing; the
        // frame must not surface either way
        let _ = client.write_all(&message_frame(&msg)).await;

        assert!(
            timeout(Duration::from_millis(200), records.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn disconnect_invokes_callback_with_peer_address() {
        let disconnected: Arc<Mutex<Vec<SocketAddr>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&disconnected);
        let mut opts = TransportOpts::new("127.0.0.1:0");
        opts.on_disconnect = Some(Arc::new(move |addr| {
            captured.lock().unwrap().push(addr);
        }));
        let transport = TcpTransport::new(opts);
        let _records = transport.consume().unwrap();
        let addr = transport.listen_and_accept().await.unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let client_addr = client.local_addr().unwrap();
        drop(client);

        timeout(Duration::from_secs(1), async {
            loop {
                if disconnected.lock().unwrap().contains(&client_addr) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("disconnect callback in time");
    }

    #[tokio::test]
    async fn close_stops_accepting_new_connections() {
        let (transport, peers) = transport_with_peer_capture();
        let _records = transport.consume().unwrap();
        let addr = transport.listen_and_accept().await.unwrap();
        transport.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the connect may land in the OS backlog, but no peer task runs
        let _ = TcpStream::connect(addr).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(peers.lock().unwrap().is_empty());
    }
}
