//! The brook node — wires the transport, peer registry, and content store
//! together and runs the replication state machine.
//!
//! All protocol handling is serialized through one control loop: every
//! connection's decode loop feeds the shared record channel, and the
//! control loop is its only consumer. No two control messages are ever
//! handled concurrently.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use brook_messages::ControlMessage;
use brook_network::{ProtocolRecord, TcpPeer, TcpTransport, TransportOpts};
use brook_protocol::TAG_MESSAGE;
use brook_store::ContentStore;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::registry::PeerRegistry;
use crate::shutdown::ShutdownController;

/// Bound on waiting for an announced store stream to open. The control
/// loop is single-threaded, so a peer that announces a store and never
/// streams must not park it forever.
const STREAM_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running brook node.
pub struct BrookNode {
    pub config: NodeConfig,
    pub shutdown: Arc<ShutdownController>,
    store: Arc<ContentStore>,
    transport: Arc<TcpTransport>,
    registry: Arc<StdMutex<PeerRegistry>>,
}

impl BrookNode {
    /// Create a node from its configuration. Call [`start`] to bind the
    /// listener, dial bootstrap peers, and begin replicating.
    ///
    /// [`start`]: BrookNode::start
    pub fn new(config: NodeConfig) -> Self {
        let registry = Arc::new(StdMutex::new(PeerRegistry::new()));
        let store = Arc::new(ContentStore::new(&config.storage_root));

        let mut opts = TransportOpts::new(config.listen_addr.clone());

        let reg = Arc::clone(&registry);
        opts.on_peer = Some(Arc::new(move |peer: Arc<TcpPeer>| {
            let addr = peer.addr();
            lock_registry(&reg).insert(peer);
            tracing::info!(peer = %addr, "connected with remote peer");
            Ok(())
        }));

        let reg = Arc::clone(&registry);
        opts.on_disconnect = Some(Arc::new(move |addr: SocketAddr| {
            lock_registry(&reg).remove(&addr);
            tracing::debug!(peer = %addr, "peer deregistered");
        }));

        Self {
            config,
            shutdown: Arc::new(ShutdownController::new()),
            store,
            transport: Arc::new(TcpTransport::new(opts)),
            registry,
        }
    }

    /// Bind the listener, dial bootstrap peers, and spawn the control
    /// loop. Returns the bound local address.
    pub async fn start(&self) -> Result<SocketAddr, NodeError> {
        let records = self
            .transport
            .consume()
            .ok_or(NodeError::TransportConsumed)?;
        let addr = self.transport.listen_and_accept().await?;

        self.bootstrap();

        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            control_loop(records, shutdown_rx, registry, store).await;
            transport.close();
            tracing::info!("replication loop stopped");
        });

        Ok(addr)
    }

    /// Dial each bootstrap peer on its own task; failures are logged and
    /// ignored.
    fn bootstrap(&self) {
        for addr in self.config.bootstrap_peers.clone() {
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move {
                tracing::debug!(addr = %addr, "attempting to connect with bootstrap peer");
                if let Err(e) = transport.dial(&addr).await {
                    tracing::warn!(addr = %addr, error = %e, "bootstrap dial failed");
                }
            });
        }
    }

    /// Request a graceful stop: the control loop exits and closes the
    /// transport's listener. Established connections drain on their own.
    pub fn stop(&self) {
        self.shutdown.shutdown();
    }

    /// The node's local content store.
    pub fn content_store(&self) -> &ContentStore {
        &self.store
    }

    /// Number of currently registered peers.
    pub fn peer_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    /// Store `reader`'s content under `key` locally and replicate it to
    /// every registered peer. Returns the number of bytes stored.
    ///
    /// The content is buffered once and used twice: persisted locally,
    /// then replayed to each peer as a raw stream after a `StoreFile`
    /// announcement. A local write failure aborts before anything is
    /// broadcast. Peers are serviced sequentially; the first send failure
    /// aborts the remaining fan-out, and already-serviced peers keep
    /// their copy.
    pub async fn store_file<R>(&self, key: &str, reader: &mut R) -> Result<u64, NodeError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await?;

        let size = self.store.write(key, &mut content.as_slice()).await?;

        let peers = lock_registry(&self.registry).peers();
        if peers.is_empty() {
            return Ok(size);
        }

        let frame = message_frame(&ControlMessage::StoreFile {
            key: key.to_string(),
            size,
        })?;
        for peer in &peers {
            peer.send(&frame).await?;
        }

        for peer in &peers {
            let streamed = peer.send_stream(None, &mut content.as_slice()).await?;
            tracing::debug!(peer = %peer.addr(), bytes = streamed, key, "replicated to peer");
        }

        Ok(size)
    }

    /// Fetch the content for `key`: served locally when present,
    /// otherwise requested from the network.
    ///
    /// The network path broadcasts `GetFile`, waits the configured grace
    /// period, then drains whichever peers answered. Zero, one, or many
    /// peers may answer; the first usable answer is kept and later ones
    /// are discarded after draining (their connections must resume).
    pub async fn get_file(&self, key: &str) -> Result<Vec<u8>, NodeError> {
        if self.store.has(key).await {
            tracing::debug!(key, "serving from local store");
            return Ok(self.store.read(key).await?);
        }

        tracing::info!(key, "not found locally, asking the network");
        let peers = lock_registry(&self.registry).peers();
        if peers.is_empty() {
            return Err(NodeError::NotFoundInNetwork(key.to_string()));
        }

        let frame = message_frame(&ControlMessage::GetFile {
            key: key.to_string(),
        })?;
        for peer in &peers {
            peer.send(&frame).await?;
        }

        tokio::time::sleep(Duration::from_millis(self.config.get_grace_ms)).await;

        let mut found = false;
        for peer in &peers {
            if !peer.has_pending_stream() {
                continue;
            }
            match self.drain_answer(key, peer, !found).await {
                Ok(kept) => found = found || kept,
                Err(e) => {
                    tracing::warn!(peer = %peer.addr(), error = %e, "failed to read answer stream");
                }
            }
        }

        if found {
            Ok(self.store.read(key).await?)
        } else {
            Err(NodeError::NotFoundInNetwork(key.to_string()))
        }
    }

    /// Drain one announced answer stream from `peer`. When `keep` is set
    /// the bytes go into the local store; otherwise they are discarded.
    /// The peer's decode loop is resumed either way.
    async fn drain_answer(
        &self,
        key: &str,
        peer: &Arc<TcpPeer>,
        keep: bool,
    ) -> Result<bool, NodeError> {
        peer.wait_stream().await;
        let outcome = async {
            let mut reader = peer.lock_reader().await;
            let size = reader.read_u64().await?;
            let mut limited = (&mut *reader).take(size);
            if keep {
                self.store.write(key, &mut limited).await?;
                Ok(true)
            } else {
                tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
                Ok(false)
            }
        }
        .await;
        peer.close_stream();
        outcome
    }
}

/// Build a `MESSAGE` frame: tag byte plus the encoded control message.
fn message_frame(msg: &ControlMessage) -> Result<Vec<u8>, NodeError> {
    let mut frame = vec![TAG_MESSAGE];
    frame.extend(brook_protocol::encode(msg)?);
    Ok(frame)
}

fn lock_registry(registry: &StdMutex<PeerRegistry>) -> MutexGuard<'_, PeerRegistry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Control loop ───────────────────────────────────────────────────────

/// Consume the transport's record channel until shutdown.
///
/// Stream records need no action here: they exist to pause the origin
/// connection's decode loop, and their bytes are consumed by whichever
/// handler asked for them.
async fn control_loop(
    mut records: mpsc::Receiver<ProtocolRecord>,
    mut shutdown_rx: broadcast::Receiver<()>,
    registry: Arc<StdMutex<PeerRegistry>>,
    store: Arc<ContentStore>,
) {
    loop {
        tokio::select! {
            maybe_record = records.recv() => {
                let Some(record) = maybe_record else { break };
                if record.stream {
                    continue;
                }
                let msg = match brook_protocol::decode(&record.payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(peer = %record.from, error = %e, "dropping undecodable message");
                        continue;
                    }
                };
                if let Err(e) = handle_message(&registry, &store, record.from, msg).await {
                    tracing::warn!(peer = %record.from, error = %e, "message handling failed");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Dispatch one decoded control message. The match is exhaustive on
/// purpose: a new variant must be handled here to compile.
async fn handle_message(
    registry: &StdMutex<PeerRegistry>,
    store: &ContentStore,
    from: SocketAddr,
    msg: ControlMessage,
) -> Result<(), NodeError> {
    match msg {
        ControlMessage::StoreFile { key, size } => {
            handle_store_file(registry, store, from, key, size).await
        }
        ControlMessage::GetFile { key } => handle_get_file(registry, store, from, key).await,
    }
}

/// A peer announced `size` raw bytes for `key`: read them off its
/// connection into the local store, then resume its decode loop.
async fn handle_store_file(
    registry: &StdMutex<PeerRegistry>,
    store: &ContentStore,
    from: SocketAddr,
    key: String,
    size: u64,
) -> Result<(), NodeError> {
    let peer = lock_registry(registry)
        .get(&from)
        .ok_or(NodeError::UnknownSender(from))?;

    if timeout(STREAM_OPEN_TIMEOUT, peer.wait_stream()).await.is_err() {
        // no stream tag ever arrived, so there is no paused loop to resume
        return Err(NodeError::StreamTimeout(from));
    }

    let result = {
        let mut reader = peer.lock_reader().await;
        let mut limited = (&mut *reader).take(size);
        store.write(&key, &mut limited).await
    };
    // resume the sender's decode loop even when the local write failed; a
    // permanently stalled connection is worse than one failed write
    peer.close_stream();

    let written = result?;
    tracing::info!(peer = %from, key = %key, bytes = written, "stored replicated file");
    Ok(())
}

/// A peer asked for `key`: stream it back if we have it. Not having it is
/// answered with silence — the requester treats no answer as a miss.
async fn handle_get_file(
    registry: &StdMutex<PeerRegistry>,
    store: &ContentStore,
    from: SocketAddr,
    key: String,
) -> Result<(), NodeError> {
    let peer = lock_registry(registry)
        .get(&from)
        .ok_or(NodeError::UnknownSender(from))?;

    if !store.has(&key).await {
        return Err(NodeError::NotInStore(key));
    }

    let (size, mut file) = store.open(&key).await?;
    let streamed = peer.send_stream(Some(size), &mut file).await?;
    tracing::info!(peer = %from, key = %key, bytes = streamed, "served file to peer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_file_from_unknown_sender_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StdMutex::new(PeerRegistry::new());
        let store = ContentStore::new(dir.path().join("store"));
        let from: SocketAddr = "10.0.0.9:3000".parse().unwrap();

        let err = handle_store_file(&registry, &store, from, "SoulSoceity".to_string(), 14)
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::UnknownSender(addr) if addr == from));
        assert!(!store.has("SoulSoceity").await);
    }

    #[tokio::test]
    async fn get_file_for_missing_key_is_silent_failure() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StdMutex::new(PeerRegistry::new());
        let store = ContentStore::new(dir.path().join("store"));
        let from: SocketAddr = "10.0.0.9:3000".parse().unwrap();

        // unknown sender is checked first
        let err = handle_get_file(&registry, &store, from, "nothing".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::UnknownSender(_)));
    }
}
