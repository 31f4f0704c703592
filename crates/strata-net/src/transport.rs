//! TCP transport bound to the simulation's message channel.
//!
//! Every accepted connection gets a reader task and a writer task. Readers
//! decode frames and forward [`InboundEvent`]s over a bounded mpsc channel.
//! Outbound traffic goes through a [`NetSink`] into a dispatcher task, which
//! encodes each message once and hands the text to the per-peer writers over
//! unbounded queues, so a slow peer only delays itself.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use strata_config::ServerConfig;
use strata_protocol::{InboundEvent, Message, MessageSink, PeerId};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, RwLock, mpsc, watch};
use tracing::{debug, info, warn};

use crate::framing::{FrameConfig, FrameError, decode_payload, read_frame, write_frame};

/// Capacity of the inbound event channel. Readers wait when it is full.
pub const INBOUND_CAPACITY: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("transport is already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hands out monotonically increasing [`PeerId`]s, starting at 1.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> PeerId {
        PeerId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub frame: FrameConfig,
}

impl TransportConfig {
    pub fn from_config(config: &ServerConfig) -> Result<Self, TransportError> {
        let ip: IpAddr = config
            .bind_address
            .parse()
            .map_err(|_| TransportError::InvalidAddress(config.bind_address.clone()))?;
        Ok(Self {
            bind_addr: SocketAddr::new(ip, config.port),
            max_connections: config.max_connections as usize,
            frame: FrameConfig::from_config(config),
        })
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            max_connections: 64,
            frame: FrameConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Peer table
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum PeerCommand {
    Frame(Arc<str>),
    /// Flush what is queued, then close.
    Close,
}

struct PeerHandle {
    commands: mpsc::UnboundedSender<PeerCommand>,
    close: Arc<Notify>,
}

/// Returned when the peer table is at capacity.
#[derive(Debug)]
pub struct ConnectionLimitReached;

/// Live connections keyed by [`PeerId`].
pub struct PeerMap {
    inner: RwLock<HashMap<PeerId, PeerHandle>>,
    max_connections: usize,
}

impl PeerMap {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    async fn insert(&self, id: PeerId, handle: PeerHandle) -> Result<(), ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        map.insert(id, handle);
        Ok(())
    }

    async fn remove(&self, id: PeerId) -> bool {
        self.inner.write().await.remove(&id).is_some()
    }

    pub async fn contains(&self, id: PeerId) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    async fn send(&self, peers: &[PeerId], frame: &Arc<str>) {
        let map = self.inner.read().await;
        for peer in peers {
            let delivered = map
                .get(peer)
                .is_some_and(|h| h.commands.send(PeerCommand::Frame(Arc::clone(frame))).is_ok());
            if !delivered {
                debug!(%peer, "Dropping message for a closed connection");
            }
        }
    }

    async fn close(&self, peer: PeerId) {
        if let Some(handle) = self.inner.read().await.get(&peer) {
            let _ = handle.commands.send(PeerCommand::Close);
            handle.close.notify_one();
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound sink
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Outbound {
    To(PeerId, Message),
    Broadcast(Vec<PeerId>, Message),
    Close(PeerId),
}

/// [`MessageSink`] feeding the transport's dispatcher. Never blocks.
#[derive(Debug, Clone)]
pub struct NetSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl NetSink {
    fn push(&self, outbound: Outbound) {
        if self.tx.send(outbound).is_err() {
            debug!("Transport stopped, dropping outbound traffic");
        }
    }
}

impl MessageSink for NetSink {
    fn send(&mut self, peer: PeerId, message: Message) {
        self.push(Outbound::To(peer, message));
    }

    fn broadcast(&mut self, peers: &[PeerId], message: Message) {
        if !peers.is_empty() {
            self.push(Outbound::Broadcast(peers.to_vec(), message));
        }
    }

    fn disconnect(&mut self, peer: PeerId) {
        self.push(Outbound::Close(peer));
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Accepts TCP connections and bridges them to the simulation.
pub struct TcpTransport {
    config: TransportConfig,
    peers: Arc<PeerMap>,
    ids: IdGenerator,
    inbound: mpsc::Sender<InboundEvent>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TcpTransport {
    /// Create the transport and the receiving end of its inbound events.
    pub fn new(config: TransportConfig) -> (Self, mpsc::Receiver<InboundEvent>) {
        let (inbound, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let transport = Self {
            peers: Arc::new(PeerMap::new(config.max_connections)),
            ids: IdGenerator::new(),
            config,
            inbound,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown_tx,
            shutdown_rx,
        };
        (transport, inbound_rx)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Sink for the simulation's outbound messages.
    pub fn sink(&self) -> NetSink {
        NetSink {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn peers(&self) -> &PeerMap {
        &self.peers
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), TransportError> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        info!(%addr, "Transport listening");
        self.run_with_listener(listener).await
    }

    /// Serve on a pre-bound listener until shutdown.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), TransportError> {
        let outbound = self
            .outbound_rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(TransportError::AlreadyRunning)?;
        let dispatcher = tokio::spawn(dispatch(
            outbound,
            Arc::clone(&self.peers),
            self.shutdown_rx.clone(),
        ));

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, addr)) => self.accept(stream, addr).await,
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Transport shutting down");
                    break;
                }
            }
        }

        let _ = dispatcher.await;
        Ok(())
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, error = %e, "Failed to set TCP_NODELAY");
        }

        let id = self.ids.next_id();
        let (reader, writer) = stream.into_split();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let close = Arc::new(Notify::new());
        let handle = PeerHandle {
            commands,
            close: Arc::clone(&close),
        };
        if self.peers.insert(id, handle).await.is_err() {
            warn!(%addr, "Connection limit reached, rejecting");
            return;
        }
        info!(peer = %id, %addr, "Accepted connection");

        // Connected is queued before the reader starts so it precedes every
        // message from this peer.
        if self.inbound.send(InboundEvent::Connected(id)).await.is_err() {
            warn!(peer = %id, "Simulation is gone, dropping connection");
            self.peers.remove(id).await;
            return;
        }

        tokio::spawn(write_loop(
            id,
            writer,
            command_rx,
            self.config.frame.clone(),
            self.shutdown_rx.clone(),
        ));

        let peers = Arc::clone(&self.peers);
        let inbound = self.inbound.clone();
        let frame = self.config.frame.clone();
        let shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            read_loop(id, reader, &inbound, &frame, &close, shutdown).await;
            peers.remove(id).await;
            let _ = inbound.send(InboundEvent::Disconnected(id)).await;
            info!(peer = %id, "Connection closed");
        });
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn read_loop(
    id: PeerId,
    mut reader: OwnedReadHalf,
    inbound: &mpsc::Sender<InboundEvent>,
    frame: &FrameConfig,
    close: &Notify,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let result = tokio::select! {
            result = read_frame(&mut reader, frame) => result,
            _ = close.notified() => return,
            _ = wait_for_shutdown(&mut shutdown) => return,
        };

        let event = match result {
            Ok(payload) if payload.is_empty() => continue,
            Ok(payload) => match decode_payload(&payload) {
                Ok(message) => InboundEvent::Message(id, message),
                Err(reason) => {
                    debug!(peer = %id, %reason, "Malformed frame");
                    InboundEvent::Malformed(id, reason)
                }
            },
            Err(FrameError::ConnectionClosed) => return,
            Err(e @ FrameError::PayloadTooLarge { .. }) => {
                // The stream cannot be resynchronised after an oversized prefix.
                warn!(peer = %id, error = %e, "Dropping connection");
                let _ = inbound.send(InboundEvent::Malformed(id, e.to_string())).await;
                return;
            }
            Err(FrameError::Io(e)) => {
                debug!(peer = %id, error = %e, "Read failed");
                return;
            }
        };

        if inbound.send(event).await.is_err() {
            return;
        }
    }
}

async fn write_loop(
    id: PeerId,
    mut writer: OwnedWriteHalf,
    mut commands: mpsc::UnboundedReceiver<PeerCommand>,
    frame: FrameConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let command = tokio::select! {
            command = commands.recv() => command,
            _ = wait_for_shutdown(&mut shutdown) => None,
        };
        match command {
            Some(PeerCommand::Frame(text)) => {
                if let Err(e) = write_frame(&mut writer, text.as_bytes(), &frame).await {
                    debug!(peer = %id, error = %e, "Write failed");
                    break;
                }
            }
            Some(PeerCommand::Close) | None => break,
        }
    }
    let _ = writer.shutdown().await;
}

async fn dispatch(
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    peers: Arc<PeerMap>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            next = outbound.recv() => next,
            _ = wait_for_shutdown(&mut shutdown) => None,
        };
        let Some(next) = next else {
            break;
        };
        match next {
            Outbound::To(peer, message) => {
                if let Some(text) = encode_text(&message) {
                    peers.send(&[peer], &text).await;
                }
            }
            Outbound::Broadcast(targets, message) => {
                if let Some(text) = encode_text(&message) {
                    peers.send(&targets, &text).await;
                }
            }
            Outbound::Close(peer) => peers.close(peer).await,
        }
    }
}

fn encode_text(message: &Message) -> Option<Arc<str>> {
    match strata_protocol::encode(message) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(kind = ?message.message_type(), error = %e, "Failed to encode outbound message");
            None
        }
    }
}
