//! Connection handler
//!
//! One tokio task per handler, each owning exactly one socket for its
//! lifetime:
//!
//! ```text
//! IDLE -> DIAL (bidirectional, peer known) -> AUTHENTICATING -> READY -> DEAD
//!     \-> LISTEN (otherwise, or after a failed dial) -^
//! ```
//!
//! A handler that dies for any reason is respawned by the supervisor;
//! state never outlives the connection. Registration in the shared
//! registry doubles as the connection-dedup record: one session per
//! peer IP.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::auth::{authenticate_inbound, authenticate_outbound};
use super::protocol::{read_payload, write_payload, GhostMessage};
use crate::storage::PeerStore;

/// Handler slot number, 1-based
pub type HandlerId = usize;

/// Outbound dial timeout
const DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Liveness ping cadence
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Handler connection role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerRole {
    /// Dials a known peer first, listens as fallback
    Bidirectional,
    /// Only accepts
    InboundOnly,
}

/// Handler lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Dialing,
    Listening,
    Authenticating,
    Ready,
    Dead,
}

/// A message received from a peer, tagged with its handler
#[derive(Debug)]
pub struct InboundEvent {
    pub message: GhostMessage,
    pub handler: HandlerId,
}

/// Registry entry for a connected handler
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    /// Textual peer IP, the dedup key
    pub peername: String,
    pub role: HandlerRole,
    /// Last measured round-trip, milliseconds
    pub ping_ms: Option<u64>,
    /// Outbound send channel into the handler
    pub sender: mpsc::Sender<GhostMessage>,
}

/// Snapshot of a connected handler for callers outside the p2p layer
#[derive(Debug, Clone)]
pub struct ConnectedPeer {
    pub handler: HandlerId,
    pub peername: String,
    pub role: HandlerRole,
    pub ping_ms: Option<u64>,
}

/// Shared registry of READY handlers
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<HashMap<HandlerId, HandlerEntry>>,
}

impl Registry {
    /// Is some handler already connected to this peername?
    pub fn has_peername(&self, peername: &str) -> bool {
        self.inner.read().values().any(|e| e.peername == peername)
    }

    pub fn register(&self, id: HandlerId, entry: HandlerEntry) {
        self.inner.write().insert(id, entry);
    }

    pub fn deregister(&self, id: HandlerId) {
        self.inner.write().remove(&id);
    }

    pub fn set_ping(&self, id: HandlerId, ping_ms: u64) {
        if let Some(entry) = self.inner.write().get_mut(&id) {
            entry.ping_ms = Some(ping_ms);
        }
    }

    /// All connected handlers
    pub fn snapshot(&self) -> Vec<ConnectedPeer> {
        self.inner
            .read()
            .iter()
            .map(|(id, e)| ConnectedPeer {
                handler: *id,
                peername: e.peername.clone(),
                role: e.role,
                ping_ms: e.ping_ms,
            })
            .collect()
    }

    /// Send channels of all connected handlers
    pub fn senders(&self) -> Vec<(HandlerId, mpsc::Sender<GhostMessage>)> {
        self.inner
            .read()
            .iter()
            .map(|(id, e)| (*id, e.sender.clone()))
            .collect()
    }
}

/// Everything a handler run needs, cloned per respawn
#[derive(Clone)]
pub(crate) struct HandlerContext {
    pub id: HandlerId,
    pub role: HandlerRole,
    pub listener: Arc<TcpListener>,
    pub registry: Arc<Registry>,
    pub peer_store: PeerStore,
    pub router: mpsc::Sender<InboundEvent>,
    pub seed_peers: Vec<String>,
    pub startup_delay: Duration,
}

impl HandlerContext {
    /// Known peers, falling back to the configured seeds
    fn peer_list(&self) -> Vec<String> {
        let known = self.peer_store.known_peers().unwrap_or_default();
        if known.is_empty() {
            self.seed_peers.clone()
        } else {
            known
        }
    }
}

/// Record and log a state transition
fn transition(id: HandlerId, state: &mut HandlerState, next: HandlerState) {
    *state = next;
    debug!(handler = id, state = ?next, "handler state");
}

/// One connection lifetime: IDLE through DEAD
///
/// Returning is dying; the supervisor loop respawns.
pub(crate) async fn run_handler(ctx: HandlerContext) {
    let mut state = HandlerState::Idle;
    tokio::time::sleep(ctx.startup_delay).await;

    // Bidirectional handler i dials peers[i-1] when the list is long enough
    let dial_target = if ctx.role == HandlerRole::Bidirectional {
        ctx.peer_list().get(ctx.id - 1).cloned()
    } else {
        None
    };

    let (stream, peername, session_key) = if let Some(target) = dial_target {
        transition(ctx.id, &mut state, HandlerState::Dialing);
        match timeout(DIAL_TIMEOUT, TcpStream::connect(target.as_str())).await {
            Ok(Ok(mut stream)) => {
                transition(ctx.id, &mut state, HandlerState::Authenticating);
                let peername = stream
                    .peer_addr()
                    .map(|a| a.ip().to_string())
                    .unwrap_or_else(|_| target.clone());
                match authenticate_outbound(&mut stream, &ctx.peer_store, &peername).await {
                    Ok(key) => (stream, peername, key),
                    Err(e) => {
                        info!(handler = ctx.id, peer = %peername, "outbound handshake failed: {}", e);
                        transition(ctx.id, &mut state, HandlerState::Dead);
                        return;
                    }
                }
            }
            _ => {
                debug!(handler = ctx.id, peer = %target, "dial failed, falling back to listen");
                match accept_and_authenticate(&ctx, &mut state).await {
                    Some(ok) => ok,
                    None => return,
                }
            }
        }
    } else {
        match accept_and_authenticate(&ctx, &mut state).await {
            Some(ok) => ok,
            None => return,
        }
    };

    // Register, becoming visible to gossip and to the dedup check
    let (tx, rx) = mpsc::channel::<GhostMessage>(64);
    ctx.registry.register(
        ctx.id,
        HandlerEntry {
            peername: peername.clone(),
            role: ctx.role,
            ping_ms: None,
            sender: tx.clone(),
        },
    );
    transition(ctx.id, &mut state, HandlerState::Ready);
    debug!(handler = ctx.id, peer = %peername, "session established");

    run_ready(&ctx, stream, session_key, tx, rx, &peername).await;

    ctx.registry.deregister(ctx.id);
    transition(ctx.id, &mut state, HandlerState::Dead);
    info!(handler = ctx.id, peer = %peername, "connection closed");
}

/// LISTEN then AUTHENTICATING for an inbound socket
///
/// `None` means the handler should die (and be respawned).
async fn accept_and_authenticate(
    ctx: &HandlerContext,
    state: &mut HandlerState,
) -> Option<(TcpStream, String, [u8; 32])> {
    transition(ctx.id, state, HandlerState::Listening);
    let (mut stream, addr) = match ctx.listener.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(handler = ctx.id, "accept failed: {}", e);
            return None;
        }
    };
    let peername = addr.ip().to_string();

    transition(ctx.id, state, HandlerState::Authenticating);
    let session_key = match authenticate_inbound(&mut stream, &ctx.peer_store).await {
        Ok(key) => key,
        Err(e) => {
            info!(handler = ctx.id, peer = %peername, "inbound handshake failed: {}", e);
            return None;
        }
    };

    // One session per peer IP: a second inbound connection from the same
    // address dies here, before it ever registers
    if ctx.registry.has_peername(&peername) {
        info!(handler = ctx.id, peer = %peername, "duplicate connection, closing");
        return None;
    }

    Some((stream, peername, session_key))
}

/// READY: pump frames until the socket dies
///
/// The writer task owns the write half and the ping clock; the reader
/// loop pulls one frame at a time, so the peer is never read faster
/// than frames are dispatched.
async fn run_ready(
    ctx: &HandlerContext,
    stream: TcpStream,
    session_key: [u8; 32],
    tx: mpsc::Sender<GhostMessage>,
    rx: mpsc::Receiver<GhostMessage>,
    peername: &str,
) {
    let (mut read_half, write_half) = stream.into_split();
    let last_ping_sent = Arc::new(Mutex::new(None::<Instant>));

    let writer = tokio::spawn(write_loop(
        write_half,
        rx,
        session_key,
        Arc::clone(&last_ping_sent),
        ctx.id,
    ));

    loop {
        let payload = match read_payload(&mut read_half).await {
            Ok(p) => p,
            Err(_) => break,
        };
        let message = match GhostMessage::open(&payload, &session_key) {
            Ok(m) => m,
            Err(e) => {
                warn!(handler = ctx.id, peer = %peername, "undecodable frame, closing: {}", e);
                break;
            }
        };
        match message.msg_type.as_str() {
            "PING" => {
                if tx.send(GhostMessage::new("PANG")).await.is_err() {
                    break;
                }
            }
            "PANG" => {
                if let Some(sent) = *last_ping_sent.lock() {
                    ctx.registry
                        .set_ping(ctx.id, sent.elapsed().as_millis() as u64);
                }
            }
            _ => {
                let event = InboundEvent {
                    message,
                    handler: ctx.id,
                };
                if ctx.router.send(event).await.is_err() {
                    break;
                }
            }
        }
    }

    writer.abort();
}

/// Owns the write half: outbound sends plus the periodic liveness ping
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<GhostMessage>,
    session_key: [u8; 32],
    last_ping_sent: Arc<Mutex<Option<Instant>>>,
    id: HandlerId,
) {
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    loop {
        let message = tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(m) => m,
                None => return,
            },
            _ = ping_timer.tick() => {
                *last_ping_sent.lock() = Some(Instant::now());
                GhostMessage::new("PING")
            }
        };
        let payload = match message.seal(&session_key) {
            Ok(p) => p,
            Err(e) => {
                // A bad outbound message must never kill the session
                warn!(handler = id, "failed to encode outbound {}: {}", message.msg_type, e);
                continue;
            }
        };
        if write_payload(&mut write_half, &payload).await.is_err() {
            return;
        }
    }
}
