//! P2P networking module - Ghost protocol transport, SRP-6a auth,
//! connection-handler fleet

mod auth;
mod handler;
mod protocol;
mod seeds;

pub use auth::*;
pub use handler::*;
pub use protocol::*;
pub use seeds::*;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::constants;
use crate::storage::PeerStore;

/// Delay before a dead handler is respawned
const RESTART_DELAY: Duration = Duration::from_millis(200);

/// Networking errors surfaced at startup
#[derive(Debug, Error)]
pub enum NetError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fleet configuration, read once at startup
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Ghost protocol listen port (0 picks an ephemeral port)
    pub port: u16,
    /// Handlers that dial known peers before falling back to listening
    pub max_bidirectional: usize,
    /// Total handler pool size
    pub max_inbound: usize,
    /// Fallback peers when the known-peer list is empty, "host:port"
    pub seed_peers: Vec<String>,
    /// Idle delay before a freshly spawned handler acts
    pub startup_delay: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            port: constants::GHOST_PORT,
            max_bidirectional: constants::MAX_BIDIRECTIONAL,
            max_inbound: constants::MAX_INBOUND,
            seed_peers: default_seeds(),
            startup_delay: Duration::from_millis(500),
        }
    }
}

/// Handle to the running fleet
pub struct Network {
    registry: Arc<Registry>,
    local_addr: SocketAddr,
    health_addr: Option<SocketAddr>,
}

impl Network {
    /// Start the fleet: bind the shared listener, spawn the handler pool
    /// and the health responder, and hand back the router receiver
    ///
    /// Handlers `1..=max_bidirectional` run bidirectional, the rest up to
    /// `max_inbound` are inbound-only. Each handler is supervised
    /// one-for-one: death means respawn after a short delay.
    pub async fn start(
        config: NetConfig,
        peer_store: PeerStore,
    ) -> Result<(Self, mpsc::Receiver<InboundEvent>), NetError> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let local_addr = listener.local_addr()?;
        let listener = Arc::new(listener);
        let registry = Arc::new(Registry::default());
        let (router_tx, router_rx) = mpsc::channel::<InboundEvent>(256);

        let health_port = local_addr
            .port()
            .wrapping_add(constants::HEALTH_PORT_OFFSET);
        let health_addr = match TcpListener::bind(("0.0.0.0", health_port)).await {
            Ok(health) => {
                let addr = health.local_addr().ok();
                tokio::spawn(health_listener(health));
                addr
            }
            Err(e) => {
                warn!("health listener bind failed on port {}: {}", health_port, e);
                None
            }
        };

        let pool = config.max_inbound.max(config.max_bidirectional);
        for id in 1..=pool {
            let role = if id <= config.max_bidirectional {
                HandlerRole::Bidirectional
            } else {
                HandlerRole::InboundOnly
            };
            let ctx = HandlerContext {
                id,
                role,
                listener: Arc::clone(&listener),
                registry: Arc::clone(&registry),
                peer_store: peer_store.clone(),
                router: router_tx.clone(),
                seed_peers: config.seed_peers.clone(),
                startup_delay: config.startup_delay,
            };
            tokio::spawn(async move {
                loop {
                    run_handler(ctx.clone()).await;
                    tokio::time::sleep(RESTART_DELAY).await;
                }
            });
        }

        info!(
            "ghost fleet listening on {} ({} handlers, {} bidirectional)",
            local_addr, pool, config.max_bidirectional
        );

        Ok((
            Self {
                registry,
                local_addr,
                health_addr,
            },
            router_rx,
        ))
    }

    /// Every handler currently holding an authenticated session
    pub fn connected_handlers(&self) -> Vec<ConnectedPeer> {
        self.registry.snapshot()
    }

    /// Fan a message out to every connected handler, fire-and-forget
    ///
    /// No delivery guarantee: a handler with a full outbound queue just
    /// misses this round.
    pub fn gossip(&self, message: GhostMessage) {
        for (_, sender) in self.registry.senders() {
            let _ = sender.try_send(message.clone());
        }
    }

    /// Send to one specific handler
    pub async fn send_to(&self, handler: HandlerId, message: GhostMessage) -> bool {
        let sender = self
            .registry
            .senders()
            .into_iter()
            .find(|(id, _)| *id == handler)
            .map(|(_, s)| s);
        match sender {
            Some(s) => s.send(message).await.is_ok(),
            None => false,
        }
    }

    /// The bound Ghost listener address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bound health listener address, if the port was free
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health_addr
    }
}

/// Health responder: one-byte probe, one-byte answer
///
/// Exactly one connection is serviced at a time; concurrent probes wait
/// in the kernel backlog or are refused when it overflows. This is a
/// liveness signal, not part of the Ghost protocol.
pub async fn health_listener(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((mut socket, _)) => {
                let mut probe = [0u8; 1];
                if socket.read_exact(&mut probe).await.is_ok() && probe[0] == 0x00 {
                    let _ = socket.write_all(&[0x01]).await;
                }
                // Dropping the socket closes it; back to accepting
            }
            Err(e) => {
                warn!("health accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
