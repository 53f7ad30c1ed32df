//! GHOST Blockchain Node
//!
//! Main entry point: boots the chain, joins the peer mesh, and routes
//! gossiped consensus objects through the validator.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ghost_core::config::NodeConfig;
use ghost_core::constants;
use ghost_core::node::{block_to_message, message_block_json, Node};
use ghost_core::p2p::{fetch_local_ip, fetch_public_ip, InboundEvent, Network};
use ghost_core::storage::{ChainStore, PeerStore};
use ghost_core::validation::sanitize;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => NodeConfig::load(&path)?,
        None => NodeConfig::default(),
    };
    info!(
        "{} node starting (protocol v{}, port {})",
        constants::CHAIN_NAME,
        config.ghost_protocol_version,
        config.port
    );

    let data_path = PathBuf::from(&config.data_path);
    let peer_store = PeerStore::open(data_path.join("peers"))?;
    let chain_store = ChainStore::open(data_path.join("chain"))?;

    let mut node = Node::bootstrap(config.chain_params(), chain_store)?;
    if let Some(tip) = node.tip()? {
        info!("chain tip at height {} ({})", tip.index, tip.hash);
    }

    match fetch_public_ip().await {
        Some(ip) => info!("public address: {}", ip),
        None => {
            if let Some(ip) = fetch_local_ip() {
                info!("no public address discovered, local address: {}", ip);
            }
        }
    }

    let (network, mut events) = Network::start(config.net_config(), peer_store).await?;
    info!(
        "listening on {} (health: {:?})",
        network.local_addr(),
        network.health_addr()
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                None => break,
                Some(event) => handle_event(&mut node, &network, event),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping node");
                break;
            }
        }
    }

    Ok(())
}

/// Route one message from a connection handler
fn handle_event(node: &mut Node, network: &Network, event: InboundEvent) {
    let InboundEvent { message, handler } = event;
    match message.msg_type.as_str() {
        "BLOCK" => {
            let Some(json) = message_block_json(&message) else {
                warn!(handler, "undecodable BLOCK payload");
                return;
            };
            match node.submit_block(&json, unix_now()) {
                Ok(block) => {
                    info!(handler, "accepted block {} ({})", block.index, block.hash);
                    if let Some(relay) = block_to_message(&block) {
                        network.gossip(relay);
                    }
                }
                Err(e) => info!(handler, "rejected block: {}", e),
            }
        }
        "TRANSACTION" => {
            use base64::engine::general_purpose::STANDARD as BASE64;
            use base64::Engine;
            let parsed = message
                .get_str("DATA")
                .and_then(|raw| BASE64.decode(raw).ok())
                .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
                .map(|value| sanitize(&value));
            match parsed {
                Some(Ok(tx)) => {
                    info!(handler, "transaction {} received", tx.id);
                    network.gossip(message);
                }
                _ => warn!(handler, "undecodable TRANSACTION payload"),
            }
        }
        other => info!(handler, "unhandled message type {}", other),
    }
}
