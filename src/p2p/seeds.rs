//! Bootstrap discovery
//!
//! Seed-node fallback parsing and the two IP lookups used when
//! announcing ourselves to the network.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

use crate::constants;

/// IP-echo endpoint for public address discovery
const IP_ECHO_URL: &str = "https://api.ipify.org";

/// The compiled-in seed-node list
pub fn default_seeds() -> Vec<String> {
    constants::SEED_PEERS.iter().map(|s| s.to_string()).collect()
}

/// Parse a "host:port" seed into a socket address
///
/// Hostname seeds resolve at connect time, not here, so they return
/// `None` from this literal parse.
pub fn parse_seed(seed: &str) -> Option<SocketAddr> {
    seed.parse().ok()
}

/// Our public IP as seen from the outside
///
/// Queries an IP-echo service over HTTPS; `None` when the network or
/// the service is unavailable.
pub async fn fetch_public_ip() -> Option<IpAddr> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .ok()?;
    let text = client
        .get(IP_ECHO_URL)
        .send()
        .await
        .ok()?
        .text()
        .await
        .ok()?;
    text.trim().parse().ok()
}

/// The local interface address the OS routes outbound traffic through
///
/// Opens a UDP socket toward a public address without sending anything;
/// the chosen source address is our local IP.
pub fn fetch_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|a| a.ip())
}
