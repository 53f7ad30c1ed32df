//! GHOST Blockchain Core Library
//!
//! A UTXO cryptocurrency core: deterministic consensus validation and the
//! Ghost peer protocol (framed messages over SRP-6a authenticated,
//! AES-256 encrypted sessions).

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod node;
pub mod p2p;
pub mod storage;
pub mod validation;

/// Protocol constants - defaults for every configurable knob
pub mod constants {
    /// Default TCP port for the Ghost protocol
    pub const GHOST_PORT: u16 = 31013;

    /// The health-check listener sits one port above the Ghost port
    pub const HEALTH_PORT_OFFSET: u16 = 1;

    /// Handlers that dial a known peer before falling back to listening
    pub const MAX_BIDIRECTIONAL: usize = 10;

    /// Total connection-handler pool size
    pub const MAX_INBOUND: usize = 90;

    /// Encoded-block byte cap (8 MiB)
    pub const BLOCK_SIZE_LIMIT: usize = 8 * 1024 * 1024;

    /// Max seconds a block timestamp may run ahead of the local clock
    pub const FUTURE_TIME_LIMIT: u64 = 3600;

    /// Target seconds per block
    pub const TARGET_SOLVETIME: u64 = 120;

    /// Blocks per difficulty retargeting window
    pub const RETARGETING_WINDOW: u64 = 60;

    /// Percent deadband around the target solvetime before difficulty moves
    pub const DIFF_REBALANCE_OFFSET: u64 = 25;

    /// First block index that pays no reward
    pub const BLOCK_AT_FULL_EMISSION: u64 = 10_000_000;

    /// Terminal supply in base units (1B GST, 8 decimal places)
    pub const TOTAL_TOKEN_SUPPLY: u128 = 1_000_000_000 * 100_000_000;

    /// Address version prefix byte ('G')
    pub const ADDRESS_VERSION: u8 = 0x47;

    /// Handshake version tag
    pub const GHOST_PROTOCOL_VERSION: u64 = 1;

    /// Chain name (used in logs and the genesis coinbase)
    pub const CHAIN_NAME: &str = "GHOST";

    /// Genesis timestamp (Unix seconds)
    pub const GENESIS_TIMESTAMP: u64 = 1738368000; // 2025-02-01

    /// Genesis coinbase recipient
    pub const GENESIS_ADDRESS: &str = "Gd7WPS7zWkEzs4EtnnNLrsoxgCW2MzSxEV";

    /// Seed nodes for network bootstrap, "host:port"
    pub const SEED_PEERS: &[&str] = &[
        "seed.ghost.network:31013",
        "seed2.ghost.network:31013",
    ];
}
