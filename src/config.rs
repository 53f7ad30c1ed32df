//! Node configuration
//!
//! TOML file read once at startup; every key is optional and falls back
//! to the protocol default. There is no hot reload.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::consensus::ChainParams;
use crate::constants;
use crate::p2p::NetConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// TOML lacks a native u128; round-trip the supply through a string,
/// accepting plain integers for values that fit
mod u128_field {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n as u128),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// The full node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Ghost protocol listen port
    pub port: u16,
    /// Dial-or-listen handler slots
    pub max_bidirectional_connections: usize,
    /// Total handler pool size
    pub max_inbound_connections: usize,
    /// Fallback "host:port" peers
    pub seed_peers: Vec<String>,
    /// Encoded-block byte cap
    pub block_size_limit: usize,
    /// Max seconds a block timestamp may exceed the local clock
    pub future_time_limit: u64,
    /// Target seconds per block
    pub target_solvetime: u64,
    /// Blocks per retargeting window
    pub retargeting_window: u64,
    /// Percent deadband for difficulty rebalancing
    pub diff_rebalance_offset: u64,
    /// First block index that pays no reward
    pub block_at_full_emission: u64,
    /// Terminal supply in base units
    #[serde(with = "u128_field")]
    pub total_token_supply: u128,
    /// Address version prefix byte
    pub address_version: u8,
    /// Handshake version tag
    pub ghost_protocol_version: u64,
    /// Root directory for persistent stores
    pub data_path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: constants::GHOST_PORT,
            max_bidirectional_connections: constants::MAX_BIDIRECTIONAL,
            max_inbound_connections: constants::MAX_INBOUND,
            seed_peers: crate::p2p::default_seeds(),
            block_size_limit: constants::BLOCK_SIZE_LIMIT,
            future_time_limit: constants::FUTURE_TIME_LIMIT,
            target_solvetime: constants::TARGET_SOLVETIME,
            retargeting_window: constants::RETARGETING_WINDOW,
            diff_rebalance_offset: constants::DIFF_REBALANCE_OFFSET,
            block_at_full_emission: constants::BLOCK_AT_FULL_EMISSION,
            total_token_supply: constants::TOTAL_TOKEN_SUPPLY,
            address_version: constants::ADDRESS_VERSION,
            ghost_protocol_version: constants::GHOST_PROTOCOL_VERSION,
            data_path: "ghost-data".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// The consensus view of this configuration
    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            block_size_limit: self.block_size_limit,
            future_time_limit: self.future_time_limit,
            target_solvetime: self.target_solvetime,
            retargeting_window: self.retargeting_window,
            diff_rebalance_offset: self.diff_rebalance_offset,
            block_at_full_emission: self.block_at_full_emission,
            total_token_supply: self.total_token_supply,
            address_version: self.address_version,
        }
    }

    /// The fleet view of this configuration
    pub fn net_config(&self) -> NetConfig {
        NetConfig {
            port: self.port,
            max_bidirectional: self.max_bidirectional_connections,
            max_inbound: self.max_inbound_connections,
            seed_peers: self.seed_peers.clone(),
            startup_delay: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = NodeConfig::default();
        assert_eq!(config.port, constants::GHOST_PORT);
        assert_eq!(config.block_size_limit, 8 * 1024 * 1024);
        assert_eq!(config.total_token_supply, constants::TOTAL_TOKEN_SUPPLY);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: NodeConfig = toml::from_str("port = 4000\n").unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_inbound_connections, constants::MAX_INBOUND);
    }

    #[test]
    fn test_supply_as_string() {
        let config: NodeConfig =
            toml::from_str("total_token_supply = \"100000000000000000\"\n").unwrap();
        assert_eq!(config.total_token_supply, 100_000_000_000_000_000);
    }

    #[test]
    fn test_supply_as_integer() {
        let config: NodeConfig = toml::from_str("total_token_supply = 5000\n").unwrap();
        assert_eq!(config.total_token_supply, 5000);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<NodeConfig>("no_such_key = 1\n").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = NodeConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(toml::from_str::<NodeConfig>(&text).unwrap(), config);
    }

    #[test]
    fn test_chain_params_projection() {
        let config = NodeConfig {
            target_solvetime: 77,
            ..NodeConfig::default()
        };
        assert_eq!(config.chain_params().target_solvetime, 77);
    }
}
