//! The node's on-disk TOML configuration: chain parameters (and their
//! height-activated overrides, spec.md §9's "hardfork table"), the genesis
//! witness roster, and the handful of tunables not already covered by CLI
//! flags/env vars.

use std::path::Path;

use driftchain_types::config::ParamTable;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// One genesis-seeded witness: registered before height 0 so the first
/// epoch's schedule has a committee to shuffle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisWitness {
    pub account: String,
    pub public_key: String,
    pub network_address: String,
    pub vote_weight: u64,
}

/// Recovery tunables: how many out-of-order blocks to buffer and how many
/// `QUERY_BLOCK` attempts to make before declaring recovery stalled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub max_buffer: usize,
    pub max_attempts: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_buffer: 256,
            max_attempts: 20,
        }
    }
}

/// Sync-mode entry tunables (spec.md boundary case (d): entering sync mode
/// with no peers requires `behind_blocks >= 5 * enter_sync_lag`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enter_sync_lag: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { enter_sync_lag: 5 }
    }
}

/// The full node configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The anchor chain's genesis identity, mixed into the handshake's
    /// origin hash so nodes on different chains refuse to peer.
    pub chain_id: String,
    /// Base chain parameters plus height-activated overrides.
    #[serde(default)]
    pub chain_params: ParamTable,
    /// Witnesses present at genesis.
    #[serde(default)]
    pub genesis_witnesses: Vec<GenesisWitness>,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl NodeConfig {
    /// Loads and parses a config file from `path`.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| NodeError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let toml = r#"
            chain_id = "driftchain-testnet-1"
        "#;
        let config: NodeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.chain_id, "driftchain-testnet-1");
        assert_eq!(config.chain_params.base.committee_size, 21);
        assert!(config.genesis_witnesses.is_empty());
        assert_eq!(config.recovery.max_attempts, 20);
        assert_eq!(config.sync.enter_sync_lag, 5);
    }

    #[test]
    fn full_config_round_trips_through_toml() {
        let mut config = NodeConfig {
            chain_id: "driftchain-mainnet".to_string(),
            chain_params: ParamTable::default(),
            genesis_witnesses: vec![GenesisWitness {
                account: "w1".to_string(),
                public_key: "pub1".to_string(),
                network_address: "ws://w1:9944".to_string(),
                vote_weight: 100,
            }],
            recovery: RecoveryConfig::default(),
            sync: SyncConfig::default(),
        };
        config.chain_params.base.committee_size = 5;
        let text = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.genesis_witnesses.len(), 1);
        assert_eq!(parsed.chain_params.base.committee_size, 5);
    }
}
