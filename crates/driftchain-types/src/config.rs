//! Chain parameters and their height-activated overrides.
//!
//! Parameters are resolved the same way upstream resolves protocol
//! upgrades: a base [`ChainParams`] plus a sorted table of `(height, patch)`
//! pairs. [`ParamTable::at`] folds every patch activated at or before the
//! queried height, in height order, onto the base — a pure function with no
//! notion of "current" height, so it can be called for any height the node
//! needs to validate (including ones behind the local tip during replay).

use serde::{Deserialize, Serialize};

/// The full set of tunable protocol parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    /// Number of witnesses in the active rotation.
    pub committee_size: u32,
    /// Number of standby witnesses retained as observers.
    pub observer_count: u32,
    /// Target milliseconds between blocks.
    pub block_interval_ms: i64,
    /// Maximum forward clock drift tolerated on an incoming block, in ms.
    pub max_timestamp_drift_ms: i64,
    /// Maximum number of consensus rounds before a height is declared
    /// stalled and re-attempted with the next scheduled witness.
    pub max_consensus_rounds: u32,
    /// Size of the collision-resolution window during `Sync` mode, in ms.
    pub sync_collision_window_ms: i64,
    /// Swap fee in basis points charged by constant-product pools.
    pub amm_fee_bps: u32,
    /// Maximum hops considered by auto-routed swaps.
    pub max_route_hops: u32,
    /// Mempool replay window: a transaction hash is rejected as a replay if
    /// its timestamp is older than `now - replay_window_ms`.
    pub mempool_replay_window_ms: i64,
    /// Maximum number of peers a node will maintain outbound connections to.
    pub max_peers: u32,
    /// Maximum number of transactions a single block may carry.
    pub max_tx_per_block: u32,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            committee_size: 21,
            observer_count: 6,
            block_interval_ms: 3_000,
            max_timestamp_drift_ms: 15_000,
            max_consensus_rounds: 2,
            sync_collision_window_ms: 200,
            amm_fee_bps: 30,
            max_route_hops: 4,
            mempool_replay_window_ms: 60_000,
            max_peers: 64,
            max_tx_per_block: 500,
        }
    }
}

/// A partial override of [`ChainParams`], activated at a given anchor
/// height. Every field is optional; unset fields leave the running value
/// from the lower-priority patch (or the base) untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamPatch {
    pub committee_size: Option<u32>,
    pub observer_count: Option<u32>,
    pub block_interval_ms: Option<i64>,
    pub max_timestamp_drift_ms: Option<i64>,
    pub max_consensus_rounds: Option<u32>,
    pub sync_collision_window_ms: Option<i64>,
    pub amm_fee_bps: Option<u32>,
    pub max_route_hops: Option<u32>,
    pub mempool_replay_window_ms: Option<i64>,
    pub max_peers: Option<u32>,
    pub max_tx_per_block: Option<u32>,
}

impl ParamPatch {
    fn apply_onto(&self, base: &mut ChainParams) {
        if let Some(v) = self.committee_size {
            base.committee_size = v;
        }
        if let Some(v) = self.observer_count {
            base.observer_count = v;
        }
        if let Some(v) = self.block_interval_ms {
            base.block_interval_ms = v;
        }
        if let Some(v) = self.max_timestamp_drift_ms {
            base.max_timestamp_drift_ms = v;
        }
        if let Some(v) = self.max_consensus_rounds {
            base.max_consensus_rounds = v;
        }
        if let Some(v) = self.sync_collision_window_ms {
            base.sync_collision_window_ms = v;
        }
        if let Some(v) = self.amm_fee_bps {
            base.amm_fee_bps = v;
        }
        if let Some(v) = self.max_route_hops {
            base.max_route_hops = v;
        }
        if let Some(v) = self.mempool_replay_window_ms {
            base.mempool_replay_window_ms = v;
        }
        if let Some(v) = self.max_peers {
            base.max_peers = v;
        }
        if let Some(v) = self.max_tx_per_block {
            base.max_tx_per_block = v;
        }
    }
}

/// A base parameter set plus a table of height-activated overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamTable {
    /// Parameters in effect from anchor height 0 until the first override.
    pub base: ChainParams,
    /// Overrides, in ascending anchor-height order. [`ParamTable::normalize`]
    /// must be called (or the table constructed via [`ParamTable::new`])
    /// before [`ParamTable::at`] is trustworthy.
    pub overrides: Vec<(u64, ParamPatch)>,
}

impl ParamTable {
    /// Builds a table from a base and an unordered set of overrides, sorting
    /// them by activation height.
    pub fn new(base: ChainParams, mut overrides: Vec<(u64, ParamPatch)>) -> Self {
        overrides.sort_by_key(|(h, _)| *h);
        Self { base, overrides }
    }

    /// Resolves the effective parameters at `anchor_height` by folding every
    /// override activated at or before that height, in order, onto the base.
    pub fn at(&self, anchor_height: u64) -> ChainParams {
        let mut params = self.base.clone();
        for (height, patch) in &self.overrides {
            if *height > anchor_height {
                break;
            }
            patch.apply_onto(&mut params);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_only_returns_defaults_before_any_override() {
        let table = ParamTable::new(ChainParams::default(), vec![]);
        assert_eq!(table.at(0).committee_size, 21);
        assert_eq!(table.at(1_000_000).committee_size, 21);
    }

    #[test]
    fn overrides_fold_in_height_order_regardless_of_input_order() {
        let table = ParamTable::new(
            ChainParams::default(),
            vec![
                (
                    200,
                    ParamPatch {
                        committee_size: Some(31),
                        ..Default::default()
                    },
                ),
                (
                    100,
                    ParamPatch {
                        amm_fee_bps: Some(25),
                        ..Default::default()
                    },
                ),
            ],
        );

        let before = table.at(50);
        assert_eq!(before.committee_size, 21);
        assert_eq!(before.amm_fee_bps, 30);

        let mid = table.at(150);
        assert_eq!(mid.committee_size, 21);
        assert_eq!(mid.amm_fee_bps, 25);

        let after = table.at(250);
        assert_eq!(after.committee_size, 31);
        assert_eq!(after.amm_fee_bps, 25);
    }

    #[test]
    fn later_override_does_not_clobber_fields_it_leaves_unset() {
        let table = ParamTable::new(
            ChainParams::default(),
            vec![
                (
                    10,
                    ParamPatch {
                        amm_fee_bps: Some(20),
                        ..Default::default()
                    },
                ),
                (
                    20,
                    ParamPatch {
                        committee_size: Some(41),
                        ..Default::default()
                    },
                ),
            ],
        );
        let at_30 = table.at(30);
        assert_eq!(at_30.amm_fee_bps, 20);
        assert_eq!(at_30.committee_size, 41);
    }
}
