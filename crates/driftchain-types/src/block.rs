//! Sidechain blocks.

use serde::{Deserialize, Serialize};

use crate::account::AccountName;
use crate::codec::{canonical_bytes_excluding, sha256_hex};
use crate::error::CodecError;
use crate::tx::Transaction;

/// The sync mode the producing witness believed it was in when it signed
/// this block (spec §4.5: `Normal` vs `Sync`, the latter widening the
/// inter-block collision-resolution window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// The anchor-chain ingestor was caught up to the anchor tip.
    Normal,
    /// The anchor-chain ingestor was still catching up.
    Sync,
}

/// The producer's self-reported sync status at signing time, carried on
/// every block so peers can detect and explain collision windows without
/// re-deriving them from anchor-chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFlag {
    /// Normal or sync mode at signing time.
    pub mode: SyncMode,
    /// How many anchor blocks behind the chain tip the producer believed it
    /// was, for observability only.
    pub anchor_lag: u64,
}

impl SyncFlag {
    /// The flag a producer in steady state reports.
    pub fn normal() -> Self {
        Self {
            mode: SyncMode::Normal,
            anchor_lag: 0,
        }
    }
}

/// A sidechain block: one height's worth of ordered transactions, committed
/// by a scheduled witness and finalized by committee consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// This block's height. Heights are dense: every integer from genesis
    /// onward has exactly one finalized block.
    pub height: u64,
    /// The canonical hash of the parent block.
    pub parent_hash: String,
    /// The anchor-chain height whose custom operations (if any) seeded this
    /// block's anchor-derived transactions.
    pub anchor_height: u64,
    /// The anchor-chain block's timestamp, Unix millis.
    pub anchor_timestamp: i64,
    /// This block's own timestamp, Unix millis, set by the producing
    /// witness and validated against its parent and the local clock.
    pub timestamp: i64,
    /// Ordered transactions included in this block: anchor-derived
    /// transactions first (in anchor order), then mempool transactions (in
    /// the order the producer selected them).
    pub transactions: Vec<Transaction>,
    /// The account name of the witness that produced this block.
    pub witness: AccountName,
    /// Witnesses scheduled ahead of `witness` in this height's shuffle that
    /// failed to produce in time and were skipped.
    pub missed_by: Vec<AccountName>,
    /// Sum of every included transaction's individually-computed
    /// distribution amount (fees, rewards); a block is rejected if
    /// re-execution does not reproduce this value exactly.
    pub dist: u128,
    /// The producer's self-reported sync status at signing time.
    pub sync_flag: SyncFlag,
    /// The canonical hash of this block (all fields but `hash` and
    /// `signature`). Empty until computed.
    #[serde(default)]
    pub hash: String,
    /// The producing witness's signature over `hash`, in the witness
    /// account's signing key (not the node's transport key).
    #[serde(default)]
    pub signature: String,
}

impl Block {
    /// Fields excluded from the block's hash preimage.
    pub const HASH_EXCLUDED_FIELDS: &'static [&'static str] = &["hash", "signature"];

    /// Computes the canonical hash without mutating `self`.
    pub fn compute_hash(&self) -> Result<String, CodecError> {
        let preimage = canonical_bytes_excluding(self, Self::HASH_EXCLUDED_FIELDS)?;
        Ok(sha256_hex(&preimage))
    }

    /// The block's declared minimum producer delay relative to its parent,
    /// in milliseconds. The primary (slot 0) owes exactly one block
    /// interval; each backup slot beyond it owes an extra half interval, so
    /// a later backup only ever produces after every witness ahead of it in
    /// the shuffle has had a fair chance to lead.
    pub fn min_delay_ms(base_block_interval_ms: i64, producer_slot: u32) -> i64 {
        base_block_interval_ms * (2 + producer_slot as i64) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block {
            height: 10,
            parent_hash: "parent".to_string(),
            anchor_height: 500,
            anchor_timestamp: 1_700_000_000_000,
            timestamp: 1_700_000_003_000,
            transactions: vec![],
            witness: "w1".to_string(),
            missed_by: vec![],
            dist: 0,
            sync_flag: SyncFlag::normal(),
            hash: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn hash_excludes_hash_and_signature_fields() {
        let mut b = sample_block();
        let h1 = b.compute_hash().unwrap();
        b.hash = "whatever".to_string();
        b.signature = "sig".to_string();
        let h2 = b.compute_hash().unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_heights_hash_differently() {
        let b1 = sample_block();
        let mut b2 = sample_block();
        b2.height = 11;
        assert_ne!(b1.compute_hash().unwrap(), b2.compute_hash().unwrap());
    }

    #[test]
    fn min_delay_scales_with_producer_slot() {
        assert_eq!(Block::min_delay_ms(3000, 0), 3000);
        assert_eq!(Block::min_delay_ms(3000, 1), 4500);
        assert_eq!(Block::min_delay_ms(3000, 2), 6000);
    }
}
