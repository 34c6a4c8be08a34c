//! Genesis bootstrap: a single deterministic function, not a ceremony
//! (spec.md §1's explicit non-goal on multi-party genesis setup).

use driftchain_types::block::{SyncFlag, SyncMode};
use driftchain_types::error::CodecError;
use driftchain_types::witness::WitnessInfo;
use driftchain_types::Block;

use crate::config::GenesisWitness;

/// The account name recorded as the producer of the genesis block. It owns
/// no key and never signs anything; `Block::signature` is left empty.
pub const GENESIS_WITNESS: &str = "genesis";

/// Builds the deterministic height-0 block for `chain_id`. Two nodes
/// configured with the same `chain_id` and `genesis_witnesses` always
/// derive byte-identical genesis blocks, since nothing here reads the
/// wall clock or local randomness.
pub fn genesis_block(chain_id: &str) -> Result<Block, CodecError> {
    let mut block = Block {
        height: 0,
        parent_hash: chain_id.to_string(),
        anchor_height: 0,
        anchor_timestamp: 0,
        timestamp: 0,
        transactions: Vec::new(),
        witness: GENESIS_WITNESS.to_string(),
        missed_by: Vec::new(),
        dist: 0,
        sync_flag: SyncFlag::normal(),
        hash: String::new(),
        signature: String::new(),
    };
    block.hash = block.compute_hash()?;
    Ok(block)
}

/// Converts the config's genesis witness roster into registered
/// [`WitnessInfo`] records, seeded at genesis timestamp 0.
pub fn genesis_witness_roster(witnesses: &[GenesisWitness]) -> Vec<WitnessInfo> {
    witnesses
        .iter()
        .map(|w| WitnessInfo {
            account: w.account.clone(),
            network_address: w.network_address.clone(),
            vote_weight: driftchain_numeric::Amount::from(w.vote_weight),
            registered_at: 0,
        })
        .collect()
}

/// Never reports a sync-mode of anything but `Normal`: the chain always
/// starts caught up with itself.
pub fn genesis_sync_mode() -> SyncMode {
    SyncMode::Normal
}
