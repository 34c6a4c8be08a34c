//! `REBUILD_STATE`: replays every locally-stored block into a fresh state
//! cache from genesis, used to recover from a corrupted or stale state
//! store without re-syncing the whole chain from peers.

use driftchain_crypto::PublicKey;
use driftchain_storage::{BlockStore, RedbDocStore};
use driftchain_types::keys::COLLECTION_ACCOUNTS;
use driftchain_types::Account;

use crate::error::NodeError;

/// Replays every block from height 1 through the local tip into `state`,
/// applying each one's transactions in order. Height 0 (genesis) carries no
/// transactions and is skipped.
///
/// Unless `no_verify` is set, each block's stored hash is recomputed and
/// compared, and its signature is checked against the signing witness's
/// registered public key whenever that account is already resolvable in
/// the state being rebuilt (it may not be, this early in the replay, for
/// witnesses registered by a later block — those are trusted as if
/// `no_verify` applied to them specifically).
///
/// Flushes the cache every `write_interval` blocks, and once more at the
/// end, so a crash mid-replay loses at most `write_interval` blocks of
/// progress rather than the whole rebuild.
pub fn run(
    block_store: &BlockStore<RedbDocStore>,
    state: &mut driftchain_state::StateEngine<RedbDocStore>,
    no_verify: bool,
    write_interval: u64,
) -> Result<u64, NodeError> {
    let tip = block_store.tip_height()?.unwrap_or(0);
    let mut applied = 0u64;

    for height in 1..=tip {
        let Some(block) = block_store.read_one(height)? else {
            tracing::error!(height, "rebuild: missing block in an otherwise dense log");
            return Err(NodeError::RecoveryStall);
        };

        if !no_verify {
            verify_block(state, &block)?;
        }

        for tx in &block.transactions {
            state.process_transaction(tx)?;
        }
        applied += 1;

        if write_interval > 0 && applied % write_interval == 0 {
            state.cache_mut().flush()?;
            tracing::info!(height, "rebuild: checkpoint flushed");
        }
    }

    state.cache_mut().flush()?;
    tracing::info!(tip, applied, "rebuild: replay complete");
    Ok(applied)
}

fn verify_block(state: &driftchain_state::StateEngine<RedbDocStore>, block: &driftchain_types::Block) -> Result<(), NodeError> {
    let recomputed = block
        .compute_hash()
        .map_err(|e| NodeError::Config(format!("rebuild: failed to recompute hash at height {}: {e}", block.height)))?;
    if recomputed != block.hash {
        return Err(NodeError::Config(format!(
            "rebuild: stored hash mismatch at height {} (corrupt block log)",
            block.height
        )));
    }

    let Some(account) = state
        .cache()
        .get::<Account>(COLLECTION_ACCOUNTS, &block.witness)?
    else {
        tracing::debug!(height = block.height, witness = %block.witness, "rebuild: witness account not yet known, trusting signature");
        return Ok(());
    };
    let digest = hex_to_32(&block.hash)
        .map_err(|_| NodeError::Config(format!("rebuild: malformed hash at height {}", block.height)))?;
    let public_key = PublicKey::from_base58(&account.public_key)
        .map_err(|_| NodeError::Config(format!("rebuild: malformed witness key at height {}", block.height)))?;
    public_key
        .verify(&digest, &block.signature)
        .map_err(|_| NodeError::Config(format!("rebuild: bad signature at height {}", block.height)))
}

fn hex_to_32(hex: &str) -> Result<[u8; 32], ()> {
    if hex.len() != 64 {
        return Err(());
    }
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| ())?;
    }
    Ok(out)
}
