//! Block validation: the nine conditions a candidate block must satisfy
//! before a witness votes to precommit it.
//!
//! Validation re-executes the block's transactions against a disposable
//! cache checkpoint so the `dist` check can run without mutating the
//! caller's real state; the checkpoint is always rolled back before
//! returning, success or failure.

use driftchain_crypto::PublicKey;
use driftchain_storage::DocStore;
use driftchain_types::error::BlockError;
use driftchain_types::witness::WitnessInfo;
use driftchain_types::{Block, ScheduleEntry};

use crate::scheduler::slot_for_height;

/// Everything a validator needs about the chain's current head, independent
/// of the candidate block being checked.
pub struct ValidationContext<'a> {
    /// The local node's current head block.
    pub parent: &'a Block,
    /// The schedule covering the candidate's height.
    pub schedule: &'a [ScheduleEntry],
    /// The height at which `schedule` took effect.
    pub epoch_start_height: u64,
    /// Base inter-block interval, milliseconds.
    pub base_block_interval_ms: i64,
    /// Maximum seconds a block's timestamp may sit ahead of the local clock.
    pub max_drift_ms: i64,
    /// The current local clock, Unix millis.
    pub now_ms: i64,
    /// Maximum transactions a block may carry.
    pub max_tx_per_block: usize,
    /// Registered witnesses, for schedule/authority checks.
    pub witnesses: &'a [WitnessInfo],
    /// Each witness account's base58 signing public key, as recorded on its
    /// `Account` document (a witness is always an existing account; its
    /// transport address on [`WitnessInfo`] is a separate thing entirely).
    pub witness_keys: &'a [(String, String)],
    /// Blocks already seen at the candidate's height, each `(witness,
    /// hash)`, to detect equivocation.
    pub seen_at_height: &'a [(String, String)],
}

fn witness_key<'a>(keys: &'a [(String, String)], account: &str) -> Option<&'a str> {
    keys.iter()
        .find(|(name, _)| name == account)
        .map(|(_, key)| key.as_str())
}

/// Condition 1: non-empty witness/parent_hash, and at most `max_tx_per_block`
/// transactions.
fn check_shape(block: &Block, ctx: &ValidationContext) -> Result<(), BlockError> {
    if block.witness.is_empty() {
        return Err(BlockError::Shape("empty witness".to_string()));
    }
    if block.parent_hash.is_empty() {
        return Err(BlockError::Shape("empty parent_hash".to_string()));
    }
    if block.transactions.len() > ctx.max_tx_per_block {
        return Err(BlockError::TooManyTransactions {
            max: ctx.max_tx_per_block,
            got: block.transactions.len(),
        });
    }
    Ok(())
}

/// Condition 2: height is exactly one past the parent.
fn check_height(block: &Block, parent: &Block) -> Result<(), BlockError> {
    let expected = parent.height + 1;
    if block.height != expected {
        return Err(BlockError::InvalidHeight {
            expected,
            got: block.height,
        });
    }
    Ok(())
}

/// Condition 3: minimum inter-block delay by producer priority.
fn check_min_delay(
    block: &Block,
    parent: &Block,
    ctx: &ValidationContext,
    producer_slot: u32,
) -> Result<(), BlockError> {
    let delta = block.timestamp - parent.timestamp;
    let min_ms = Block::min_delay_ms(ctx.base_block_interval_ms, producer_slot);
    if delta < min_ms {
        return Err(BlockError::TooEarly {
            delta_ms: delta,
            min_ms,
        });
    }
    Ok(())
}

/// Condition 4: timestamp not too far ahead of the local clock.
fn check_max_drift(block: &Block, ctx: &ValidationContext) -> Result<(), BlockError> {
    if block.timestamp > ctx.now_ms + ctx.max_drift_ms {
        return Err(BlockError::TimestampDrift {
            timestamp: block.timestamp,
            now: ctx.now_ms,
        });
    }
    Ok(())
}

/// Condition 5: the producer is present somewhere in this height's shuffle,
/// primary or backup.
///
/// `slot_for_height` names the primary producer for this height; any other
/// witness in the shuffle may also produce as a backup, with priority
/// determined by its distance from the primary's position: the primary gets
/// priority 1 (`producer_slot = 0`, the shortest minimum delay), and a
/// witness `k` positions after the primary in the shuffle (wrapping) gets
/// priority `k + 1`. A witness absent from the shuffle entirely is rejected.
fn check_witness_scheduled(block: &Block, ctx: &ValidationContext) -> Result<u32, BlockError> {
    let primary = slot_for_height(ctx.epoch_start_height, block.height, ctx.schedule)
        .ok_or(BlockError::WitnessNotScheduled)?;
    let primary_pos = primary.slot as i64;

    let entry = ctx
        .schedule
        .iter()
        .find(|e| e.account == block.witness)
        .ok_or(BlockError::WitnessNotScheduled)?;
    let len = ctx.schedule.len() as i64;
    let producer_slot = (entry.slot as i64 - primary_pos).rem_euclid(len) as u32;
    Ok(producer_slot)
}

/// Condition 6: no prior block at this height from the same witness with a
/// different hash.
fn check_no_equivocation(block: &Block, ctx: &ValidationContext) -> Result<(), BlockError> {
    for (witness, hash) in ctx.seen_at_height {
        if *witness == block.witness && *hash != block.hash {
            return Err(BlockError::Equivocation {
                witness: witness.clone(),
                height: block.height,
            });
        }
    }
    Ok(())
}

/// Condition 7: the claimed hash matches the recomputed canonical hash.
fn check_hash(block: &Block) -> Result<(), BlockError> {
    let expected = block
        .compute_hash()
        .map_err(|e| BlockError::Shape(format!("failed to hash block: {e}")))?;
    if expected != block.hash {
        return Err(BlockError::HashMismatch {
            expected,
            got: block.hash.clone(),
        });
    }
    Ok(())
}

/// Condition 8: the signature verifies against the producing witness's
/// registered public key.
fn check_signature(block: &Block, ctx: &ValidationContext) -> Result<(), BlockError> {
    let key_b58 =
        witness_key(ctx.witness_keys, &block.witness).ok_or(BlockError::WitnessNotScheduled)?;
    let key = PublicKey::from_base58(key_b58).map_err(|_| BlockError::InvalidSignature)?;
    let hash_bytes = hex_to_32(&block.hash).map_err(|_| BlockError::InvalidSignature)?;
    key.verify(&hash_bytes, &block.signature)
        .map_err(|_| BlockError::InvalidSignature)
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

/// Condition 9: re-executing the block's transactions against `engine`
/// reproduces `block.dist` exactly. The caller's engine is left untouched:
/// this function opens and always rolls back its own checkpoint.
pub fn check_dist_reproduces<S: DocStore>(
    block: &Block,
    engine: &mut driftchain_state::StateEngine<S>,
) -> Result<(), BlockError> {
    engine.cache_mut().checkpoint();
    let mut total: u128 = 0;
    let mut divergence = None;
    for tx in &block.transactions {
        match engine.process_transaction(tx) {
            Ok(dist) => total = total.saturating_add(dist),
            Err(e) => {
                divergence = Some(e);
                break;
            }
        }
    }
    engine.cache_mut().rollback();
    if let Some(e) = divergence {
        return Err(BlockError::Shape(format!(
            "re-execution failed at height {}: {e}",
            block.height
        )));
    }
    if total != block.dist {
        return Err(BlockError::DistMismatch {
            expected: block.dist,
            got: total,
        });
    }
    Ok(())
}

/// Runs conditions 1-8 (pure, no re-execution) against `block`. Callers that
/// also want condition 9 should call [`check_dist_reproduces`] separately,
/// since it requires a live state engine.
pub fn validate_block_shape_and_authority(
    block: &Block,
    ctx: &ValidationContext,
) -> Result<(), BlockError> {
    check_shape(block, ctx)?;
    check_height(block, ctx.parent)?;
    let slot = check_witness_scheduled(block, ctx)?;
    check_min_delay(block, ctx.parent, ctx, slot)?;
    check_max_drift(block, ctx)?;
    check_no_equivocation(block, ctx)?;
    check_hash(block)?;
    check_signature(block, ctx)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_crypto::KeyPair;
    use driftchain_numeric::Amount;
    use driftchain_types::SyncFlag;

    fn witness_info(account: &str) -> WitnessInfo {
        WitnessInfo {
            account: account.to_string(),
            network_address: format!("/ip4/127.0.0.1/tcp/0/{account}"),
            vote_weight: Amount::from(1u64),
            registered_at: 0,
        }
    }

    fn schedule(account: &str) -> Vec<ScheduleEntry> {
        vec![ScheduleEntry {
            account: account.to_string(),
            slot: 0,
            role: driftchain_types::CommitteeRole::Active,
        }]
    }

    fn signed_block(keypair: &KeyPair, parent: &Block, timestamp: i64) -> Block {
        let mut block = Block {
            height: parent.height + 1,
            parent_hash: parent.hash.clone(),
            anchor_height: parent.anchor_height,
            anchor_timestamp: parent.anchor_timestamp,
            timestamp,
            transactions: vec![],
            witness: "w0".to_string(),
            missed_by: vec![],
            dist: 0,
            sync_flag: SyncFlag::normal(),
            hash: String::new(),
            signature: String::new(),
        };
        block.hash = block.compute_hash().unwrap();
        let hash_bytes = hex_to_32(&block.hash).unwrap();
        block.signature = keypair.private.sign(&hash_bytes).unwrap();
        block
    }

    fn genesis() -> Block {
        let mut b = Block {
            height: 0,
            parent_hash: "genesis".to_string(),
            anchor_height: 0,
            anchor_timestamp: 0,
            timestamp: 1_700_000_000_000,
            transactions: vec![],
            witness: "genesis".to_string(),
            missed_by: vec![],
            dist: 0,
            sync_flag: SyncFlag::normal(),
            hash: String::new(),
            signature: String::new(),
        };
        b.hash = b.compute_hash().unwrap();
        b
    }

    #[test]
    fn accepts_a_well_formed_block() {
        let keypair = KeyPair::generate();
        let parent = genesis();
        let block = signed_block(&keypair, &parent, parent.timestamp + 3000);
        let witnesses = vec![witness_info("w0")];
        let witness_keys = vec![("w0".to_string(), keypair.public.to_base58())];
        let schedule = schedule("w0");
        let ctx = ValidationContext {
            parent: &parent,
            schedule: &schedule,
            epoch_start_height: 1,
            base_block_interval_ms: 3000,
            max_drift_ms: 2000,
            now_ms: block.timestamp,
            max_tx_per_block: 100,
            witnesses: &witnesses,
            witness_keys: &witness_keys,
            seen_at_height: &[],
        };
        validate_block_shape_and_authority(&block, &ctx).unwrap();
    }

    #[test]
    fn rejects_a_block_that_arrives_too_early() {
        let keypair = KeyPair::generate();
        let parent = genesis();
        let block = signed_block(&keypair, &parent, parent.timestamp + 100);
        let witnesses = vec![witness_info("w0")];
        let witness_keys = vec![("w0".to_string(), keypair.public.to_base58())];
        let schedule = schedule("w0");
        let ctx = ValidationContext {
            parent: &parent,
            schedule: &schedule,
            epoch_start_height: 1,
            base_block_interval_ms: 3000,
            max_drift_ms: 2000,
            now_ms: block.timestamp,
            max_tx_per_block: 100,
            witnesses: &witnesses,
            witness_keys: &witness_keys,
            seen_at_height: &[],
        };
        assert!(matches!(
            validate_block_shape_and_authority(&block, &ctx),
            Err(BlockError::TooEarly { .. })
        ));
    }

    #[test]
    fn rejects_an_unscheduled_witness() {
        let keypair = KeyPair::generate();
        let parent = genesis();
        let block = signed_block(&keypair, &parent, parent.timestamp + 3000);
        let witnesses = vec![witness_info("w0")];
        let witness_keys = vec![("w0".to_string(), keypair.public.to_base58())];
        let schedule = schedule("someone-else");
        let ctx = ValidationContext {
            parent: &parent,
            schedule: &schedule,
            epoch_start_height: 1,
            base_block_interval_ms: 3000,
            max_drift_ms: 2000,
            now_ms: block.timestamp,
            max_tx_per_block: 100,
            witnesses: &witnesses,
            witness_keys: &witness_keys,
            seen_at_height: &[],
        };
        assert!(matches!(
            validate_block_shape_and_authority(&block, &ctx),
            Err(BlockError::WitnessNotScheduled)
        ));
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let keypair = KeyPair::generate();
        let parent = genesis();
        let mut block = signed_block(&keypair, &parent, parent.timestamp + 3000);
        block.signature = KeyPair::generate().private.sign(&[0u8; 32]).unwrap();
        let witnesses = vec![witness_info("w0")];
        let witness_keys = vec![("w0".to_string(), keypair.public.to_base58())];
        let schedule = schedule("w0");
        let ctx = ValidationContext {
            parent: &parent,
            schedule: &schedule,
            epoch_start_height: 1,
            base_block_interval_ms: 3000,
            max_drift_ms: 2000,
            now_ms: block.timestamp,
            max_tx_per_block: 100,
            witnesses: &witnesses,
            witness_keys: &witness_keys,
            seen_at_height: &[],
        };
        assert!(matches!(
            validate_block_shape_and_authority(&block, &ctx),
            Err(BlockError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_equivocation_from_the_same_witness() {
        let keypair = KeyPair::generate();
        let parent = genesis();
        let block = signed_block(&keypair, &parent, parent.timestamp + 3000);
        let witnesses = vec![witness_info("w0")];
        let witness_keys = vec![("w0".to_string(), keypair.public.to_base58())];
        let schedule = schedule("w0");
        let seen = vec![("w0".to_string(), "some-other-hash".to_string())];
        let ctx = ValidationContext {
            parent: &parent,
            schedule: &schedule,
            epoch_start_height: 1,
            base_block_interval_ms: 3000,
            max_drift_ms: 2000,
            now_ms: block.timestamp,
            max_tx_per_block: 100,
            witnesses: &witnesses,
            witness_keys: &witness_keys,
            seen_at_height: &seen,
        };
        assert!(matches!(
            validate_block_shape_and_authority(&block, &ctx),
            Err(BlockError::Equivocation { .. })
        ));
    }
}
