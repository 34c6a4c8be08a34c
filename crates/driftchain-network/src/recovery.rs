//! Block recovery: catching up to a peer's reported head via `QUERY_BLOCK`
//! requests, buffering out-of-order replies, and applying them strictly in
//! height order.

use std::collections::BTreeMap;

use driftchain_types::Block;

/// Tracks an in-progress recovery from a local height up to some observed
/// peer head. Buffers blocks that arrive ahead of the next height needed,
/// and bounds the number of recovery requests before giving up.
pub struct RecoveryState {
    next_needed: u64,
    buffered: BTreeMap<u64, Block>,
    max_buffer: usize,
    attempts: u32,
    max_attempts: u32,
}

/// Recovery gave up after exceeding its attempt budget; the caller should
/// treat this as fatal and stop, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryExhausted;

impl RecoveryState {
    pub fn new(next_needed: u64, max_buffer: usize, max_attempts: u32) -> Self {
        Self {
            next_needed,
            buffered: BTreeMap::new(),
            max_buffer,
            attempts: 0,
            max_attempts,
        }
    }

    /// Records that a `QUERY_BLOCK` request was sent; errors once the
    /// attempt budget is exhausted.
    pub fn record_attempt(&mut self) -> Result<(), RecoveryExhausted> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return Err(RecoveryExhausted);
        }
        Ok(())
    }

    /// Buffers a received block. Drops it silently if the buffer is full
    /// and the block isn't the one needed next (a well-behaved peer won't
    /// trigger this; a misbehaving one gets no special treatment beyond
    /// having its excess responses ignored).
    pub fn receive(&mut self, block: Block) {
        if block.height < self.next_needed {
            return;
        }
        if self.buffered.len() >= self.max_buffer && !self.buffered.contains_key(&block.height) {
            return;
        }
        self.buffered.insert(block.height, block);
    }

    /// Drains every contiguous block starting at `next_needed`, advancing
    /// past each one returned. The caller is expected to apply each block
    /// via `validate_and_add_block` in the order yielded.
    pub fn drain_ready(&mut self) -> Vec<Block> {
        let mut ready = Vec::new();
        while let Some(block) = self.buffered.remove(&self.next_needed) {
            self.next_needed += 1;
            ready.push(block);
        }
        ready
    }

    pub fn next_needed(&self) -> u64 {
        self.next_needed
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_types::SyncFlag;

    fn block(height: u64) -> Block {
        Block {
            height,
            parent_hash: "p".to_string(),
            anchor_height: 0,
            anchor_timestamp: 0,
            timestamp: 0,
            transactions: vec![],
            witness: "w".to_string(),
            missed_by: vec![],
            dist: 0,
            sync_flag: SyncFlag::normal(),
            hash: format!("h{height}"),
            signature: String::new(),
        }
    }

    #[test]
    fn out_of_order_blocks_are_applied_in_height_order() {
        let mut recovery = RecoveryState::new(5, 10, 20);
        recovery.receive(block(7));
        recovery.receive(block(6));
        assert!(recovery.drain_ready().is_empty());
        recovery.receive(block(5));
        let ready = recovery.drain_ready();
        assert_eq!(ready.iter().map(|b| b.height).collect::<Vec<_>>(), vec![5, 6, 7]);
        assert_eq!(recovery.next_needed(), 8);
    }

    #[test]
    fn blocks_below_next_needed_are_discarded() {
        let mut recovery = RecoveryState::new(5, 10, 20);
        recovery.receive(block(3));
        assert_eq!(recovery.buffered_len(), 0);
    }

    #[test]
    fn attempts_beyond_budget_are_exhausted() {
        let mut recovery = RecoveryState::new(0, 10, 2);
        recovery.record_attempt().unwrap();
        recovery.record_attempt().unwrap();
        assert_eq!(recovery.record_attempt(), Err(RecoveryExhausted));
    }

    #[test]
    fn buffer_caps_excess_out_of_order_blocks() {
        let mut recovery = RecoveryState::new(0, 2, 10);
        recovery.receive(block(1));
        recovery.receive(block(2));
        recovery.receive(block(3));
        assert_eq!(recovery.buffered_len(), 2);
    }
}
