//! Sharded mempool.
//!
//! Transactions have no nonce: ordering within a sender's queue, and
//! globally at selection time, is by `(timestamp, hash)` rather than by a
//! contiguous nonce sequence. The account-keyed sharding and the
//! ready-to-select/expire split are carried over from the upstream
//! kernel's nonce-ordered mempool.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::RandomState;
use parking_lot::Mutex;

use driftchain_types::{AccountName, Transaction};

const SHARD_COUNT: usize = 64;
/// Maximum number of resting transactions accepted from a single sender.
const MAX_PER_SENDER: usize = 256;

/// The outcome of attempting to admit a transaction.
#[derive(Debug, PartialEq, Eq)]
pub enum AddResult {
    /// Accepted into the mempool.
    Accepted,
    /// Already present (same hash); not an error, just a no-op.
    Duplicate,
    /// Rejected, with a human-readable reason.
    Rejected(String),
}

#[derive(Default)]
struct SenderQueue {
    // Ordered by (timestamp, hash) so selection is deterministic and
    // matches the tie-break rule used for block/consensus ordering.
    by_order: BTreeMap<(i64, String), Transaction>,
}

impl SenderQueue {
    fn insert(&mut self, tx: Transaction) -> AddResult {
        let key = (tx.timestamp, tx.hash.clone());
        if self.by_order.contains_key(&key) {
            return AddResult::Duplicate;
        }
        if self.by_order.len() >= MAX_PER_SENDER {
            return AddResult::Rejected("sender queue full".to_string());
        }
        self.by_order.insert(key, tx);
        AddResult::Accepted
    }

    fn remove_by_hash(&mut self, hash: &str) -> bool {
        let key = self
            .by_order
            .keys()
            .find(|(_, h)| h == hash)
            .cloned();
        match key {
            Some(k) => {
                self.by_order.remove(&k);
                true
            }
            None => false,
        }
    }

    fn prune_before(&mut self, cutoff_ms: i64) -> usize {
        let stale: Vec<(i64, String)> = self
            .by_order
            .range(..(cutoff_ms, String::new()))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.by_order.remove(key);
        }
        stale.len()
    }
}

/// Hashes of transactions already committed in a finalized block, bounded to
/// the replay window. Checked at admission time so a transaction already
/// included on-chain cannot be resubmitted and re-executed while its
/// timestamp still falls inside the window — the in-pool duplicate check
/// alone only catches a still-resting transaction, not one already
/// committed and pruned from the pool.
#[derive(Default)]
struct CommittedHashes {
    by_hash: HashMap<String, i64>,
}

impl CommittedHashes {
    fn record(&mut self, hash: String, timestamp: i64) {
        self.by_hash.insert(hash, timestamp);
    }

    fn contains(&self, hash: &str) -> bool {
        self.by_hash.contains_key(hash)
    }

    fn purge_before(&mut self, cutoff_ms: i64) {
        self.by_hash.retain(|_, ts| *ts >= cutoff_ms);
    }
}

/// A sharded, timestamp-ordered transaction pool.
pub struct Mempool {
    shards: Vec<Mutex<HashMap<AccountName, SenderQueue>>>,
    hasher: RandomState,
    total_count: AtomicUsize,
    /// Transactions older than `now - replay_window_ms` are pruned and
    /// their hashes rejected as replays if resubmitted.
    pub replay_window_ms: i64,
    /// The node's configured `MEMPOOL_SIZE`: total resting transactions
    /// across every shard beyond which new admissions are rejected.
    max_total: usize,
    committed: Mutex<CommittedHashes>,
}

impl Mempool {
    /// Builds an empty mempool with the given replay window and no total
    /// size cap.
    pub fn new(replay_window_ms: i64) -> Self {
        Self::with_capacity(replay_window_ms, usize::MAX)
    }

    /// Builds an empty mempool bounded to `max_total` resting transactions
    /// across every shard (the node's `MEMPOOL_SIZE`).
    pub fn with_capacity(replay_window_ms: i64, max_total: usize) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
            total_count: AtomicUsize::new(0),
            replay_window_ms,
            max_total,
            committed: Mutex::new(CommittedHashes::default()),
        }
    }

    fn shard_for(&self, account: &str) -> &Mutex<HashMap<AccountName, SenderQueue>> {
        use std::hash::{BuildHasher, Hasher};
        let mut hasher = self.hasher.build_hasher();
        hasher.write(account.as_bytes());
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Attempts to admit `tx`, rejecting it if its timestamp falls outside
    /// `[now - replay_window_ms, now + replay_window_ms]` or if its hash
    /// already appears in a block finalized within the replay window.
    pub fn add(&self, tx: Transaction, now_ms: i64) -> AddResult {
        if tx.timestamp < now_ms - self.replay_window_ms {
            return AddResult::Rejected("transaction outside replay window".to_string());
        }
        if tx.timestamp > now_ms + self.replay_window_ms {
            return AddResult::Rejected("transaction timestamped too far in the future".to_string());
        }
        if self.committed.lock().contains(&tx.hash) {
            return AddResult::Rejected("transaction already committed within the replay window".to_string());
        }
        if self.total_count.load(Ordering::Relaxed) >= self.max_total {
            return AddResult::Rejected("mempool at capacity".to_string());
        }
        let shard = self.shard_for(&tx.sender);
        let mut guard = shard.lock();
        let queue = guard.entry(tx.sender.clone()).or_default();
        let result = queue.insert(tx);
        if result == AddResult::Accepted {
            self.total_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Removes `hash` from whichever sender's queue holds it.
    pub fn remove(&self, sender: &str, hash: &str) {
        let shard = self.shard_for(sender);
        let mut guard = shard.lock();
        if let Some(queue) = guard.get_mut(sender) {
            if queue.remove_by_hash(hash) {
                self.total_count.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    /// Removes every transaction in `committed`, keyed by `(sender, hash,
    /// timestamp)`, called after a block including them has been finalized.
    /// Each hash is also recorded in the committed-hash index so it cannot
    /// be resubmitted and re-admitted while still inside the replay window,
    /// even after its resting copy (if any) has been pruned here.
    pub fn prune_committed<'a>(&self, committed: impl IntoIterator<Item = (&'a str, &'a str, i64)>) {
        let mut committed_hashes = self.committed.lock();
        for (sender, hash, timestamp) in committed {
            self.remove(sender, hash);
            committed_hashes.record(hash.to_string(), timestamp);
        }
    }

    /// Drops every resting transaction older than `now_ms - replay_window_ms`,
    /// returning the number removed. Also purges committed-hash entries that
    /// have aged out of the replay window.
    pub fn prune_expired(&self, now_ms: i64) -> usize {
        let cutoff = now_ms - self.replay_window_ms;
        let mut removed = 0;
        for shard in &self.shards {
            let mut guard = shard.lock();
            for queue in guard.values_mut() {
                removed += queue.prune_before(cutoff);
            }
            guard.retain(|_, queue| !queue.by_order.is_empty());
        }
        self.total_count.fetch_sub(removed, Ordering::Relaxed);
        self.committed.lock().purge_before(cutoff);
        removed
    }

    /// The total number of resting transactions across every shard.
    pub fn len(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Whether the mempool currently holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selects up to `limit` transactions for block inclusion, at most one
    /// per sender (the earliest by `(timestamp, hash)` in that sender's
    /// queue), in global `(timestamp, hash)` order. A block only ever
    /// touches a given account's state once, so a sender with several
    /// resting transactions contributes only its earliest one per
    /// selection; the rest wait for a later block.
    pub fn select_transactions(&self, limit: usize) -> Vec<Transaction> {
        let mut all: Vec<Transaction> = Vec::new();
        for shard in &self.shards {
            let guard = shard.lock();
            for queue in guard.values() {
                if let Some(tx) = queue.by_order.values().next() {
                    all.push(tx.clone());
                }
            }
        }
        all.sort_by(|a, b| (a.timestamp, &a.hash).cmp(&(b.timestamp, &b.hash)));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_numeric::Amount;
    use driftchain_types::tx::{TxData, TxOrigin};

    fn tx(sender: &str, hash: &str, timestamp: i64) -> Transaction {
        Transaction {
            data: TxData::Transfer {
                to: "bob".to_string(),
                token: "DRIFT".to_string(),
                amount: Amount::from(1u64),
            },
            sender: sender.to_string(),
            timestamp,
            origin: TxOrigin::Mempool,
            hash: hash.to_string(),
            signature: Some("sig".to_string()),
        }
    }

    #[test]
    fn add_then_select_returns_in_timestamp_hash_order() {
        let pool = Mempool::new(60_000);
        pool.add(tx("alice", "aaa", 100), 100);
        pool.add(tx("bob", "zzz", 50), 100);
        let selected = pool.select_transactions(10);
        let hashes: Vec<&str> = selected.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["zzz", "aaa"]);
    }

    #[test]
    fn select_takes_at_most_one_transaction_per_sender() {
        let pool = Mempool::new(60_000);
        pool.add(tx("alice", "bbb", 100), 100);
        pool.add(tx("alice", "aaa", 100), 100);
        pool.add(tx("bob", "zzz", 50), 100);
        let selected = pool.select_transactions(10);
        let hashes: Vec<&str> = selected.iter().map(|t| t.hash.as_str()).collect();
        // alice has two resting transactions tied on timestamp; only the
        // lexicographically earlier hash ("aaa") is selected this round.
        assert_eq!(hashes, vec!["zzz", "aaa"]);
    }

    #[test]
    fn duplicate_hash_is_a_no_op() {
        let pool = Mempool::new(60_000);
        assert_eq!(pool.add(tx("alice", "aaa", 100), 100), AddResult::Accepted);
        assert_eq!(pool.add(tx("alice", "aaa", 100), 100), AddResult::Duplicate);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn rejects_transactions_outside_the_replay_window() {
        let pool = Mempool::new(1_000);
        let result = pool.add(tx("alice", "aaa", 0), 5_000);
        assert!(matches!(result, AddResult::Rejected(_)));
    }

    #[test]
    fn prune_expired_removes_stale_entries_only() {
        let pool = Mempool::new(1_000);
        pool.add(tx("alice", "old", 0), 0);
        pool.add(tx("alice", "new", 900), 900);
        let removed = pool.prune_expired(2_000);
        assert_eq!(removed, 1);
        let remaining = pool.select_transactions(10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hash, "new");
    }

    #[test]
    fn prune_committed_removes_by_sender_and_hash() {
        let pool = Mempool::new(60_000);
        pool.add(tx("alice", "aaa", 100), 100);
        pool.add(tx("alice", "bbb", 100), 100);
        pool.prune_committed([("alice", "aaa", 100)]);
        let remaining = pool.select_transactions(10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hash, "bbb");
    }

    #[test]
    fn committed_hash_is_rejected_on_resubmission_within_the_replay_window() {
        let pool = Mempool::new(60_000);
        pool.add(tx("alice", "aaa", 100), 100);
        pool.prune_committed([("alice", "aaa", 100)]);
        let result = pool.add(tx("alice", "aaa", 100), 150);
        assert!(matches!(result, AddResult::Rejected(_)));
    }

    #[test]
    fn committed_hash_is_forgotten_once_it_ages_out_of_the_replay_window() {
        let pool = Mempool::new(1_000);
        pool.add(tx("alice", "aaa", 100), 100);
        pool.prune_committed([("alice", "aaa", 100)]);
        pool.prune_expired(5_000);
        assert_eq!(
            pool.add(tx("alice", "aaa", 5_000), 5_000),
            AddResult::Accepted
        );
    }

    #[test]
    fn rejects_admission_once_total_capacity_is_reached() {
        let pool = Mempool::with_capacity(60_000, 1);
        assert_eq!(pool.add(tx("alice", "aaa", 100), 100), AddResult::Accepted);
        assert!(matches!(pool.add(tx("bob", "bbb", 100), 100), AddResult::Rejected(_)));
        assert_eq!(pool.len(), 1);
    }
}
