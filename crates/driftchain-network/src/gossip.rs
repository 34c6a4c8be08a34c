//! Flood gossip for `NEW_BLOCK`, `BLOCK_CONF_ROUND` and `STEEM_SYNC_STATUS`:
//! per-peer dedup keyed on the frame's signature, with a time-bounded
//! history so memory does not grow unbounded, and a clock-skew guard on
//! consensus round messages.

use std::collections::HashMap;

/// How long a seen-signature entry is kept before it is eligible for
/// gossiping again (and is purged from the dedup set).
pub const KEEP_HISTORY_FOR_MS: i64 = 20_000;

/// Tracks gossip signatures already seen, so a flooded message is
/// forwarded to each peer at most once.
pub struct GossipDedup {
    seen: HashMap<String, i64>,
}

impl GossipDedup {
    pub fn new() -> Self {
        Self { seen: HashMap::new() }
    }

    /// Records `sig` as seen at `now_ms` if it was not already present.
    /// Returns `true` if this is the first time `sig` has been seen (i.e.
    /// the message should be forwarded), `false` if it is a duplicate.
    pub fn observe(&mut self, sig: &str, now_ms: i64) -> bool {
        if self.seen.contains_key(sig) {
            return false;
        }
        self.seen.insert(sig.to_string(), now_ms);
        true
    }

    /// Drops entries older than [`KEEP_HISTORY_FOR_MS`].
    pub fn purge_stale(&mut self, now_ms: i64) {
        self.seen.retain(|_, &mut seen_at| now_ms - seen_at < KEEP_HISTORY_FOR_MS);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for GossipDedup {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a `BLOCK_CONF_ROUND` message's timestamp is within tolerance of
/// the local clock. Messages whose `ts` deviates by more than `2 *
/// block_time_ms` are dropped outright rather than gossiped further, since
/// a stale or far-future round vote cannot correspond to live consensus.
pub fn within_clock_tolerance(msg_ts: i64, now_ms: i64, block_time_ms: i64) -> bool {
    (msg_ts - now_ms).abs() <= 2 * block_time_ms
}
