//! Deterministic witness scheduling.
//!
//! Every epoch boundary (`height % committee_size == 0`) the schedule for the
//! next `committee_size` slots is recomputed from the latest block hash and
//! the current vote-weight ranking. Both steps are pure functions of their
//! inputs so every node (and every historical replay) computes the same
//! schedule.

use driftchain_types::witness::{CommitteeRole, ScheduleEntry, WitnessInfo};
use driftchain_types::AccountName;
use sha2::{Digest, Sha256};

/// Ranks `witnesses` by vote weight descending, tie-broken by account name
/// ascending, and returns the top `committee_size` account names.
pub fn rank_witnesses(witnesses: &[WitnessInfo], committee_size: usize) -> Vec<AccountName> {
    let mut sorted: Vec<&WitnessInfo> = witnesses.iter().collect();
    sorted.sort_by(|a, b| b.vote_weight.cmp(&a.vote_weight).then_with(|| a.account.cmp(&b.account)));
    sorted.into_iter().take(committee_size).map(|w| w.account.clone()).collect()
}

/// A deterministic byte stream derived from repeatedly hashing `seed` with an
/// incrementing counter, consumed 8 bytes at a time. Stands in for a seeded
/// PRNG without pulling in a dependency on `rand_chacha`: every node derives
/// the exact same stream from the same seed bytes.
struct SeededStream {
    seed: Vec<u8>,
    counter: u64,
    block: [u8; 32],
    offset: usize,
}

impl SeededStream {
    fn new(seed: &[u8]) -> Self {
        let mut s = Self {
            seed: seed.to_vec(),
            counter: 0,
            block: [0u8; 32],
            offset: 32,
        };
        s.refill();
        s
    }

    fn refill(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(&self.seed);
        hasher.update(self.counter.to_be_bytes());
        self.block = hasher.finalize().into();
        self.counter += 1;
        self.offset = 0;
    }

    /// Returns a uniform value in `0..bound` (`bound` must be nonzero).
    fn next_below(&mut self, bound: u64) -> u64 {
        if self.offset + 8 > 32 {
            self.refill();
        }
        let bytes: [u8; 8] = self.block[self.offset..self.offset + 8].try_into().unwrap();
        self.offset += 8;
        u64::from_be_bytes(bytes) % bound
    }
}

/// Fisher-Yates shuffle of `accounts`, seeded by `seed_hash` (the latest
/// block's hex-encoded hash, interpreted as raw bytes). Deterministic: the
/// same seed and input ordering always produce the same permutation.
pub fn seeded_shuffle(seed_hash: &str, accounts: &[AccountName]) -> Vec<AccountName> {
    let mut stream = SeededStream::new(seed_hash.as_bytes());
    let mut shuffled = accounts.to_vec();
    let n = shuffled.len();
    for i in (1..n).rev() {
        let j = stream.next_below((i as u64) + 1) as usize;
        shuffled.swap(i, j);
    }
    shuffled
}

/// Computes the schedule for the `committee_size` slots following height
/// `epoch_start_height`, given the latest block hash and the current vote
/// weight ranking. Slot `i` belongs to `shuffle[(epoch_start_height - 1 + i)
/// mod committee_size]` as primary producer; remaining ranked witnesses not
/// selected into the committee serve no role this epoch.
pub fn compute_schedule(
    epoch_start_height: u64,
    seed_hash: &str,
    witnesses: &[WitnessInfo],
    committee_size: usize,
    observer_count: usize,
) -> Vec<ScheduleEntry> {
    let ranked = rank_witnesses(witnesses, committee_size + observer_count);
    let shuffled = seeded_shuffle(seed_hash, &ranked);
    let committee_len = committee_size.min(shuffled.len());
    let schedule: Vec<ScheduleEntry> = shuffled
        .into_iter()
        .enumerate()
        .map(|(slot, account)| {
            let role = if slot < committee_len {
                CommitteeRole::Active
            } else {
                CommitteeRole::Observer
            };
            ScheduleEntry {
                account,
                slot: slot as u32,
                role,
            }
        })
        .collect();
    tracing::debug!(
        epoch_start_height,
        seed_hash,
        committee_len,
        observers = schedule.len().saturating_sub(committee_len),
        schedule = ?schedule.iter().map(|e| e.account.as_str()).collect::<Vec<_>>(),
        "computed witness schedule for epoch"
    );
    schedule
}

/// Looks up the scheduled entry for `height` within an epoch that began at
/// `epoch_start_height`, given the epoch's already-computed `schedule`.
pub fn slot_for_height(epoch_start_height: u64, height: u64, schedule: &[ScheduleEntry]) -> Option<&ScheduleEntry> {
    if schedule.is_empty() {
        return None;
    }
    let offset = height.checked_sub(epoch_start_height)?;
    let idx = (epoch_start_height.saturating_sub(1) + offset) as usize % schedule.len();
    schedule.get(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_numeric::Amount;

    fn witness(name: &str, weight: u64) -> WitnessInfo {
        WitnessInfo {
            account: name.to_string(),
            network_address: format!("ws://{name}"),
            vote_weight: Amount::from(weight),
            registered_at: 0,
        }
    }

    #[test]
    fn rank_breaks_ties_by_account_name() {
        let witnesses = vec![witness("bob", 10), witness("alice", 10), witness("carol", 5)];
        let ranked = rank_witnesses(&witnesses, 2);
        assert_eq!(ranked, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn schedule_is_deterministic_for_fixed_inputs() {
        let witnesses: Vec<WitnessInfo> = (0..5).map(|i| witness(&format!("w{i}"), 100 - i)).collect();
        let a = compute_schedule(100, "deadbeef", &witnesses, 5, 0);
        let b = compute_schedule(100, "deadbeef", &witnesses, 5, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_usually_produce_different_orderings() {
        let witnesses: Vec<WitnessInfo> = (0..8).map(|i| witness(&format!("w{i}"), 100 - i)).collect();
        let a = compute_schedule(100, "seed-one", &witnesses, 8, 0);
        let b = compute_schedule(100, "seed-two", &witnesses, 8, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn slot_lookup_wraps_within_the_epoch() {
        let witnesses: Vec<WitnessInfo> = (0..3).map(|i| witness(&format!("w{i}"), 100 - i)).collect();
        let schedule = compute_schedule(9, "seed", &witnesses, 3, 0);
        let a = slot_for_height(9, 9, &schedule).unwrap();
        let b = slot_for_height(9, 12, &schedule).unwrap();
        assert_eq!(a.account, b.account);
    }

    #[test]
    fn observers_beyond_committee_size_are_marked() {
        let witnesses: Vec<WitnessInfo> = (0..5).map(|i| witness(&format!("w{i}"), 100 - i)).collect();
        let schedule = compute_schedule(10, "seed", &witnesses, 3, 2);
        let active = schedule.iter().filter(|e| e.role == CommitteeRole::Active).count();
        let observers = schedule.iter().filter(|e| e.role == CommitteeRole::Observer).count();
        assert_eq!(active, 3);
        assert_eq!(observers, 2);
    }
}
