//! The per-height consensus state machine: candidate tracking, two-round
//! precommit/commit voting, same-height collision resolution, and the
//! liveness force-exit from `SYNC` mode.
//!
//! This module is synchronous and has no network dependency: it reacts to
//! locally-applied facts (`propose`, `record_round0`, `record_round1`,
//! `tick`) and returns the action the caller (the network/mining layer)
//! should take next, matching the core loop's single-threaded,
//! suspend-only-at-I/O-boundaries model.

use std::collections::{BTreeMap, BTreeSet};

use driftchain_types::error::ConsensusError;
use driftchain_types::{AccountName, Block, SyncMode};

/// A candidate block's place in the two-round FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    /// Received and validated; not yet precommitted by this node.
    Proposed,
    /// This node has cast its round-0 vote.
    Precommit,
    /// Round-0 threshold was observed; round-1 voting is underway.
    Commit,
    /// Round-1 threshold was observed and the block was applied.
    Final,
}

/// One block proposal at a given height, with its accumulated votes.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The proposed block.
    pub block: Block,
    /// Witnesses that have cast a round-0 (precommit) vote for this hash.
    pub round0: BTreeSet<AccountName>,
    /// Witnesses that have cast a round-1 (commit) vote for this hash.
    pub round1: BTreeSet<AccountName>,
    /// Current FSM state.
    pub state: CandidateState,
    /// Local clock, milliseconds, when this candidate was first observed.
    pub first_seen_ms: i64,
}

impl Candidate {
    fn new(block: Block, now_ms: i64) -> Self {
        Self {
            block,
            round0: BTreeSet::new(),
            round1: BTreeSet::new(),
            state: CandidateState::Proposed,
            first_seen_ms: now_ms,
        }
    }
}

/// What the caller should do in response to an engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Broadcast our own round-0 vote for this block hash at this height.
    BroadcastRound0 { height: u64, hash: String },
    /// Broadcast our own round-1 vote for this block hash at this height.
    BroadcastRound1 { height: u64, hash: String },
    /// The block reached round-1 threshold and should be applied, flushed,
    /// and have every candidate at height `<= height` pruned.
    Finalize(Block),
    /// Nothing for the caller to do.
    None,
}

/// Per-height candidate pool plus the two-round voting FSM described in
/// spec §4.10. Arena-style: every candidate at or below a finalized height
/// is dropped wholesale rather than individually, matching the engine's
/// one-shot prune-on-finalize behavior.
pub struct ConsensusEngine {
    committee_size: usize,
    is_observer: bool,
    self_vote_restriction: bool,
    self_account: AccountName,
    sync_mode: SyncMode,
    collision_window_ms: i64,
    window_gc_ms: i64,
    mining_allowed: bool,
    candidates: BTreeMap<u64, Vec<Candidate>>,
    /// Height -> time the first candidate for it arrived, `SYNC` mode only.
    collision_windows: BTreeMap<u64, i64>,
    finalized_height: u64,
}

impl ConsensusEngine {
    /// Builds a fresh engine with no candidates and no finalized height.
    pub fn new(
        committee_size: usize,
        is_observer: bool,
        self_vote_restriction: bool,
        self_account: AccountName,
        sync_mode: SyncMode,
    ) -> Self {
        Self {
            committee_size,
            is_observer,
            self_vote_restriction,
            self_account,
            sync_mode,
            collision_window_ms: 200,
            window_gc_ms: 2_000,
            mining_allowed: true,
            candidates: BTreeMap::new(),
            collision_windows: BTreeMap::new(),
            finalized_height: 0,
        }
    }

    /// The vote count a round must exceed to advance, per spec §4.10:
    /// `committee_size * 2/3`, plus one if this node is an observer (so
    /// observer votes can never tip a round by themselves).
    pub fn round_threshold(&self) -> usize {
        (2 * self.committee_size) / 3 + 1 + if self.is_observer { 1 } else { 0 }
    }

    /// Whether mining is currently permitted (false after a liveness
    /// force-exit, until peers recover).
    pub fn mining_allowed(&self) -> bool {
        self.mining_allowed
    }

    /// The height most recently finalized.
    pub fn finalized_height(&self) -> u64 {
        self.finalized_height
    }

    fn candidate_mut(&mut self, height: u64, hash: &str) -> Option<&mut Candidate> {
        self.candidates
            .get_mut(&height)?
            .iter_mut()
            .find(|c| c.block.hash == hash)
    }

    /// Admits a newly-seen, already block-validated candidate. Returns the
    /// action the caller should take: broadcasting our own round-0 vote, or
    /// `None` if this exact hash was already known at this height.
    pub fn propose(&mut self, block: Block, now_ms: i64) -> EngineAction {
        if block.height <= self.finalized_height {
            return EngineAction::None;
        }
        let height = block.height;
        let hash = block.hash.clone();
        let bucket = self.candidates.entry(height).or_default();
        if bucket.iter().any(|c| c.block.hash == hash) {
            return EngineAction::None;
        }
        bucket.push(Candidate::new(block, now_ms));

        if self.sync_mode == SyncMode::Sync {
            self.collision_windows.entry(height).or_insert(now_ms);
        }

        let candidate = bucket.last_mut().expect("just pushed");
        candidate.round0.insert(self.self_account.clone());
        candidate.state = CandidateState::Precommit;
        tracing::info!(height, hash = %hash, "admitted candidate and cast our round-0 vote");
        EngineAction::BroadcastRound0 { height, hash }
    }

    /// Records a peer's round-0 (precommit) vote. Once this candidate's
    /// round-0 set exceeds [`Self::round_threshold`], transitions it to
    /// `Commit` and asks the caller to broadcast our own round-1 vote.
    pub fn record_round0(
        &mut self,
        height: u64,
        hash: &str,
        voter: AccountName,
    ) -> Result<EngineAction, ConsensusError> {
        let threshold = self.round_threshold();
        let candidate = self
            .candidate_mut(height, hash)
            .ok_or_else(|| ConsensusError::DependencyNotFound(format!("no candidate {hash} at height {height}")))?;
        candidate.round0.insert(voter);
        let already_decided =
            candidate.state == CandidateState::Commit || candidate.state == CandidateState::Final;
        if candidate.round0.len() >= threshold && !already_decided {
            candidate.state = CandidateState::Commit;
            tracing::info!(height, hash = %hash, votes = candidate.round0.len(), threshold, "round-0 threshold reached, candidate moved to commit");
            // Only cast our own round-1 vote if we ourselves precommitted
            // this candidate in round 0 (via `propose` or an explicit
            // `record_round0(.., self_account)` call) — otherwise our vote
            // is legitimately absent from this round, which is exactly the
            // case `self_vote_restriction` exists to catch in round 1.
            if candidate.round0.contains(&self.self_account) {
                candidate.round1.insert(self.self_account.clone());
                return Ok(EngineAction::BroadcastRound1 {
                    height,
                    hash: hash.to_string(),
                });
            }
        }
        Ok(EngineAction::None)
    }

    /// Records a peer's round-1 (commit) vote. Once this candidate's
    /// round-1 set exceeds [`Self::round_threshold`] (and, if
    /// `self_vote_restriction` is enabled, includes our own vote),
    /// finalizes the block.
    pub fn record_round1(
        &mut self,
        height: u64,
        hash: &str,
        voter: AccountName,
    ) -> Result<EngineAction, ConsensusError> {
        let threshold = self.round_threshold();
        let self_account = self.self_account.clone();
        let restrict_to_self_vote = self.self_vote_restriction;
        let candidate = self
            .candidate_mut(height, hash)
            .ok_or_else(|| ConsensusError::DependencyNotFound(format!("no candidate {hash} at height {height}")))?;
        candidate.round1.insert(voter);
        let self_voted = candidate.round1.contains(&self_account);
        let already_final = candidate.state == CandidateState::Final;
        if candidate.round1.len() >= threshold
            && !already_final
            && (!restrict_to_self_vote || self_voted)
        {
            candidate.state = CandidateState::Final;
            let votes = candidate.round1.len();
            let block = candidate.block.clone();
            tracing::info!(height, hash = %hash, votes, threshold, "round-1 threshold reached, finalizing block");
            self.finalize(height, block.clone());
            return Ok(EngineAction::Finalize(block));
        }
        Ok(EngineAction::None)
    }

    fn finalize(&mut self, height: u64, _winner: Block) {
        self.finalized_height = height;
        self.candidates.retain(|&h, _| h > height);
        self.collision_windows.retain(|&h, _| h > height);
        tracing::debug!(height, "pruned candidates at or below finalized height");
    }

    /// Resolves same-height collisions that are ready to be decided, per
    /// spec §4.10. Returns the winning candidates resolved this tick, each
    /// paired with the losing hashes pruned alongside it.
    ///
    /// - `NORMAL` mode: any height with more than one candidate that has
    ///   already reached round-0 threshold is resolved immediately,
    ///   `(timestamp ASC, hash ASC)` picking the winner.
    /// - `SYNC` mode: a height's 200 ms collision window (opened on its
    ///   first candidate) must have elapsed before all candidates received
    ///   within it are resolved the same way. Windows older than 2 s with no
    ///   resolution are garbage-collected without resolving (the height is
    ///   presumably already finalized or abandoned).
    pub fn resolve_collisions(&mut self, now_ms: i64) -> Vec<(u64, String)> {
        let mut resolved = Vec::new();
        match self.sync_mode {
            SyncMode::Normal => {
                let heights: Vec<u64> = self.candidates.keys().copied().collect();
                for height in heights {
                    let Some(bucket) = self.candidates.get(&height) else {
                        continue;
                    };
                    let threshold = self.round_threshold();
                    let mut ready: Vec<&Candidate> =
                        bucket.iter().filter(|c| c.round0.len() >= threshold).collect();
                    if ready.len() < 2 {
                        continue;
                    }
                    ready.sort_by(|a, b| {
                        a.block
                            .timestamp
                            .cmp(&b.block.timestamp)
                            .then_with(|| a.block.hash.cmp(&b.block.hash))
                    });
                    let winner_hash = ready[0].block.hash.clone();
                    tracing::warn!(height, winner = %winner_hash, candidates = ready.len(), "resolved same-height collision in normal mode");
                    self.prune_losers(height, &winner_hash);
                    resolved.push((height, winner_hash));
                }
            }
            SyncMode::Sync => {
                let mut expired = Vec::new();
                for (&height, &opened_at) in &self.collision_windows {
                    if now_ms - opened_at >= self.collision_window_ms {
                        expired.push(height);
                    }
                }
                for height in expired {
                    self.collision_windows.remove(&height);
                    let Some(bucket) = self.candidates.get(&height) else {
                        continue;
                    };
                    if bucket.is_empty() {
                        continue;
                    }
                    let mut sorted: Vec<&Candidate> = bucket.iter().collect();
                    sorted.sort_by(|a, b| {
                        a.block
                            .timestamp
                            .cmp(&b.block.timestamp)
                            .then_with(|| a.block.hash.cmp(&b.block.hash))
                    });
                    let winner_hash = sorted[0].block.hash.clone();
                    tracing::warn!(height, winner = %winner_hash, candidates = sorted.len(), "resolved same-height collision window in sync mode");
                    self.prune_losers(height, &winner_hash);
                    resolved.push((height, winner_hash));
                }
                self.collision_windows
                    .retain(|_, &mut opened_at| now_ms - opened_at < self.window_gc_ms);
            }
        }
        resolved
    }

    fn prune_losers(&mut self, height: u64, winner_hash: &str) {
        if let Some(bucket) = self.candidates.get_mut(&height) {
            bucket.retain(|c| c.block.hash == winner_hash);
        }
    }

    /// Applies the liveness check of spec §4.10: if the node is below the
    /// consensus quorum of witness peers (`ceil(witnesses * 0.66)`) while in
    /// `SYNC` mode, force-exits to `NORMAL` and disallows mining until
    /// peers recover. Returns whether a force-exit happened this call.
    pub fn check_liveness(&mut self, active_witness_peers: usize, total_witnesses: usize) -> bool {
        let quorum = total_witnesses.saturating_mul(66).div_ceil(100);
        if self.sync_mode == SyncMode::Sync && active_witness_peers < quorum {
            self.sync_mode = SyncMode::Normal;
            self.mining_allowed = false;
            tracing::warn!(active_witness_peers, quorum, "liveness check failed, force-exiting sync mode and halting mining");
            true
        } else {
            if active_witness_peers >= quorum && !self.mining_allowed {
                tracing::info!(active_witness_peers, quorum, "witness peer quorum recovered, mining re-enabled");
            }
            if active_witness_peers >= quorum {
                self.mining_allowed = true;
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_types::SyncFlag;

    fn block(height: u64, timestamp: i64, hash: &str) -> Block {
        Block {
            height,
            parent_hash: "parent".to_string(),
            anchor_height: 0,
            anchor_timestamp: 0,
            timestamp,
            transactions: vec![],
            witness: format!("witness-{hash}"),
            missed_by: vec![],
            dist: 0,
            sync_flag: SyncFlag::normal(),
            hash: hash.to_string(),
            signature: String::new(),
        }
    }

    /// Reproduces Scenario A: W3 (the scheduled primary) is partitioned
    /// away; W4 mines at `T` with a hash lexicographically *larger* than
    /// W5's block mined at `T+50`. Both candidates reach round-0 threshold.
    /// The engine must still pick W4's block, because `timestamp` sorts
    /// before `hash` in the collision tie-break and `T < T+50`.
    #[test]
    fn scenario_a_earlier_timestamp_wins_regardless_of_hash_order() {
        let mut engine =
            ConsensusEngine::new(5, false, false, "observer".to_string(), SyncMode::Normal);
        let w4_block = block(10, 1_000, "0x11aaaa");
        let w5_block = block(10, 1_050, "0x10aaaa");

        engine.propose(w4_block.clone(), 1_000);
        engine.propose(w5_block.clone(), 1_050);

        for voter in ["w1", "w2", "w3", "w4"] {
            engine
                .record_round0(10, &w4_block.hash, voter.to_string())
                .unwrap();
        }
        for voter in ["w1", "w2", "w3", "w5"] {
            engine
                .record_round0(10, &w5_block.hash, voter.to_string())
                .unwrap();
        }

        let resolved = engine.resolve_collisions(2_000);
        assert_eq!(resolved, vec![(10, w4_block.hash.clone())]);
    }

    #[test]
    fn round_threshold_adds_one_for_observers() {
        let active = ConsensusEngine::new(6, false, false, "a".to_string(), SyncMode::Normal);
        let observer = ConsensusEngine::new(6, true, false, "a".to_string(), SyncMode::Normal);
        assert_eq!(active.round_threshold(), 5);
        assert_eq!(observer.round_threshold(), 6);
    }

    #[test]
    fn round1_threshold_finalizes_and_prunes_lower_heights() {
        let mut engine =
            ConsensusEngine::new(3, false, false, "w1".to_string(), SyncMode::Normal);
        let b = block(1, 1_000, "0xabc");
        engine.propose(b.clone(), 1_000);
        for voter in ["w1", "w2", "w3"] {
            engine.record_round0(1, &b.hash, voter.to_string()).unwrap();
        }
        let mut finalized = false;
        for voter in ["w1", "w2", "w3"] {
            if let EngineAction::Finalize(_) = engine.record_round1(1, &b.hash, voter.to_string()).unwrap() {
                finalized = true;
            }
        }
        assert!(finalized);
        assert_eq!(engine.finalized_height(), 1);
    }

    #[test]
    fn self_vote_restriction_blocks_finalization_without_our_own_round1_vote() {
        let mut engine =
            ConsensusEngine::new(3, false, true, "w1".to_string(), SyncMode::Normal);
        let b = block(1, 1_000, "0xabc");
        // Propose as a peer's message (not our own `propose`), so our
        // round0 set never gains `w1` the way `propose` would.
        engine.candidates.entry(1).or_default().push(Candidate::new(b.clone(), 1_000));
        for voter in ["w2", "w3", "w4"] {
            engine.record_round0(1, &b.hash, voter.to_string()).unwrap();
        }
        // round0 threshold crosses (3 >= committee=3's threshold), moving
        // the candidate to Commit, but since `w1` never precommitted it
        // itself, no round-1 vote is cast on our behalf.
        for voter in ["w2", "w3", "w4"] {
            let action = engine.record_round1(1, &b.hash, voter.to_string()).unwrap();
            assert_eq!(action, EngineAction::None);
        }
        assert_eq!(engine.finalized_height(), 0);
    }

    #[test]
    fn liveness_force_exits_sync_below_quorum() {
        let mut engine =
            ConsensusEngine::new(5, false, false, "w1".to_string(), SyncMode::Sync);
        // quorum = ceil(5 * 0.66) = 4
        let forced = engine.check_liveness(2, 5);
        assert!(forced);
        assert!(!engine.mining_allowed());
    }

    #[test]
    fn liveness_does_not_trip_in_normal_mode() {
        let mut engine =
            ConsensusEngine::new(5, false, false, "w1".to_string(), SyncMode::Normal);
        let forced = engine.check_liveness(1, 5);
        assert!(!forced);
    }

    proptest::proptest! {
        /// Invariant 8: the collision winner for a fixed set of candidates
        /// does not depend on the order candidates were proposed in.
        #[test]
        fn collision_winner_is_independent_of_proposal_order(
            mut entries in proptest::collection::vec(
                (0i64..10_000, "[0-9a-f]{8}"), 2..6,
            )
        ) {
            entries.sort();
            entries.dedup();
            proptest::prop_assume!(entries.len() >= 2);

            let mut forward = ConsensusEngine::new(5, false, false, "w1".to_string(), SyncMode::Normal);
            for (i, (ts, hash)) in entries.iter().enumerate() {
                forward.propose(block(1, *ts, hash), *ts);
                for voter in 0..5 {
                    let _ = forward.record_round0(1, hash, format!("w{voter}-{i}"));
                }
            }
            let forward_winner = forward.resolve_collisions(20_000);

            let mut reversed = ConsensusEngine::new(5, false, false, "w1".to_string(), SyncMode::Normal);
            for (i, (ts, hash)) in entries.iter().enumerate().rev() {
                reversed.propose(block(1, *ts, hash), *ts);
                for voter in 0..5 {
                    let _ = reversed.record_round0(1, hash, format!("w{voter}-{i}"));
                }
            }
            let reversed_winner = reversed.resolve_collisions(20_000);

            proptest::prop_assert_eq!(forward_winner, reversed_winner);
        }
    }
}
