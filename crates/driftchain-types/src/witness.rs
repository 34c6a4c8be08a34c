//! Witness registration and committee membership.

use serde::{Deserialize, Serialize};

use crate::account::AccountName;

/// A registered witness candidate, ranked chain-wide by approval weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessInfo {
    /// The witness's account name.
    pub account: AccountName,
    /// The libp2p-reachable address the witness produces blocks from.
    pub network_address: String,
    /// Total vote weight currently delegated to this witness.
    pub vote_weight: driftchain_numeric::Amount,
    /// Unix millis this witness registered.
    pub registered_at: i64,
}

/// A witness's slot in a given height's deterministic shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitteeRole {
    /// An active committee member: eligible to lead and to vote.
    Active,
    /// A standby observer: votes do not count toward quorum weight, but add
    /// one to the quorum denominator (spec: "+1 for observers").
    Observer,
}

/// One entry in a height's deterministic witness shuffle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// The witness's account name.
    pub account: AccountName,
    /// This witness's position in the shuffle (0 is first to lead).
    pub slot: u32,
    /// Active or observer for this height.
    pub role: CommitteeRole,
}
