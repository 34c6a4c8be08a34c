//! On-chain accounts.

use std::collections::BTreeMap;

use driftchain_numeric::Amount;
use serde::{Deserialize, Serialize};

/// An account name: chosen at registration, unique chain-wide. Stored as a
/// plain string rather than a hash of the owning key so that transfers and
/// order placement read naturally in logs and RPC responses.
pub type AccountName = String;

/// An on-chain account: balances, vote delegation, and LP/order ownership
/// are all keyed off this document rather than stored inline elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The account's unique name.
    pub name: AccountName,
    /// Base58 public key bytes authenticating transactions sent `from` this
    /// account.
    pub public_key: String,
    /// Token balances by symbol. A missing entry means a zero balance.
    pub balances: BTreeMap<String, Amount>,
    /// The witness account names this account currently votes for, in
    /// priority order.
    pub voted_witnesses: Vec<AccountName>,
    /// The weight this account contributed to `voted_witnesses` the last
    /// time it voted, i.e. its `DRIFT` balance at that moment. Re-voting
    /// subtracts this snapshot from the old witnesses before adding the
    /// account's current weight to the new ones, so a balance change
    /// between votes never silently reweights a stale delegation.
    pub last_vote_weight: Amount,
    /// Unix millis this account was first seen (created explicitly, or
    /// auto-upserted by a transfer).
    pub created_at: i64,
}

impl Account {
    /// Builds a freshly-registered account with no balances and no votes.
    pub fn new(name: AccountName, public_key: String, created_at: i64) -> Self {
        Self {
            name,
            public_key,
            balances: BTreeMap::new(),
            voted_witnesses: Vec::new(),
            last_vote_weight: Amount::default(),
            created_at,
        }
    }

    /// The account's balance of `token`, or zero if it holds none.
    pub fn balance_of(&self, token: &str) -> Amount {
        self.balances.get(token).copied().unwrap_or_default()
    }
}
