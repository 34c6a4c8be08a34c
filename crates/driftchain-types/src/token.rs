//! Fungible tokens native to the sidechain.

use driftchain_numeric::Amount;
use serde::{Deserialize, Serialize};

use crate::account::AccountName;

/// A token registered via `IssueToken`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The unique ticker symbol.
    pub symbol: String,
    /// Number of smallest-unit digits per whole token.
    pub precision: u8,
    /// The hard cap on `current_supply`; zero means uncapped.
    pub max_supply: Amount,
    /// The total amount currently in circulation.
    pub current_supply: Amount,
    /// Whether `creator` may mint further supply beyond genesis issuance.
    pub mintable: bool,
    /// The account that issued the token and holds minting rights.
    pub creator: AccountName,
}

impl Token {
    /// Whether minting `amount` more would stay within `max_supply` (a
    /// `max_supply` of zero is treated as uncapped).
    pub fn can_mint(&self, amount: Amount) -> bool {
        if self.max_supply.is_zero() {
            return true;
        }
        self.current_supply
            .checked_add(amount)
            .map(|total| total <= self.max_supply)
            .unwrap_or(false)
    }
}
