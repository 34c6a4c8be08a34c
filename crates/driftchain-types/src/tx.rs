//! Sidechain transactions: the closed set of operations the state machine
//! can apply. Every operation a user can submit is one of these variants;
//! there is no generic call encoding.

use driftchain_numeric::Amount;
use serde::{Deserialize, Serialize};

use crate::account::AccountName;
use crate::codec::{canonical_bytes_excluding, sha256_hex};
use crate::error::CodecError;
use crate::order::{OrderId, OrderType, Side};
use crate::pool::PoolId;

/// Origin of a transaction: either submitted directly to the mempool, or
/// decoded from a custom operation observed on the anchor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOrigin {
    /// Gossiped between witnesses/peers as a standalone signed message.
    Mempool,
    /// Decoded from a custom operation embedded in an anchor-chain block.
    Anchor,
}

/// The closed set of sidechain operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxData {
    /// Registers a new account name, owned by `public_key`. Authenticated
    /// by a signature from that same key rather than by an existing
    /// account's registered key, since the account does not exist yet.
    CreateAccount {
        /// The account name being registered.
        name: AccountName,
        /// The base58-encoded public key that will own the new account.
        public_key: String,
    },
    /// Moves `amount` of `token` from the sender to `to`.
    Transfer {
        /// The recipient account.
        to: AccountName,
        /// The token symbol being moved.
        token: String,
        /// The amount, in the token's smallest unit.
        amount: Amount,
    },
    /// Registers a new token symbol, owned by the sender.
    IssueToken {
        /// The token's ticker symbol, unique chain-wide.
        symbol: String,
        /// Number of smallest-unit digits per whole token.
        precision: u8,
        /// The hard cap on total supply; zero means uncapped.
        max_supply: Amount,
        /// The amount minted to the creator immediately at issuance.
        initial_supply: Amount,
        /// Whether the creator may mint further supply after genesis.
        mintable: bool,
    },
    /// Mints additional supply of a mintable token to `to`.
    Mint {
        /// The token symbol to mint.
        symbol: String,
        /// The recipient of the newly minted supply.
        to: AccountName,
        /// The amount to mint, in the token's smallest unit.
        amount: Amount,
    },
    /// Casts (or replaces) the sender's witness approval vote.
    Vote {
        /// The witness account names being approved, in priority order.
        witnesses: Vec<AccountName>,
    },
    /// Registers the sender as a witness candidate.
    RegisterWitness {
        /// The libp2p-reachable address the witness will produce blocks from.
        network_address: String,
    },
    /// Creates a new constant-product pool for an unordered token pair.
    CreatePool {
        /// The first token symbol (order does not matter at the API level).
        token_a: String,
        /// The second token symbol.
        token_b: String,
    },
    /// Deposits into a pool, minting LP tokens to the sender.
    AddLiquidity {
        /// The target pool.
        pool_id: PoolId,
        /// Desired deposit amount of `token_a`.
        amount_a: Amount,
        /// Desired deposit amount of `token_b`.
        amount_b: Amount,
        /// Minimum acceptable LP tokens minted; protects against front-running.
        min_lp_out: Amount,
    },
    /// Burns LP tokens, withdrawing the sender's share of both reserves.
    RemoveLiquidity {
        /// The target pool.
        pool_id: PoolId,
        /// The amount of LP tokens to burn.
        lp_amount: Amount,
        /// Minimum acceptable `token_a` returned.
        min_a_out: Amount,
        /// Minimum acceptable `token_b` returned.
        min_b_out: Amount,
    },
    /// Swaps directly against a single named pool.
    SwapExactIn {
        /// The pool to swap against.
        pool_id: PoolId,
        /// The token being sold.
        token_in: String,
        /// The amount of `token_in` to sell.
        amount_in: Amount,
        /// Minimum acceptable amount of the other token received.
        min_amount_out: Amount,
    },
    /// Swaps along a caller-specified chain of pools.
    SwapRoute {
        /// Ordered pool ids to traverse.
        path: Vec<PoolId>,
        /// The token being sold, must be one side of `path[0]`.
        token_in: String,
        /// The amount of `token_in` to sell.
        amount_in: Amount,
        /// Minimum acceptable amount of the final output token received.
        min_amount_out: Amount,
    },
    /// Swaps `token_in` for `token_out`, letting the engine BFS the
    /// cheapest route up to `max_hops` pools.
    SwapAuto {
        /// The token being sold.
        token_in: String,
        /// The token to receive.
        token_out: String,
        /// The amount of `token_in` to sell.
        amount_in: Amount,
        /// Minimum acceptable amount of `token_out` received.
        min_amount_out: Amount,
        /// Maximum number of pool hops the router may use.
        max_hops: u32,
    },
    /// Places a resting or marketable order on an orderbook pair.
    PlaceOrder {
        /// The orderbook pair, formatted `BASE/QUOTE`.
        pair: String,
        /// Buy or sell.
        side: Side,
        /// Limit or market.
        order_type: OrderType,
        /// The limit price in quote-per-base smallest units; ignored for
        /// market orders.
        price: Amount,
        /// The order quantity in base smallest units.
        quantity: Amount,
    },
    /// Cancels a resting order owned by the sender.
    CancelOrder {
        /// The order to cancel.
        order_id: OrderId,
    },
}

/// An envelope around a [`TxData`] payload carrying sender, timing and
/// authentication fields. `hash` and `signature` are always excluded from
/// the signing/hashing preimage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The operation being requested.
    pub data: TxData,
    /// The account submitting the transaction; must match the signing key.
    pub sender: AccountName,
    /// Unix millis at submission time, used for mempool ordering and the
    /// replay window.
    pub timestamp: i64,
    /// Where this transaction came from.
    pub origin: TxOrigin,
    /// The canonical hash of this transaction (all fields but `hash` and
    /// `signature`). Empty until computed.
    #[serde(default)]
    pub hash: String,
    /// Signature over the hash, in the sender's account key. Absent for
    /// transactions decoded from the anchor chain, which are authenticated
    /// by anchor-chain inclusion instead.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Transaction {
    /// Fields excluded from the transaction's hash preimage.
    pub const HASH_EXCLUDED_FIELDS: &'static [&'static str] = &["hash", "signature"];

    /// Computes and returns the canonical hash without mutating `self`.
    pub fn compute_hash(&self) -> Result<String, CodecError> {
        let preimage = canonical_bytes_excluding(self, Self::HASH_EXCLUDED_FIELDS)?;
        Ok(sha256_hex(&preimage))
    }
}
