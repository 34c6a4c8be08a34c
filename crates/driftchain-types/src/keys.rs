//! Named document-store collections.
//!
//! The write-through cache (`driftchain-storage`) is collection-keyed: a
//! collection name plus a document id. Centralizing the collection names
//! here keeps every crate that touches storage from inventing its own
//! strings.

/// Account documents, keyed by account name.
pub const COLLECTION_ACCOUNTS: &str = "accounts";
/// Token documents, keyed by symbol.
pub const COLLECTION_TOKENS: &str = "tokens";
/// Liquidity pool documents, keyed by pool id.
pub const COLLECTION_POOLS: &str = "pools";
/// Liquidity position documents, keyed by `{user}:{pool_id}`.
pub const COLLECTION_POSITIONS: &str = "positions";
/// Open and historical order documents, keyed by order id.
pub const COLLECTION_ORDERS: &str = "orders";
/// Trade documents, keyed by trade id.
pub const COLLECTION_TRADES: &str = "trades";
/// Witness registration documents, keyed by account name.
pub const COLLECTION_WITNESSES: &str = "witnesses";
/// Singleton chain-status document (current height, last anchor height seen).
pub const COLLECTION_CHAIN_STATUS: &str = "chain_status";
/// The single document id used inside `COLLECTION_CHAIN_STATUS`.
pub const CHAIN_STATUS_DOC_ID: &str = "head";

/// Builds the composite document id for a liquidity position.
pub fn position_doc_id(user: &str, pool_id: &str) -> String {
    format!("{user}:{pool_id}")
}
