//! Executed trades: the append-only history produced by order matching.

use driftchain_numeric::Amount;
use serde::{Deserialize, Serialize};

use crate::order::Side;

/// A trade id: deterministically derived from the two matched order ids and
/// the block height they settled in, so replays are idempotent.
pub type TradeId = String;

/// How a fill was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSource {
    /// Matched between two resting/incoming orderbook orders.
    Orderbook,
}

/// A single matched fill between a taker and a resting maker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// This trade's id.
    pub id: TradeId,
    /// The orderbook pair.
    pub pair: String,
    /// The execution price, in quote-per-base smallest units.
    pub price: Amount,
    /// The quantity filled, in base smallest units.
    pub quantity: Amount,
    /// `price * quantity`, in quote smallest units.
    pub quote_volume: Amount,
    /// The taker's side.
    pub taker_side: Side,
    /// The resting order that was matched against.
    pub maker_order_id: String,
    /// The incoming order that crossed the book.
    pub taker_order_id: String,
    /// How this fill was produced.
    pub source: TradeSource,
    /// Unix millis (block timestamp) this trade settled at.
    pub timestamp: i64,
}
