//! Orderbook orders.

use driftchain_numeric::Amount;
use serde::{Deserialize, Serialize};

use crate::account::AccountName;

/// An order id: the hash of the placing transaction.
pub type OrderId = String;

/// Buy or sell side of an orderbook pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Buying the base asset with the quote asset.
    Buy,
    /// Selling the base asset for the quote asset.
    Sell,
}

impl Side {
    /// The opposite side, used when matching against the resting book.
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Limit orders rest until matched or cancelled; market orders match
/// immediately against the best available resting liquidity and any
/// unfilled remainder is discarded rather than resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Rests at `price` until filled or cancelled.
    Limit,
    /// Matches immediately at the best available price; any remainder is
    /// discarded, never rested.
    Market,
}

/// The lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting on the book, untouched by any match yet.
    Open,
    /// Resting on the book with some but not all quantity filled.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled by its owner before being fully filled.
    Cancelled,
    /// Expired before being fully filled.
    Expired,
    /// Rejected at submission and never entered the book.
    Rejected,
}

/// A resting or historical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// The order's id (its placing transaction's hash).
    pub id: OrderId,
    /// The owning account.
    pub user: AccountName,
    /// The orderbook pair, formatted `BASE/QUOTE`.
    pub pair: String,
    /// Buy or sell.
    pub side: Side,
    /// Limit or market.
    pub order_type: OrderType,
    /// The limit price in quote-per-base smallest units. Meaningless (but
    /// still present, set to zero) for market orders.
    pub price: Amount,
    /// The original order quantity, in base smallest units.
    pub quantity: Amount,
    /// The quantity still unfilled.
    pub remaining: Amount,
    /// Total quantity filled so far.
    pub filled: Amount,
    /// Current lifecycle state.
    pub status: OrderStatus,
    /// Unix millis the order was placed.
    pub timestamp: i64,
}

impl Order {
    /// Whether this order can still match or rest.
    pub fn is_open(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled) && !self.remaining.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_side_round_trips() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite().opposite(), Side::Sell);
    }

    #[test]
    fn order_with_zero_remaining_is_not_open() {
        let order = Order {
            id: "abc".into(),
            user: "alice".into(),
            pair: "DRIFT/USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Amount::from(1u64),
            quantity: Amount::from(10u64),
            remaining: Amount::from(0u64),
            filled: Amount::from(10u64),
            status: OrderStatus::Filled,
            timestamp: 0,
        };
        assert!(!order.is_open());
    }
}
