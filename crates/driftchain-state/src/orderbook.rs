//! Orderbook matching: price-time priority.

use driftchain_numeric::{Amount, NumericError};
use driftchain_types::order::{Order, OrderStatus, OrderType, Side};
use driftchain_types::trade::{Trade, TradeSource};

/// Sorts `book` (all orders on one side) into priority order: best price
/// first, ties broken by earliest timestamp. Asks sort ascending by price;
/// bids sort descending.
pub fn sort_book(side: Side, book: &mut [Order]) {
    match side {
        Side::Sell => book.sort_by(|a, b| (a.price, a.timestamp).cmp(&(b.price, b.timestamp))),
        Side::Buy => book.sort_by(|a, b| {
            (b.price, std::cmp::Reverse(b.timestamp)).cmp(&(a.price, std::cmp::Reverse(a.timestamp)))
        }),
    }
}

fn crosses(taker: &Order, resting: &Order) -> bool {
    if taker.order_type == OrderType::Market {
        return true;
    }
    match taker.side {
        Side::Buy => taker.price >= resting.price,
        Side::Sell => taker.price <= resting.price,
    }
}

/// Matches `taker` against `book` (the resting orders on the opposite
/// side, already sorted by [`sort_book`]), filling both sides in place and
/// returning the trades produced. Orders fully filled in `book` are left
/// in place with `status = Filled`; the caller is responsible for removing
/// them from the persisted resting set. Any quantity left unfilled on
/// `taker` after this call rests on the book if `taker.order_type ==
/// Limit`, or is discarded if `Market`.
pub fn match_against_book(
    taker: &mut Order,
    book: &mut [Order],
    mut trade_id_for: impl FnMut(&Order, &Order) -> String,
    now_ms: i64,
) -> Result<Vec<Trade>, NumericError> {
    let mut trades = Vec::new();
    for resting in book.iter_mut() {
        if taker.remaining.is_zero() {
            break;
        }
        if !resting.is_open() {
            continue;
        }
        if !crosses(taker, resting) {
            break;
        }
        let fill_qty = std::cmp::min(taker.remaining, resting.remaining);
        if fill_qty.is_zero() {
            continue;
        }
        let quote_volume = resting
            .price
            .checked_mul(fill_qty)
            .ok_or(NumericError::Overflow)?;

        taker.remaining = taker
            .remaining
            .checked_sub(fill_qty)
            .ok_or(NumericError::Overflow)?;
        taker.filled = taker.filled.checked_add(fill_qty).ok_or(NumericError::Overflow)?;
        resting.remaining = resting
            .remaining
            .checked_sub(fill_qty)
            .ok_or(NumericError::Overflow)?;
        resting.filled = resting
            .filled
            .checked_add(fill_qty)
            .ok_or(NumericError::Overflow)?;

        if taker.remaining.is_zero() {
            taker.status = OrderStatus::Filled;
        } else {
            taker.status = OrderStatus::PartiallyFilled;
        }
        if resting.remaining.is_zero() {
            resting.status = OrderStatus::Filled;
        } else {
            resting.status = OrderStatus::PartiallyFilled;
        }

        trades.push(Trade {
            id: trade_id_for(taker, resting),
            pair: taker.pair.clone(),
            price: resting.price,
            quantity: fill_qty,
            quote_volume,
            taker_side: taker.side,
            maker_order_id: resting.id.clone(),
            taker_order_id: taker.id.clone(),
            source: TradeSource::Orderbook,
            timestamp: now_ms,
        });
    }
    Ok(trades)
}
