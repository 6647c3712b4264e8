//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements bounded, aggregated views of order book depth for UI and market-data
// consumers. A snapshot is an immutable point-in-time copy; the number of levels per side is
// always an explicit caller choice, never a silent cap.
//
// | Component       | Description                                                             |
// |-----------------|-------------------------------------------------------------------------|
// | DepthLevel      | One price level with aggregated liquidity and order count               |
// | DepthSnapshot   | Immutable best-first view of both sides                                 |
//--------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orderbook::OrderBook;
use crate::types::Side;

/// One aggregated price level in a depth view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// The level's price.
    pub price: u128,
    /// Total unfilled quantity resting at the level, in base smallest-units.
    pub liquidity: u128,
    /// Number of resting orders at the level.
    pub order_count: usize,
}

/// An immutable snapshot of order book depth.
///
/// Bids are ordered best-first (descending price), asks best-first (ascending price). Each side
/// holds at most the `limit` passed at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Bid levels, highest price first.
    pub bids: Vec<DepthLevel>,
    /// Ask levels, lowest price first.
    pub asks: Vec<DepthLevel>,
    /// Wall-clock time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl DepthSnapshot {
    /// Captures up to `limit` levels per side from a book.
    pub fn capture(book: &OrderBook, limit: usize) -> Self {
        let aggregate = |side: Side, price: u128| {
            let level = book.level(side, price);
            DepthLevel {
                price,
                liquidity: level.map_or(0, |level| level.total_liquidity()),
                order_count: level.map_or(0, |level| level.order_count()),
            }
        };
        let bids = book
            .price_index(Side::Bid)
            .descending(limit)
            .map(|price| aggregate(Side::Bid, price))
            .collect();
        let asks = book
            .price_index(Side::Ask)
            .ascending(limit)
            .map(|price| aggregate(Side::Ask, price))
            .collect();
        Self {
            bids,
            asks,
            timestamp: Utc::now(),
        }
    }

    /// Returns the best bid level, if any.
    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    /// Returns the best ask level, if any.
    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    /// Returns the spread between the best ask and the best bid.
    pub fn spread(&self) -> Option<u128> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => ask.price.checked_sub(bid.price),
            _ => None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
