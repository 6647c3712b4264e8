//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module defines the core value types shared by the order book, the matching engine and the
// pair registry: sides, identifiers, assets, orders and trades.
//
// | Section            | Description                                                      |
// |--------------------|------------------------------------------------------------------|
// | IDENTIFIERS        | Aliases for order, account and asset identifiers.                |
// | ENUMS              | Discrete sets of values (Side).                                  |
// | STRUCTS            | Assets, orders and trades.                                       |
// | TESTS              | Unit tests for the defined types.                                |
//--------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
//  IDENTIFIERS
//--------------------------------------------------------------------------------------------------

/// Unique identifier of an order within one trading pair.
///
/// Assigned by the engine from a monotone counter starting at 1. Identifiers are never re-used,
/// which allows the order table to stay append-only.
pub type OrderId = u64;

/// Opaque identifier of a trading account. The engine trusts it as-is; authentication happens
/// upstream.
pub type AccountId = Uuid;

/// Opaque identifier of an asset. `Uuid::nil()` is reserved as "no asset" and rejected wherever an
/// asset identifier is accepted.
pub type AssetId = Uuid;

//--------------------------------------------------------------------------------------------------
//  ENUMS
//--------------------------------------------------------------------------------------------------

/// Represents the side of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// A buy order; rests on the bid side of the book.
    Bid,
    /// A sell order; rests on the ask side of the book.
    Ask,
}

impl Side {
    /// Returns the opposing side.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                   |
// |---------------|-----------------------------------------------|
// | Asset         | An asset identifier plus its decimal scale.   |
// | Order         | A resting or retired limit order.             |
// | Trade         | A completed match between two orders.         |
//--------------------------------------------------------------------------------------------------

/// An asset identifier together with the number of fractional digits of its smallest unit.
///
/// All amounts in the engine are expressed in smallest units; `decimals` is only needed to scale
/// between the base and quote denominations of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// The asset identifier.
    pub id: AssetId,
    /// Number of fractional digits in the asset's smallest unit.
    pub decimals: u8,
}

impl Asset {
    /// Creates a new asset descriptor.
    pub fn new(id: AssetId, decimals: u8) -> Self {
        Self { id, decimals }
    }
}

/// A limit order as stored in the order table.
///
/// Orders are created by placement, mutated by matching and amendment, and retired (but never
/// deleted) by a full fill or a cancellation. Prices are quote smallest-units per whole base unit;
/// amounts are base smallest-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned identifier, unique within the pair.
    pub id: OrderId,
    /// Account that placed the order.
    pub trader: AccountId,
    /// Limit price in quote smallest-units per whole base unit. Always non-zero.
    pub price: u128,
    /// Total order quantity in base smallest-units.
    pub amount: u128,
    /// Quantity already traded, in base smallest-units. Never exceeds `amount`.
    pub filled: u128,
    /// Side of the order.
    pub side: Side,
    /// Wall-clock time of placement. Informational only; queue priority is by insertion order.
    pub timestamp: DateTime<Utc>,
    /// True while the order rests on the book; false once fully filled or cancelled.
    pub active: bool,
}

impl Order {
    /// Returns the unfilled quantity in base smallest-units.
    #[inline]
    pub fn remaining(&self) -> u128 {
        self.amount - self.filled
    }
}

/// A completed trade between a resting buy and a resting sell order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Account on the buy side of the trade.
    pub buyer: AccountId,
    /// Account on the sell side of the trade.
    pub seller: AccountId,
    /// Traded quantity in base smallest-units.
    pub base_amount: u128,
    /// Quote smallest-units moved from buyer escrow to the seller.
    pub quote_amount: u128,
    /// Execution price in quote smallest-units per whole base unit.
    pub price: u128,
    /// Wall-clock time of execution.
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_order_remaining() {
        let order = Order {
            id: 1,
            trader: Uuid::new_v4(),
            price: 1_000,
            amount: 50,
            filled: 20,
            side: Side::Bid,
            timestamp: Utc::now(),
            active: true,
        };
        assert_eq!(order.remaining(), 30);
    }

    #[test]
    fn test_order_serde_round_trip() {
        let order = Order {
            id: 7,
            trader: Uuid::new_v4(),
            price: 42,
            amount: 10,
            filled: 0,
            side: Side::Ask,
            timestamp: Utc::now(),
            active: true,
        };
        let json = match serde_json::to_string(&order) {
            Ok(json) => json,
            Err(e) => panic!("failed to serialize order: {}", e),
        };
        let back: Order = match serde_json::from_str(&json) {
            Ok(order) => order,
            Err(e) => panic!("failed to deserialize order: {}", e),
        };
        assert_eq!(order, back);
    }

    #[test]
    fn test_asset_construction() {
        let id = Uuid::new_v4();
        let asset = Asset::new(id, 18);
        assert_eq!(asset.id, id);
        assert_eq!(asset.decimals, 18);
    }
}
