//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Event payloads published by the matching engine and the pair registry, plus the metadata
// attached to every published event.
//--------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AccountId, AssetId, OrderId, Side};

/// State transitions observable on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A new order was accepted onto the book.
    OrderCreated {
        /// Account that placed the order.
        trader: AccountId,
        /// Assigned order id.
        id: OrderId,
        /// Limit price.
        price: u128,
        /// Total quantity in base smallest-units.
        amount: u128,
        /// Order side.
        side: Side,
    },
    /// An order was cancelled by its trader.
    OrderCancelled {
        /// The cancelled order.
        id: OrderId,
        /// Account that owned the order.
        trader: AccountId,
    },
    /// An order's quantity was amended in place.
    OrderAmended {
        /// The amended order.
        id: OrderId,
        /// Account that owns the order.
        trader: AccountId,
        /// The new total quantity.
        new_amount: u128,
    },
    /// A resting order received a fill.
    OrderFilled {
        /// The filled order.
        id: OrderId,
        /// Account that owns the order.
        trader: AccountId,
        /// Total order quantity.
        amount: u128,
        /// Cumulative filled quantity after this fill.
        filled: u128,
        /// Quantity still unfilled after this fill.
        remaining: u128,
        /// Order side.
        side: Side,
    },
    /// Two orders traded against each other.
    TradeExecuted {
        /// Account on the buy side.
        buyer: AccountId,
        /// Account on the sell side.
        seller: AccountId,
        /// Traded quantity in base smallest-units.
        base_amount: u128,
        /// Execution price.
        price: u128,
    },
    /// A trading pair was created in the registry.
    PairCreated {
        /// Base asset of the new pair.
        base: AssetId,
        /// Quote asset of the new pair.
        quote: AssetId,
    },
    /// An asset was added to the registry's quote whitelist.
    QuoteTokenAdded {
        /// The whitelisted asset.
        asset: AssetId,
    },
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique identifier of this event instance.
    pub id: Uuid,
    /// Wall-clock time of publication.
    pub timestamp: DateTime<Utc>,
    /// Bus-assigned sequence number; strictly increasing per bus.
    pub sequence: u64,
    /// Identifier of the component that published the event.
    pub source: String,
}
