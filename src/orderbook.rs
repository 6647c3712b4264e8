//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the order book state for a single trading pair: price-indexed FIFO
// queues of resting orders on each side, a dense append-only order table, and per-trader order
// history. All operations are pure state transformations; fund movements live in the matching
// engine, never here.
//
// | Component     | Description                                                               |
// |---------------|---------------------------------------------------------------------------|
// | PriceLevel    | FIFO queue of resting order ids at one price, plus aggregate liquidity    |
// | OrderBook     | Two price indexes, level maps, order table, trader history               |
//--------------------------------------------------------------------------------------------------

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use tracing::trace;

use crate::price_index::PriceIndex;
use crate::types::{AccountId, Order, OrderId, Side};

/// A FIFO queue of resting orders at one price on one side of the book.
///
/// The level exists in its side's price index exactly while the queue is non-empty, which is in
/// turn exactly while `total_liquidity` is positive.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// The price shared by every order in the queue.
    pub price: u128,
    /// Resting order ids, oldest first.
    queue: VecDeque<OrderId>,
    /// Sum of unfilled quantity over the queue, in base smallest-units.
    total_liquidity: u128,
}

impl PriceLevel {
    fn new(price: u128) -> Self {
        Self {
            price,
            queue: VecDeque::new(),
            total_liquidity: 0,
        }
    }

    /// Returns the id of the next order to be matched, without removing it.
    pub fn head(&self) -> Option<OrderId> {
        self.queue.front().copied()
    }

    /// Returns true if no orders rest at this level.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of resting orders at this level.
    pub fn order_count(&self) -> usize {
        self.queue.len()
    }

    /// Returns the aggregate unfilled quantity at this level, in base smallest-units.
    pub fn total_liquidity(&self) -> u128 {
        self.total_liquidity
    }

    /// Iterates the resting order ids in queue order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.queue.iter().copied()
    }

    /// Unlinks an order id from the queue regardless of its position.
    ///
    /// Head removal is the common path; interior removal (cancellation of a queued order) pays a
    /// linear scan of the level.
    fn unlink(&mut self, id: OrderId) -> bool {
        if let Some(position) = self.queue.iter().position(|queued| *queued == id) {
            self.queue.remove(position);
            true
        } else {
            false
        }
    }
}

/// The order book for one trading pair.
///
/// Orders are retained in a dense table after retirement so that lookups by id keep working
/// forever; ids are the table index plus one and are never re-used.
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Active buy prices; the best bid is the maximum.
    bids: PriceIndex,
    /// Active sell prices; the best ask is the minimum.
    asks: PriceIndex,
    /// Price -> level for the bid side.
    bid_levels: HashMap<u128, PriceLevel>,
    /// Price -> level for the ask side.
    ask_levels: HashMap<u128, PriceLevel>,
    /// Dense order table indexed by `id - 1`. Append-only.
    orders: Vec<Order>,
    /// Order ids per trader, in placement order. Append-only.
    by_trader: HashMap<AccountId, Vec<OrderId>>,
    /// Price of the most recent trade; zero before the first trade.
    last_trade_price: u128,
}

impl OrderBook {
    /// Creates an empty order book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new resting order at `price` on `side` and returns its assigned id.
    ///
    /// Creates the price level (and its index entry) when this is the first order at that price.
    /// The caller has already validated `price > 0` and `amount > 0`.
    pub fn insert_resting(
        &mut self,
        trader: AccountId,
        side: Side,
        price: u128,
        amount: u128,
    ) -> OrderId {
        let id = self.orders.len() as OrderId + 1;
        let order = Order {
            id,
            trader,
            price,
            amount,
            filled: 0,
            side,
            timestamp: Utc::now(),
            active: true,
        };
        self.orders.push(order);
        self.by_trader.entry(trader).or_default().push(id);

        let (index, levels) = self.side_mut(side);
        let level = levels.entry(price).or_insert_with(|| {
            trace!(price, ?side, "creating price level");
            index.insert(price);
            PriceLevel::new(price)
        });
        level.queue.push_back(id);
        level.total_liquidity += amount;
        id
    }

    /// Returns the order with the given id, resting or retired.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        if id == 0 {
            return None;
        }
        self.orders.get(id as usize - 1)
    }

    /// Returns the id of the first resting order at a level, if the level exists.
    pub fn head(&self, side: Side, price: u128) -> Option<OrderId> {
        self.levels(side).get(&price).and_then(PriceLevel::head)
    }

    /// Records a fill of `fill` base units against an order.
    ///
    /// When the order becomes fully filled it is dequeued from its level, marked inactive, and the
    /// level is pruned from the price index if it empties. Returns the updated order, or `None`
    /// for an unknown id.
    ///
    /// The caller guarantees `fill <= remaining`.
    pub fn apply_fill(&mut self, id: OrderId, fill: u128) -> Option<&Order> {
        if id == 0 || id as usize > self.orders.len() {
            return None;
        }
        let order = &mut self.orders[id as usize - 1];
        debug_assert!(fill <= order.amount - order.filled);
        order.filled += fill;
        let fully_filled = order.filled == order.amount;
        if fully_filled {
            order.active = false;
        }
        let (side, price) = (order.side, order.price);

        let (index, levels) = self.side_mut(side);
        let emptied = match levels.get_mut(&price) {
            Some(level) => {
                level.total_liquidity -= fill;
                if fully_filled {
                    level.unlink(id);
                }
                level.is_empty()
            }
            None => false,
        };
        if emptied {
            trace!(price, ?side, "pruning empty price level");
            levels.remove(&price);
            index.remove(price);
        }
        self.orders.get(id as usize - 1)
    }

    /// Unlinks a resting order from its level (head or interior) and marks it inactive.
    ///
    /// Returns the unfilled quantity released by the removal, or `None` if the id is unknown or
    /// the order is no longer active.
    pub fn remove_order(&mut self, id: OrderId) -> Option<u128> {
        if id == 0 || id as usize > self.orders.len() {
            return None;
        }
        let order = &mut self.orders[id as usize - 1];
        if !order.active {
            return None;
        }
        order.active = false;
        let remaining = order.amount - order.filled;
        let (side, price) = (order.side, order.price);

        let (index, levels) = self.side_mut(side);
        let emptied = match levels.get_mut(&price) {
            Some(level) => {
                level.unlink(id);
                level.total_liquidity -= remaining;
                level.is_empty()
            }
            None => false,
        };
        if emptied {
            trace!(price, ?side, "pruning empty price level");
            levels.remove(&price);
            index.remove(price);
        }
        Some(remaining)
    }

    /// Changes the total quantity of a resting order in place, preserving its queue position.
    ///
    /// The caller has already verified that the order is active and that
    /// `new_amount > filled` (so the order cannot become fully filled by resizing). Returns
    /// `false` for an unknown or inactive id.
    pub fn resize_order(&mut self, id: OrderId, new_amount: u128) -> bool {
        if id == 0 || id as usize > self.orders.len() {
            return false;
        }
        let order = &mut self.orders[id as usize - 1];
        if !order.active {
            return false;
        }
        debug_assert!(new_amount > order.filled);
        let old_amount = order.amount;
        order.amount = new_amount;
        let (side, price) = (order.side, order.price);

        let (_, levels) = self.side_mut(side);
        if let Some(level) = levels.get_mut(&price) {
            if new_amount >= old_amount {
                level.total_liquidity += new_amount - old_amount;
            } else {
                level.total_liquidity -= old_amount - new_amount;
            }
        }
        true
    }

    /// Returns the aggregate unfilled quantity resting at a level, or zero if the level is absent.
    pub fn liquidity(&self, side: Side, price: u128) -> u128 {
        self.levels(side)
            .get(&price)
            .map_or(0, PriceLevel::total_liquidity)
    }

    /// Returns the price level at `price` on `side`, if any orders rest there.
    pub fn level(&self, side: Side, price: u128) -> Option<&PriceLevel> {
        self.levels(side).get(&price)
    }

    /// Returns the price index for one side of the book.
    pub fn price_index(&self, side: Side) -> &PriceIndex {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Returns the ids of every order a trader has placed, in placement order.
    pub fn orders_of(&self, trader: AccountId) -> &[OrderId] {
        self.by_trader
            .get(&trader)
            .map_or(&[], |orders| orders.as_slice())
    }

    /// Returns the price of the most recent trade, or zero before the first trade.
    pub fn last_trade_price(&self) -> u128 {
        self.last_trade_price
    }

    /// Records the execution price of a trade.
    pub fn record_trade_price(&mut self, price: u128) {
        self.last_trade_price = price;
    }

    /// Returns the number of orders ever created in this book.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn levels(&self, side: Side) -> &HashMap<u128, PriceLevel> {
        match side {
            Side::Bid => &self.bid_levels,
            Side::Ask => &self.ask_levels,
        }
    }

    fn side_mut(&mut self, side: Side) -> (&mut PriceIndex, &mut HashMap<u128, PriceLevel>) {
        match side {
            Side::Bid => (&mut self.bids, &mut self.bid_levels),
            Side::Ask => (&mut self.asks, &mut self.ask_levels),
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new();
        assert_eq!(book.price_index(Side::Bid).best_max(), None);
        assert_eq!(book.price_index(Side::Ask).best_min(), None);
        assert_eq!(book.liquidity(Side::Bid, 100), 0);
        assert_eq!(book.last_trade_price(), 0);
        assert_eq!(book.order(1), None);
    }

    #[test]
    fn test_ids_are_sequential_from_one() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let first = book.insert_resting(trader, Side::Bid, 100, 10);
        let second = book.insert_resting(trader, Side::Ask, 200, 10);
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_insert_creates_level_and_index_entry() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        book.insert_resting(trader, Side::Bid, 100, 10);
        assert!(book.price_index(Side::Bid).contains(100));
        assert_eq!(book.liquidity(Side::Bid, 100), 10);
        let level = match book.level(Side::Bid, 100) {
            Some(level) => level,
            None => panic!("expected a level at 100"),
        };
        assert_eq!(level.order_count(), 1);
    }

    #[test]
    fn test_fifo_head_ordering() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let first = book.insert_resting(trader, Side::Ask, 100, 5);
        let second = book.insert_resting(trader, Side::Ask, 100, 5);
        assert_eq!(book.head(Side::Ask, 100), Some(first));
        book.remove_order(first);
        assert_eq!(book.head(Side::Ask, 100), Some(second));
    }

    #[test]
    fn test_liquidity_aggregates_over_queue() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        for _ in 0..4 {
            book.insert_resting(trader, Side::Bid, 250, 3);
        }
        assert_eq!(book.liquidity(Side::Bid, 250), 12);
    }

    #[test]
    fn test_apply_partial_fill_keeps_order_resting() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let id = book.insert_resting(trader, Side::Bid, 100, 10);
        let order = match book.apply_fill(id, 4) {
            Some(order) => order,
            None => panic!("expected the order to exist"),
        };
        assert!(order.active);
        assert_eq!(order.filled, 4);
        assert_eq!(book.liquidity(Side::Bid, 100), 6);
        assert_eq!(book.head(Side::Bid, 100), Some(id));
    }

    #[test]
    fn test_apply_full_fill_retires_order_and_prunes_level() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let id = book.insert_resting(trader, Side::Ask, 100, 10);
        let order = match book.apply_fill(id, 10) {
            Some(order) => order,
            None => panic!("expected the order to exist"),
        };
        assert!(!order.active);
        assert_eq!(order.filled, 10);
        assert_eq!(book.liquidity(Side::Ask, 100), 0);
        assert!(!book.price_index(Side::Ask).contains(100));
        // Retired orders stay addressable.
        assert!(book.order(id).is_some());
    }

    #[test]
    fn test_remove_interior_order() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let first = book.insert_resting(trader, Side::Bid, 100, 5);
        let middle = book.insert_resting(trader, Side::Bid, 100, 7);
        let last = book.insert_resting(trader, Side::Bid, 100, 9);

        assert_eq!(book.remove_order(middle), Some(7));
        assert_eq!(book.liquidity(Side::Bid, 100), 14);
        // FIFO order of the survivors is preserved.
        assert_eq!(book.head(Side::Bid, 100), Some(first));
        book.remove_order(first);
        assert_eq!(book.head(Side::Bid, 100), Some(last));
    }

    #[test]
    fn test_remove_last_order_prunes_level() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let id = book.insert_resting(trader, Side::Ask, 300, 5);
        assert_eq!(book.remove_order(id), Some(5));
        assert!(!book.price_index(Side::Ask).contains(300));
        assert!(book.level(Side::Ask, 300).is_none());
    }

    #[test]
    fn test_remove_inactive_order_is_rejected() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let id = book.insert_resting(trader, Side::Bid, 100, 5);
        assert_eq!(book.remove_order(id), Some(5));
        assert_eq!(book.remove_order(id), None);
    }

    #[test]
    fn test_remove_partially_filled_order_releases_remainder() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let id = book.insert_resting(trader, Side::Bid, 100, 10);
        book.apply_fill(id, 4);
        assert_eq!(book.remove_order(id), Some(6));
        assert_eq!(book.liquidity(Side::Bid, 100), 0);
    }

    #[test]
    fn test_orders_of_tracks_placement_order() {
        let mut book = OrderBook::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a1 = book.insert_resting(alice, Side::Bid, 100, 1);
        let b1 = book.insert_resting(bob, Side::Ask, 200, 1);
        let a2 = book.insert_resting(alice, Side::Bid, 150, 1);
        assert_eq!(book.orders_of(alice), &[a1, a2]);
        assert_eq!(book.orders_of(bob), &[b1]);
        assert_eq!(book.orders_of(Uuid::new_v4()), &[] as &[OrderId]);
    }

    #[test]
    fn test_resize_order_adjusts_liquidity_in_place() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let first = book.insert_resting(trader, Side::Bid, 100, 10);
        let second = book.insert_resting(trader, Side::Bid, 100, 10);

        assert!(book.resize_order(second, 25));
        assert_eq!(book.liquidity(Side::Bid, 100), 35);
        assert!(book.resize_order(second, 5));
        assert_eq!(book.liquidity(Side::Bid, 100), 15);
        // Queue position is untouched.
        assert_eq!(book.head(Side::Bid, 100), Some(first));
    }

    #[test]
    fn test_resize_unknown_or_inactive_order() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        assert!(!book.resize_order(1, 10));
        let id = book.insert_resting(trader, Side::Ask, 100, 10);
        book.remove_order(id);
        assert!(!book.resize_order(id, 20));
    }

    #[test]
    fn test_level_iter_follows_queue_order() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        let ids: Vec<OrderId> = (0..3)
            .map(|_| book.insert_resting(trader, Side::Ask, 400, 2))
            .collect();
        let level = match book.level(Side::Ask, 400) {
            Some(level) => level,
            None => panic!("expected a level at 400"),
        };
        let walked: Vec<OrderId> = level.iter().collect();
        assert_eq!(walked, ids);
    }

    #[test]
    fn test_last_trade_price_updates() {
        let mut book = OrderBook::new();
        assert_eq!(book.last_trade_price(), 0);
        book.record_trade_price(123);
        assert_eq!(book.last_trade_price(), 123);
    }

    #[test]
    fn test_same_price_on_both_sides_is_independent() {
        let mut book = OrderBook::new();
        let trader = Uuid::new_v4();
        book.insert_resting(trader, Side::Bid, 100, 3);
        book.insert_resting(trader, Side::Ask, 100, 8);
        assert_eq!(book.liquidity(Side::Bid, 100), 3);
        assert_eq!(book.liquidity(Side::Ask, 100), 8);
    }
}
