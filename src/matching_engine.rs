//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the matching engine for one trading pair. It validates operations,
// moves escrow through the ledger, mutates the order book, and publishes events. Matching is
// price-time priority with strict FIFO inside a price level.
//
// | Component                | Description                                                |
// |--------------------------|-----------------------------------------------------------|
// | MatchingEngine           | Placement, cancel, amend and market-order execution       |
// | EngineError              | Error kinds for every public operation                    |
// | MAX_BATCH_SIZE           | Upper bound on the legs of one batch placement            |
//
//--------------------------------------------------------------------------------------------------
// FUNCTIONS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Return Type      |
// |-------------------------|---------------------------------------------------|------------------|
// | place                   | Batch limit placement with immediate crossing     | Vec<OrderId>     |
// | cancel                  | Cancels a resting order and refunds escrow        | ()               |
// | amend                   | Resizes a resting order in place                  | ()               |
// | execute_market          | Sweeps liquidity along caller-provided levels     | u128             |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::events::{EngineEvent, EventBus};
use crate::ledger::{Ledger, LedgerError};
use crate::orderbook::OrderBook;
use crate::scaling::{self, ScaleError};
use crate::types::{AccountId, Asset, Order, OrderId, Side};

/// Maximum number of legs accepted by one batch placement.
pub const MAX_BATCH_SIZE: usize = 100;

/// Errors returned by the engine's public operations.
///
/// Every error aborts the whole operation: escrow already moved within the same call is refunded
/// and no partial book state survives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A price argument was zero.
    #[error("price must be greater than zero")]
    InvalidPrice,

    /// An amount argument was zero.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// A batch placement exceeded [`MAX_BATCH_SIZE`] legs.
    #[error("batch of {0} legs exceeds the maximum batch size")]
    BatchSizeTooLarge(usize),

    /// The price and amount arrays are empty or of unequal length.
    #[error("prices and amounts must be non-empty and of equal length")]
    InvalidInput,

    /// A base-to-quote conversion truncated to zero quote units.
    #[error("quote amount truncates to zero")]
    QuoteAmountTooSmall,

    /// A quote-to-base conversion truncated to zero base units.
    #[error("base amount truncates to zero")]
    BaseAmountTooSmall,

    /// A scaled value or escrow total does not fit in 128 bits.
    #[error("scaled value exceeds the representable range")]
    ValueOverflow,

    /// The caller is not the trader that placed the order.
    #[error("caller does not own order {0}")]
    Unauthorized(OrderId),

    /// The order was already fully filled or cancelled.
    #[error("order {0} is no longer active")]
    OrderInactive(OrderId),

    /// No order with this id exists.
    #[error("order {0} does not exist")]
    OrderNotFound(OrderId),

    /// An amendment would shrink the order to or below its filled quantity.
    #[error("new amount does not exceed the filled quantity")]
    AmountLessThanFilled,

    /// A market order arrived past its expiration time.
    #[error("market order has expired")]
    OrderExpired,

    /// A market order carried no candidate price levels.
    #[error("no price levels provided")]
    NoPricesProvided,

    /// A market buy received less base than the slippage guard allows.
    #[error("received {received} base units, minimum was {minimum}")]
    InsufficientBaseReceived {
        /// Base units the sweep would deliver.
        received: u128,
        /// Caller-required minimum.
        minimum: u128,
    },

    /// A market sell received less quote than the slippage guard allows.
    #[error("received {received} quote units, minimum was {minimum}")]
    InsufficientQuoteReceived {
        /// Quote units the sweep would deliver.
        received: u128,
        /// Caller-required minimum.
        minimum: u128,
    },

    /// A ledger transfer failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<ScaleError> for EngineError {
    fn from(error: ScaleError) -> Self {
        match error {
            ScaleError::QuoteAmountTooSmall => EngineError::QuoteAmountTooSmall,
            ScaleError::BaseAmountTooSmall => EngineError::BaseAmountTooSmall,
            ScaleError::ValueOverflow => EngineError::ValueOverflow,
            ScaleError::DivisionByZero => EngineError::InvalidPrice,
        }
    }
}

/// Type alias for Result with EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

/// One fill of a planned market-order sweep.
///
/// Market orders are planned from immutable book reads and committed only after every failable
/// check has passed, so a rejected order provably leaves no trace.
struct PlannedFill {
    maker_id: OrderId,
    maker: AccountId,
    price: u128,
    base: u128,
    quote: u128,
}

/// The matching engine for one trading pair.
///
/// Owns the pair's order book and publishes its state transitions on an event bus. Fund custody
/// is delegated to the [`Ledger`]: placement debits escrow, fills credit the counterparties, and
/// cancellation or downward amendment refunds the owner.
///
/// Operations take `&mut self`; callers that share an engine wrap it in a mutex so that each
/// operation is one critical section (see `PairHandle`).
pub struct MatchingEngine {
    /// The pair's base asset.
    base: Asset,
    /// The pair's quote asset.
    quote: Asset,
    /// `10^base.decimals`, the divisor scaling base x price products into quote units.
    base_scale: u128,
    /// The pair's book state.
    book: OrderBook,
    /// Asset-transfer medium.
    ledger: Arc<dyn Ledger>,
    /// Observable side channel.
    events: EventBus,
}

impl MatchingEngine {
    /// Creates an engine for the given pair.
    ///
    /// # Errors
    /// * `ValueOverflow` - the base asset's decimal scale does not fit in 128 bits.
    pub fn new(
        base: Asset,
        quote: Asset,
        ledger: Arc<dyn Ledger>,
        events: EventBus,
    ) -> EngineResult<Self> {
        let base_scale = scaling::unit_scale(base.decimals).ok_or(EngineError::ValueOverflow)?;
        Ok(Self {
            base,
            quote,
            base_scale,
            book: OrderBook::new(),
            ledger,
            events,
        })
    }

    //----------------------------------------------------------------------------------------------
    //  PLACEMENT
    //----------------------------------------------------------------------------------------------

    /// Places a batch of limit orders for `trader`, in array order.
    ///
    /// The whole batch is validated and escrowed up front: buys escrow the summed quote value of
    /// every leg, sells escrow the summed base amount. Each leg is then inserted and immediately
    /// crossed against the opposing level **at that exact price**; placement never sweeps other
    /// levels, so a buy above the best ask still rests at its own price. Aggressive execution is
    /// what market orders are for.
    ///
    /// # Arguments
    /// * `trader` - account placing the orders
    /// * `prices` - limit price per leg, quote smallest-units per whole base unit
    /// * `amounts` - quantity per leg, base smallest-units
    /// * `side` - side shared by every leg
    ///
    /// # Returns
    /// The assigned order ids, one per leg in input order.
    pub fn place(
        &mut self,
        trader: AccountId,
        prices: &[u128],
        amounts: &[u128],
        side: Side,
    ) -> EngineResult<Vec<OrderId>> {
        if prices.is_empty() || prices.len() != amounts.len() {
            return Err(EngineError::InvalidInput);
        }
        if prices.len() > MAX_BATCH_SIZE {
            return Err(EngineError::BatchSizeTooLarge(prices.len()));
        }

        // Validate every leg and compute the escrow total before anything moves.
        let mut escrow: u128 = 0;
        for (&price, &amount) in prices.iter().zip(amounts) {
            if price == 0 {
                return Err(EngineError::InvalidPrice);
            }
            if amount == 0 {
                return Err(EngineError::InvalidAmount);
            }
            let value = scaling::quote_units(amount, price, self.base_scale)?;
            let leg_escrow = match side {
                Side::Bid => value,
                Side::Ask => amount,
            };
            escrow = escrow
                .checked_add(leg_escrow)
                .ok_or(EngineError::ValueOverflow)?;
        }

        let escrow_asset = match side {
            Side::Bid => self.quote.id,
            Side::Ask => self.base.id,
        };
        self.ledger.debit(trader, escrow_asset, escrow)?;
        debug!(%trader, ?side, legs = prices.len(), escrow, "placing batch");

        let mut ids = Vec::with_capacity(prices.len());
        for (&price, &amount) in prices.iter().zip(amounts) {
            let id = self.book.insert_resting(trader, side, price, amount);
            self.events.publish(EngineEvent::OrderCreated {
                trader,
                id,
                price,
                amount,
                side,
            });
            self.cross_at_price(price)?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Matches the bid and ask queues resting at one price against each other.
    ///
    /// Head-of-queue first on both sides; each iteration fills `min(remaining, remaining)` and
    /// settles it through the ledger. The loop ends when either side of the level empties, or
    /// when the marginal fill would transfer zero quote units (a dust remainder keeps resting and
    /// stays refundable through cancel).
    fn cross_at_price(&mut self, price: u128) -> EngineResult<()> {
        loop {
            let (buy_id, sell_id) = match (
                self.book.head(Side::Bid, price),
                self.book.head(Side::Ask, price),
            ) {
                (Some(buy_id), Some(sell_id)) => (buy_id, sell_id),
                _ => break,
            };
            let (buyer, buy_remaining) = match self.book.order(buy_id) {
                Some(order) => (order.trader, order.remaining()),
                None => break,
            };
            let (seller, sell_remaining) = match self.book.order(sell_id) {
                Some(order) => (order.trader, order.remaining()),
                None => break,
            };

            let fill = buy_remaining.min(sell_remaining);
            let value = scaling::quote_units_floor(fill, price, self.base_scale)?;
            if value == 0 {
                break;
            }

            // Both escrows are already held by the engine, so settlement is two credits.
            self.ledger.credit(seller, self.quote.id, value)?;
            self.ledger.credit(buyer, self.base.id, fill)?;

            self.fill_and_publish(buy_id, fill);
            self.fill_and_publish(sell_id, fill);

            self.book.record_trade_price(price);
            self.events.publish(EngineEvent::TradeExecuted {
                buyer,
                seller,
                base_amount: fill,
                price,
            });
            debug!(%buyer, %seller, fill, price, "trade executed");
        }
        Ok(())
    }

    /// Applies a fill to one order and publishes the resulting `OrderFilled` event.
    fn fill_and_publish(&mut self, id: OrderId, fill: u128) {
        if let Some(order) = self.book.apply_fill(id, fill) {
            self.events.publish(EngineEvent::OrderFilled {
                id,
                trader: order.trader,
                amount: order.amount,
                filled: order.filled,
                remaining: order.remaining(),
                side: order.side,
            });
        }
    }

    //----------------------------------------------------------------------------------------------
    //  CANCEL & AMEND
    //----------------------------------------------------------------------------------------------

    /// Cancels a resting order and refunds the unfilled escrow to its trader.
    ///
    /// The order may sit anywhere in its level's queue; interior removal pays a linear scan of
    /// that level. The level is pruned from the price index when the last order leaves it.
    ///
    /// # Errors
    /// * `OrderNotFound` - no such order id.
    /// * `Unauthorized` - `caller` is not the order's trader.
    /// * `OrderInactive` - the order was already filled or cancelled.
    pub fn cancel(&mut self, caller: AccountId, id: OrderId) -> EngineResult<()> {
        let order = self
            .book
            .order(id)
            .ok_or(EngineError::OrderNotFound(id))?;
        if order.trader != caller {
            return Err(EngineError::Unauthorized(id));
        }
        if !order.active {
            return Err(EngineError::OrderInactive(id));
        }
        let (side, price, trader) = (order.side, order.price, order.trader);

        let remaining = self
            .book
            .remove_order(id)
            .ok_or(EngineError::OrderInactive(id))?;

        match side {
            Side::Bid => {
                let refund = scaling::quote_units_floor(remaining, price, self.base_scale)?;
                if refund > 0 {
                    self.ledger.credit(trader, self.quote.id, refund)?;
                }
            }
            Side::Ask => {
                self.ledger.credit(trader, self.base.id, remaining)?;
            }
        }

        self.events.publish(EngineEvent::OrderCancelled { id, trader });
        debug!(%trader, id, price, remaining, "order cancelled");
        Ok(())
    }

    /// Changes the total quantity of a resting order, keeping its queue position.
    ///
    /// Growing the order debits the additional escrow; shrinking it refunds the difference. Time
    /// priority is never reset, which is why price amendment is not offered: cancel and re-place
    /// to move an order to another level.
    ///
    /// # Errors
    /// * `InvalidAmount` - `new_amount` is zero.
    /// * `AmountLessThanFilled` - `new_amount` does not exceed the filled quantity.
    /// * Plus the ownership and liveness errors of [`MatchingEngine::cancel`].
    pub fn amend(&mut self, caller: AccountId, id: OrderId, new_amount: u128) -> EngineResult<()> {
        if new_amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        let order = self
            .book
            .order(id)
            .ok_or(EngineError::OrderNotFound(id))?;
        if order.trader != caller {
            return Err(EngineError::Unauthorized(id));
        }
        if !order.active {
            return Err(EngineError::OrderInactive(id));
        }
        if new_amount <= order.filled {
            return Err(EngineError::AmountLessThanFilled);
        }
        let (side, price, trader, amount) = (order.side, order.price, order.trader, order.amount);

        if new_amount > amount {
            let delta = new_amount - amount;
            // The increase must carry real escrow, so dust growth is rejected.
            let top_up = match side {
                Side::Bid => scaling::quote_units(delta, price, self.base_scale)?,
                Side::Ask => delta,
            };
            self.ledger.debit(trader, self.escrow_asset(side), top_up)?;
        } else if new_amount < amount {
            let delta = amount - new_amount;
            // Refunds floor toward zero; the engine never over-refunds escrow.
            let refund = match side {
                Side::Bid => scaling::quote_units_floor(delta, price, self.base_scale)?,
                Side::Ask => delta,
            };
            if refund > 0 {
                self.ledger.credit(trader, self.escrow_asset(side), refund)?;
            }
        }

        self.book.resize_order(id, new_amount);
        self.events.publish(EngineEvent::OrderAmended {
            id,
            trader,
            new_amount,
        });
        debug!(%trader, id, price, new_amount, "order amended");
        Ok(())
    }

    //----------------------------------------------------------------------------------------------
    //  MARKET ORDERS
    //----------------------------------------------------------------------------------------------

    /// Executes a market order along a caller-provided sequence of price levels.
    ///
    /// For a buy, `amount` is a quote-unit budget and `price_hints` should be ascending ask
    /// prices; for a sell, `amount` is a base-unit quantity and the hints should be descending
    /// bid prices. The engine walks the hints exactly in the given order and never rediscovers
    /// the ordering from the book; providing the sorted slice is the caller's job, iterating it
    /// is the engine's.
    ///
    /// The sweep is planned from immutable book reads first; validation, expiration and the
    /// `min_received` slippage guard are all enforced before the first ledger movement, so a
    /// failed market order leaves book and balances untouched.
    ///
    /// # Arguments
    /// * `trader` - account executing the sweep
    /// * `amount` - quote budget (buy) or base quantity (sell)
    /// * `side` - `Side::Bid` buys base, `Side::Ask` sells it
    /// * `price_hints` - opposing-side price levels to visit, in visit order
    /// * `min_received` - slippage guard on the units received
    /// * `expiration` - unix milliseconds; zero disables the deadline check
    ///
    /// # Returns
    /// The units received: base for a buy, quote for a sell.
    pub fn execute_market(
        &mut self,
        trader: AccountId,
        amount: u128,
        side: Side,
        price_hints: &[u128],
        min_received: u128,
        expiration: u64,
    ) -> EngineResult<u128> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        if price_hints.is_empty() {
            return Err(EngineError::NoPricesProvided);
        }
        if expiration != 0 && Utc::now().timestamp_millis() as u64 >= expiration {
            return Err(EngineError::OrderExpired);
        }

        match side {
            Side::Bid => self.market_buy(trader, amount, price_hints, min_received),
            Side::Ask => self.market_sell(trader, amount, price_hints, min_received),
        }
    }

    /// Sweeps the ask side with a quote budget.
    fn market_buy(
        &mut self,
        trader: AccountId,
        budget: u128,
        price_hints: &[u128],
        min_received: u128,
    ) -> EngineResult<u128> {
        let mut remaining_budget = budget;
        let mut total_base: u128 = 0;
        let mut plan = Vec::new();

        'hints: for &price in price_hints {
            let level = match self.book.level(Side::Ask, price) {
                Some(level) => level,
                None => continue,
            };
            for maker_id in level.iter() {
                let maker = match self.book.order(maker_id) {
                    Some(order) => order,
                    None => continue,
                };
                let max_base =
                    scaling::base_units_floor(remaining_budget, price, self.base_scale)?;
                let fill = maker.remaining().min(max_base);
                if fill == 0 {
                    // The budget no longer buys a single base unit at this price.
                    break 'hints;
                }
                let cost = scaling::quote_units_floor(fill, price, self.base_scale)?;
                if cost == 0 {
                    if fill == maker.remaining() {
                        // Dust maker whose value floors to zero quote; step over it.
                        continue;
                    }
                    break 'hints;
                }
                remaining_budget -= cost;
                total_base = total_base
                    .checked_add(fill)
                    .ok_or(EngineError::ValueOverflow)?;
                plan.push(PlannedFill {
                    maker_id,
                    maker: maker.trader,
                    price,
                    base: fill,
                    quote: cost,
                });
                if remaining_budget == 0 {
                    break 'hints;
                }
            }
        }

        if total_base < min_received {
            return Err(EngineError::InsufficientBaseReceived {
                received: total_base,
                minimum: min_received,
            });
        }

        // Commit: escrow the budget, settle every planned fill, refund the remainder.
        self.ledger.debit(trader, self.quote.id, budget)?;
        debug!(%trader, budget, fills = plan.len(), total_base, "market buy");
        for fill in &plan {
            self.ledger.credit(fill.maker, self.quote.id, fill.quote)?;
            self.ledger.credit(trader, self.base.id, fill.base)?;
            self.fill_and_publish(fill.maker_id, fill.base);
            self.book.record_trade_price(fill.price);
            self.events.publish(EngineEvent::TradeExecuted {
                buyer: trader,
                seller: fill.maker,
                base_amount: fill.base,
                price: fill.price,
            });
        }
        if remaining_budget > 0 {
            self.ledger.credit(trader, self.quote.id, remaining_budget)?;
        }
        Ok(total_base)
    }

    /// Sweeps the bid side with a base quantity.
    fn market_sell(
        &mut self,
        trader: AccountId,
        quantity: u128,
        price_hints: &[u128],
        min_received: u128,
    ) -> EngineResult<u128> {
        let mut remaining_base = quantity;
        let mut total_quote: u128 = 0;
        let mut plan = Vec::new();

        'hints: for &price in price_hints {
            let level = match self.book.level(Side::Bid, price) {
                Some(level) => level,
                None => continue,
            };
            for maker_id in level.iter() {
                let maker = match self.book.order(maker_id) {
                    Some(order) => order,
                    None => continue,
                };
                let fill = maker.remaining().min(remaining_base);
                if fill == 0 {
                    break 'hints;
                }
                let proceeds = scaling::quote_units_floor(fill, price, self.base_scale)?;
                if proceeds == 0 {
                    if fill == maker.remaining() {
                        // Dust maker whose value floors to zero quote; step over it.
                        continue;
                    }
                    // The remaining quantity itself is dust at every further price.
                    break 'hints;
                }
                remaining_base -= fill;
                total_quote = total_quote
                    .checked_add(proceeds)
                    .ok_or(EngineError::ValueOverflow)?;
                plan.push(PlannedFill {
                    maker_id,
                    maker: maker.trader,
                    price,
                    base: fill,
                    quote: proceeds,
                });
                if remaining_base == 0 {
                    break 'hints;
                }
            }
        }

        if total_quote < min_received {
            return Err(EngineError::InsufficientQuoteReceived {
                received: total_quote,
                minimum: min_received,
            });
        }

        self.ledger.debit(trader, self.base.id, quantity)?;
        debug!(%trader, quantity, fills = plan.len(), total_quote, "market sell");
        for fill in &plan {
            self.ledger.credit(fill.maker, self.base.id, fill.base)?;
            self.ledger.credit(trader, self.quote.id, fill.quote)?;
            self.fill_and_publish(fill.maker_id, fill.base);
            self.book.record_trade_price(fill.price);
            self.events.publish(EngineEvent::TradeExecuted {
                buyer: fill.maker,
                seller: trader,
                base_amount: fill.base,
                price: fill.price,
            });
        }
        if remaining_base > 0 {
            self.ledger.credit(trader, self.base.id, remaining_base)?;
        }
        Ok(total_quote)
    }

    //----------------------------------------------------------------------------------------------
    //  READ ACCESSORS
    //----------------------------------------------------------------------------------------------

    /// Returns an order by id, resting or retired.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.book.order(id)
    }

    /// Returns the ids of every order an account has placed on this pair, in placement order.
    pub fn orders_of(&self, account: AccountId) -> &[OrderId] {
        self.book.orders_of(account)
    }

    /// Returns the resting liquidity at one price level, in base smallest-units.
    pub fn liquidity(&self, side: Side, price: u128) -> u128 {
        self.book.liquidity(side, price)
    }

    /// Returns the price of the most recent trade, or zero before the first trade.
    pub fn last_trade_price(&self) -> u128 {
        self.book.last_trade_price()
    }

    /// Returns the pair's base asset.
    pub fn base_asset(&self) -> Asset {
        self.base
    }

    /// Returns the pair's quote asset.
    pub fn quote_asset(&self) -> Asset {
        self.quote
    }

    /// Returns the event bus this engine publishes on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the underlying book, for depth views.
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Captures an aggregated depth view with up to `limit` levels per side.
    pub fn depth(&self, limit: usize) -> crate::depth::DepthSnapshot {
        crate::depth::DepthSnapshot::capture(&self.book, limit)
    }

    fn escrow_asset(&self, side: Side) -> crate::types::AssetId {
        match side {
            Side::Bid => self.quote.id,
            Side::Ask => self.base.id,
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
// Organized by concern:
//   1. Placement and escrow accounting
//   2. Crossing and FIFO priority
//   3. Cancel and amend, including the net-zero laws
//   4. Market orders, including the slippage guard and revert semantics
//   5. Events and determinism
//   6. Property tests over random amounts and prices
//--------------------------------------------------------------------------------------------------
