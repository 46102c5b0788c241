//! Matching Engine - market order execution against resting liquidity.
//!
//! A market order walks the book outward from the best opposite price one
//! tick at a time:
//! 1. SKIP: empty ticks are passed over
//! 2. SWEEP: expired orders at a visited tick are removed before matching
//! 3. FILL: the tick's queue is consumed head-to-tail until the order is done

use arrayvec::ArrayVec;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use tracing::{error, warn};

use crate::command::{LadderRow, LevelSummary, Owner, Side, UserOrderView};
use crate::config::{SimConfig, TieBreak};
use crate::error::{IntegrityError, SimError};
use crate::ledger::{AccountLedger, Fill};
use crate::order_book::OrderBook;
use crate::pool::{OrderHandle, OrderPool, NULL_HANDLE, WITHDRAWN};

/// Bounded list of the user's outstanding limit orders, oldest first.
///
/// Holds handles only; the pool owns the orders.
#[derive(Debug)]
pub struct UserOrders {
    handles: Vec<OrderHandle>,
    capacity: usize,
}

impl UserOrders {
    pub fn new(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.handles.len() >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn handles(&self) -> &[OrderHandle] {
        &self.handles
    }

    #[inline]
    pub fn contains(&self, handle: OrderHandle) -> bool {
        self.handles.contains(&handle)
    }

    /// Track a new order.
    pub fn register(&mut self, handle: OrderHandle) -> Result<(), SimError> {
        if self.is_full() {
            return Err(SimError::UserOrderCapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.handles.push(handle);
        Ok(())
    }

    /// Stop tracking an order, keeping the rest in submission order.
    ///
    /// Returns false if the handle was not tracked.
    pub fn remove(&mut self, handle: OrderHandle) -> bool {
        match self.handles.iter().position(|&h| h == handle) {
            Some(i) => {
                self.handles.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

/// The matching engine core
pub struct MatchingEngine {
    /// Storage for every resting order
    pub pool: OrderPool,
    /// The limit order book
    pub book: OrderBook,
    ledger: AccountLedger,
    user_orders: UserOrders,
    tie_break: TieBreak,
}

impl MatchingEngine {
    /// Create an engine with an empty book.
    pub fn new(pool_capacity: u32, price_range: u32, max_user_orders: usize, tie_break: TieBreak) -> Self {
        Self {
            pool: OrderPool::new(pool_capacity),
            book: OrderBook::new(price_range),
            ledger: AccountLedger::new(),
            user_orders: UserOrders::new(max_user_orders),
            tie_break,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(
            config.pool_capacity,
            config.price_range,
            config.max_user_orders,
            config.tie_break,
        )
    }

    // ========================================================================
    // Market Orders
    // ========================================================================

    /// Buy `qty` shares from the asks, lowest price first.
    ///
    /// Returns the total notional paid.
    pub fn market_buy(&mut self, qty: u32, now: u64) -> Result<u64, SimError> {
        self.execute_market(Side::Bid, qty, now)
    }

    /// Sell `qty` shares into the bids, highest price first.
    ///
    /// Returns the total notional received.
    pub fn market_sell(&mut self, qty: u32, now: u64) -> Result<u64, SimError> {
        self.execute_market(Side::Ask, qty, now)
    }

    /// Walk the opposite side outward from its best price until `qty` is
    /// filled.
    ///
    /// # Errors
    /// `BookCollapse` if the walk leaves the tick range with size left.
    /// `SideExhausted` carrying the notional if the order filled but the
    /// consumed side has nothing resting afterwards. Fills already made stay
    /// made in both cases.
    fn execute_market(&mut self, aggressor: Side, qty: u32, now: u64) -> Result<u64, SimError> {
        if qty == 0 {
            return Err(SimError::InvalidQuantity);
        }

        let maker = aggressor.opposite();
        let collapse = SimError::BookCollapse { side: maker };
        let range = self.book.price_range();

        let mut price = self.book.best_price(maker).ok_or(collapse)?;
        let mut remaining = qty;
        let mut notional = 0u64;

        loop {
            if self.book.level(price).map_or(false, |l| !l.is_empty()) {
                self.book.set_best(maker, price);
                self.sweep_level(price, now);
                notional += self.fill_level(price, aggressor, &mut remaining);
            }

            if remaining == 0 {
                break;
            }

            let next = match maker {
                Side::Ask => Some(price + 1).filter(|&p| p < range),
                Side::Bid => price.checked_sub(1),
            };
            price = match next {
                Some(p) => p,
                None => {
                    error!(%aggressor, qty, remaining, "market order ran through the whole book");
                    return Err(collapse);
                }
            };
        }

        if self.book.settle(maker).is_err() {
            return Err(SimError::SideExhausted {
                side: maker,
                notional,
            });
        }
        Ok(notional)
    }

    /// Consume the queue at `price` head-to-tail.
    ///
    /// Returns the notional filled at this tick.
    fn fill_level(&mut self, price: u32, aggressor: Side, remaining: &mut u32) -> u64 {
        let mut notional = 0u64;

        while *remaining > 0 {
            let level = self.book.level_mut(price);
            let handle = level.peek_head();
            if handle == NULL_HANDLE {
                break;
            }

            let maker = *self.pool.get(handle);
            let fill = Fill {
                price,
                qty: maker.qty.min(*remaining),
                aggressor,
            };

            if maker.qty <= *remaining {
                // Maker fully filled - unlink and free the slot
                level.pop_front(&mut self.pool);
                self.pool.release(handle);
                if maker.owner.is_user() {
                    self.user_orders.remove(handle);
                }
            } else {
                // Maker partially filled - stays at the head
                self.pool.get_mut(handle).qty -= fill.qty;
                level.subtract_qty(fill.qty);
            }

            if maker.owner.is_user() {
                self.ledger.record_fill(&fill);
            }

            *remaining -= fill.qty;
            notional += fill.notional();
        }

        notional
    }

    // ========================================================================
    // Limit Orders
    // ========================================================================

    /// Rest a limit order; user orders are also tracked.
    ///
    /// # Errors
    /// `UserOrderCapacityExceeded` for a user order when tracking is full
    /// (checked before any slot is taken), plus anything
    /// [`OrderBook::insert`] reports.
    pub fn add_limit_order(
        &mut self,
        side: Side,
        price: u32,
        qty: u32,
        expires_at: u64,
        owner: Owner,
    ) -> Result<OrderHandle, SimError> {
        if owner.is_user() && self.user_orders.is_full() {
            warn!(
                capacity = self.user_orders.capacity(),
                %side,
                price,
                qty,
                "user order rejected: tracking list full"
            );
            return Err(SimError::UserOrderCapacityExceeded {
                capacity: self.user_orders.capacity(),
            });
        }

        let handle = self.book.insert(
            &mut self.pool,
            side,
            price,
            qty,
            expires_at,
            owner,
            self.tie_break,
        )?;

        if owner.is_user() {
            self.user_orders.register(handle)?;
        }

        Ok(handle)
    }

    /// Mark every outstanding user order for removal and stop tracking them.
    ///
    /// The orders leave the book at the next sweep of their tick. Returns
    /// how many were withdrawn.
    pub fn withdraw_all_user_orders(&mut self) -> usize {
        let count = self.user_orders.len();
        self.book.withdraw(&mut self.pool, self.user_orders.handles());
        self.user_orders.clear();
        count
    }

    // ========================================================================
    // Expiration
    // ========================================================================

    /// Sweep one tick, untracking any user order it removes.
    fn sweep_level(&mut self, price: u32, now: u64) -> u32 {
        let user_orders = &mut self.user_orders;
        self.book.sweep_expired(&mut self.pool, price, now, |handle, node| {
            if node.owner.is_user() {
                user_orders.remove(handle);
            }
        })
    }

    /// Sweep every tick as of `now`. Returns the number of orders removed.
    pub fn sweep_all(&mut self, now: u64) -> u32 {
        let user_orders = &mut self.user_orders;
        self.book.sweep_all(&mut self.pool, now, |handle, node| {
            if node.owner.is_user() {
                user_orders.remove(handle);
            }
        })
    }

    #[inline]
    pub fn refresh_bid_ask(&mut self) -> Result<(), SimError> {
        self.book.refresh_bid_ask()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    pub fn best_bid(&self) -> Option<u32> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<u32> {
        self.book.best_ask()
    }

    #[inline]
    pub fn spread(&self) -> Option<u32> {
        self.book.spread()
    }

    /// Number of live orders (including withdrawn ones not yet swept).
    #[inline]
    pub fn order_count(&self) -> u32 {
        self.pool.allocated()
    }

    #[inline]
    pub fn price_level_summary(&self, price: u32) -> LevelSummary {
        self.book.summary(price)
    }

    #[inline]
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    #[inline]
    pub(crate) fn ledger_mut(&mut self) -> &mut AccountLedger {
        &mut self.ledger
    }

    #[inline]
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    #[inline]
    pub fn user_orders(&self) -> &UserOrders {
        &self.user_orders
    }

    /// Outstanding user orders in submission order.
    pub fn user_outstanding_orders(&self) -> Vec<UserOrderView> {
        self.user_orders
            .handles()
            .iter()
            .map(|&h| {
                let node = self.pool.get(h);
                UserOrderView {
                    price: node.price,
                    qty: node.qty,
                }
            })
            .collect()
    }

    /// `N` ladder rows centred on the mid price.
    #[inline]
    pub fn ladder<const N: usize>(&self) -> ArrayVec<LadderRow, N> {
        self.book.ladder::<N>()
    }

    /// Warm up the engine (pre-fault memory pages)
    pub fn warm_up(&mut self) {
        self.pool.warm_up();
    }

    /// Compute a hash of the current state (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();

        self.book.best_bid().hash(&mut hasher);
        self.book.best_ask().hash(&mut hasher);
        self.pool.allocated().hash(&mut hasher);
        self.ledger.hash(&mut hasher);

        for (price, level) in self.book.occupied_levels() {
            price.hash(&mut hasher);
            level.count.hash(&mut hasher);
            level.total_qty.hash(&mut hasher);
        }
        self.user_outstanding_orders().hash(&mut hasher);

        hasher.finish()
    }

    /// Check the structural invariants of book, pool and user tracking.
    ///
    /// Walks every slot; meant for tests and debugging, not the hot path.
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        let bid = self.book.best_bid().ok_or(IntegrityError::EmptyBestLevel { side: Side::Bid })?;
        let ask = self.book.best_ask().ok_or(IntegrityError::EmptyBestLevel { side: Side::Ask })?;
        if bid >= ask {
            return Err(IntegrityError::Crossed { bid, ask });
        }
        for (side, price) in [(Side::Bid, bid), (Side::Ask, ask)] {
            if self.book.level(price).map_or(true, |l| l.is_empty()) {
                return Err(IntegrityError::EmptyBestLevel { side });
            }
        }

        let mut seen = vec![false; self.pool.capacity() as usize];
        let mut reachable = 0u32;

        for (price, level) in self.book.occupied_levels() {
            let mut count = 0u32;
            let mut total = 0u64;
            let mut last = NULL_HANDLE;

            for handle in level.handles(&self.pool) {
                if !self.pool.is_live(handle) {
                    return Err(IntegrityError::FreeSlotLinked { handle, price });
                }
                if std::mem::replace(&mut seen[handle as usize], true) {
                    return Err(IntegrityError::DuplicateLink { handle });
                }

                let node = self.pool.get(handle);
                if node.price != price {
                    return Err(IntegrityError::PriceMismatch {
                        handle,
                        price,
                        recorded: node.price,
                    });
                }
                if node.owner.is_user()
                    && node.expires_at != WITHDRAWN
                    && !self.user_orders.contains(handle)
                {
                    return Err(IntegrityError::UntrackedUserOrder { handle });
                }

                reachable += 1;
                count += 1;
                total += node.qty as u64;
                last = handle;
            }

            if count != level.count || total != level.total_qty || last != level.tail {
                return Err(IntegrityError::LevelTotals { price });
            }
        }

        if reachable != self.pool.allocated() {
            return Err(IntegrityError::LeakedSlots {
                allocated: self.pool.allocated(),
                reachable,
            });
        }

        for &handle in self.user_orders.handles() {
            let live_user = self.pool.is_live(handle) && self.pool.get(handle).owner.is_user();
            if !live_user {
                return Err(IntegrityError::StaleTracking { handle });
            }
        }

        Ok(())
    }
}
