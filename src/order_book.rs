//! Order Book - price-indexed store of resting orders.
//!
//! Prices are small bounded ticks, so levels live in a flat array indexed by
//! price. A level's side is implied by where it sits relative to the cached
//! bid and ask; the book never crosses.

use arrayvec::ArrayVec;
use tracing::error;

use crate::command::{LadderRow, LevelSummary, Owner, Side};
use crate::config::TieBreak;
use crate::error::SimError;
use crate::pool::{OrderHandle, OrderNode, OrderPool, WITHDRAWN};
use crate::price_level::PriceLevel;

/// Dense order book over the tick range `0..price_range`.
pub struct OrderBook {
    /// One level per tick, allocated once
    levels: Vec<PriceLevel>,
    /// Highest tick holding a resting buy
    best_bid: Option<u32>,
    /// Lowest tick holding a resting sell
    best_ask: Option<u32>,
}

impl OrderBook {
    /// Create an empty book with `price_range` ticks.
    pub fn new(price_range: u32) -> Self {
        Self {
            levels: vec![PriceLevel::new(); price_range as usize],
            best_bid: None,
            best_ask: None,
        }
    }

    #[inline]
    pub fn price_range(&self) -> u32 {
        self.levels.len() as u32
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    #[inline]
    pub fn best_bid(&self) -> Option<u32> {
        self.best_bid
    }

    #[inline]
    pub fn best_ask(&self) -> Option<u32> {
        self.best_ask
    }

    #[inline]
    pub fn best_price(&self, side: Side) -> Option<u32> {
        match side {
            Side::Bid => self.best_bid,
            Side::Ask => self.best_ask,
        }
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<u32> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Move a best-price pointer during a market order scan.
    #[inline]
    pub(crate) fn set_best(&mut self, side: Side, price: u32) {
        match side {
            Side::Bid => self.best_bid = Some(price),
            Side::Ask => self.best_ask = Some(price),
        }
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    pub fn level(&self, price: u32) -> Option<&PriceLevel> {
        self.levels.get(price as usize)
    }

    #[inline]
    pub(crate) fn level_mut(&mut self, price: u32) -> &mut PriceLevel {
        &mut self.levels[price as usize]
    }

    /// Order count and total size at a tick (zero outside the range).
    pub fn summary(&self, price: u32) -> LevelSummary {
        self.level(price)
            .map(|l| LevelSummary {
                count: l.count,
                total_qty: l.total_qty,
            })
            .unwrap_or_default()
    }

    /// Non-empty levels, lowest price first.
    pub fn occupied_levels(&self) -> impl Iterator<Item = (u32, &PriceLevel)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, level)| !level.is_empty())
            .map(|(price, level)| (price as u32, level))
    }

    /// Validate a computed price against the tick range.
    #[inline]
    pub fn check_price(&self, price: i64) -> Result<u32, SimError> {
        if (0..i64::from(self.price_range())).contains(&price) {
            Ok(price as u32)
        } else {
            Err(SimError::PriceOutOfRange {
                price,
                range: self.price_range(),
            })
        }
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Rest a new order.
    ///
    /// The order is linked per `policy` and extends the best price of its
    /// side when it improves it.
    ///
    /// # Errors
    /// `PriceOutOfRange`, `InvalidQuantity`, `WouldCross` (price at or
    /// through the opposite best), or `PoolExhausted`.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        pool: &mut OrderPool,
        side: Side,
        price: u32,
        qty: u32,
        expires_at: u64,
        owner: Owner,
        policy: TieBreak,
    ) -> Result<OrderHandle, SimError> {
        let price = self.check_price(i64::from(price))?;
        if qty == 0 {
            return Err(SimError::InvalidQuantity);
        }

        let crosses = match side {
            Side::Bid => self.best_ask.map_or(false, |ask| price >= ask),
            Side::Ask => self.best_bid.map_or(false, |bid| price <= bid),
        };
        if crosses {
            return Err(SimError::WouldCross { side, price });
        }

        let handle = pool.acquire(price, qty, expires_at, owner)?;
        self.levels[price as usize].insert(pool, handle, policy);

        match side {
            Side::Bid => {
                if self.best_bid.map_or(true, |best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Ask => {
                if self.best_ask.map_or(true, |best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }

        Ok(handle)
    }

    /// Mark orders for removal at the next sweep of their level.
    pub fn withdraw(&mut self, pool: &mut OrderPool, handles: &[OrderHandle]) {
        for &handle in handles {
            pool.get_mut(handle).expires_at = WITHDRAWN;
        }
    }

    // ========================================================================
    // Expiration
    // ========================================================================

    /// Remove every order at `price` that has expired as of `now`.
    pub fn sweep_expired<F>(
        &mut self,
        pool: &mut OrderPool,
        price: u32,
        now: u64,
        on_release: F,
    ) -> u32
    where
        F: FnMut(OrderHandle, &OrderNode),
    {
        match self.levels.get_mut(price as usize) {
            Some(level) if !level.is_empty() => level.sweep_expired(pool, now, on_release),
            _ => 0,
        }
    }

    /// Sweep every level as of `now`. Does not touch bid/ask.
    pub fn sweep_all<F>(&mut self, pool: &mut OrderPool, now: u64, mut on_release: F) -> u32
    where
        F: FnMut(OrderHandle, &OrderNode),
    {
        let mut removed = 0;
        for level in self.levels.iter_mut().filter(|l| !l.is_empty()) {
            removed += level.sweep_expired(pool, now, &mut on_release);
        }
        removed
    }

    // ========================================================================
    // Best Price Management
    // ========================================================================

    /// Walk one best-price pointer away from the spread until it reaches a
    /// non-empty level.
    ///
    /// # Errors
    /// `BookCollapse` if the walk runs off the tick range; the pointer is
    /// cleared in that case.
    pub fn settle(&mut self, side: Side) -> Result<u32, SimError> {
        let collapse = SimError::BookCollapse { side };
        let mut price = self.best_price(side).ok_or(collapse)?;

        while self.levels[price as usize].is_empty() {
            let next = match side {
                Side::Bid => price.checked_sub(1),
                Side::Ask => Some(price + 1).filter(|&p| p < self.price_range()),
            };
            match next {
                Some(p) => price = p,
                None => {
                    error!(%side, "every resting order on this side is gone");
                    match side {
                        Side::Bid => self.best_bid = None,
                        Side::Ask => self.best_ask = None,
                    }
                    return Err(collapse);
                }
            }
        }

        self.set_best(side, price);
        Ok(price)
    }

    /// Re-point bid and ask at non-empty levels after removals.
    pub fn refresh_bid_ask(&mut self) -> Result<(), SimError> {
        self.settle(Side::Bid)?;
        self.settle(Side::Ask)?;
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// `N` rows centred on the mid price, highest price first.
    ///
    /// Empty when either best price is unknown.
    pub fn ladder<const N: usize>(&self) -> ArrayVec<LadderRow, N> {
        let mut rows = ArrayVec::new();
        let (Some(bid), Some(ask)) = (self.best_bid, self.best_ask) else {
            return rows;
        };

        let above = (N / 2) as u32;
        let below = N.saturating_sub(1) as u32 - above;
        let mid = (bid + ask) / 2;
        let top = mid.saturating_add(above);
        let bottom = mid.saturating_sub(below);

        for price in (bottom..=top).rev() {
            let side = if price <= bid {
                Some(Side::Bid)
            } else if price >= ask {
                Some(Side::Ask)
            } else {
                None
            };
            let LevelSummary { count, total_qty } = self.summary(price);
            if rows
                .try_push(LadderRow {
                    price,
                    side,
                    count,
                    total_qty,
                })
                .is_err()
            {
                break;
            }
        }
        rows
    }
}
