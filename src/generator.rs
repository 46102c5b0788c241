//! Event Generator - synthetic participant order flow.
//!
//! Participants act independently of each other and of the book's history.
//! Each event is a market or limit order drawn from fixed distributions;
//! events are scheduled on the simulated clock with exponential gaps.

use tracing::{debug, info};

use crate::command::{Owner, Side, StepReport};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::matching::MatchingEngine;
use crate::rng::Prng;

/// Distribution parameters for the synthetic flow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    pub mean_inter_arrival_ns: f64,
    pub mean_market_order_size: f64,
    pub mean_limit_order_size: f64,
    pub mean_limit_order_lifespan_ns: f64,
    pub mean_limit_order_distance: f64,
    pub market_order_probability: f64,
}

impl From<&SimConfig> for FlowParams {
    fn from(config: &SimConfig) -> Self {
        Self {
            mean_inter_arrival_ns: config.mean_inter_arrival_ns,
            mean_market_order_size: config.mean_market_order_size,
            mean_limit_order_size: config.mean_limit_order_size,
            mean_limit_order_lifespan_ns: config.mean_limit_order_lifespan_ns,
            mean_limit_order_distance: config.mean_limit_order_distance,
            market_order_probability: config.market_order_probability,
        }
    }
}

/// Shape of the book laid down before trading starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketShape {
    pub bid_min: u32,
    pub bid_max: u32,
    pub spread_min: u32,
    pub spread_max: u32,
    /// Ticks beyond the best price seeded on each side
    pub depth: u32,
    pub orders_per_level: u32,
}

impl From<&SimConfig> for MarketShape {
    fn from(config: &SimConfig) -> Self {
        Self {
            bid_min: config.initial_bid_min,
            bid_max: config.initial_bid_max,
            spread_min: config.initial_spread_min,
            spread_max: config.initial_spread_max,
            depth: config.seed_depth,
            orders_per_level: config.seed_orders_per_level,
        }
    }
}

/// Draws synthetic orders and keeps the simulated schedule.
#[derive(Clone, Debug)]
pub struct EventGenerator {
    rng: Prng,
    params: FlowParams,
    /// Simulated time of the next synthetic order
    next_event_at: u64,
}

impl EventGenerator {
    pub fn new(seed: u64, params: FlowParams) -> Self {
        Self {
            rng: Prng::new(seed),
            params,
            next_event_at: 0,
        }
    }

    #[inline]
    pub fn next_event_at(&self) -> u64 {
        self.next_event_at
    }

    #[inline]
    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    /// Lay down an initial two-sided book and start the schedule at `start`.
    ///
    /// Bid and spread are drawn uniformly from the shape's ranges; every
    /// seeded order has the mean market order size so the first market
    /// orders find depth.
    pub fn seed_market(
        &mut self,
        matcher: &mut MatchingEngine,
        shape: &MarketShape,
        start: u64,
    ) -> Result<(), SimError> {
        let bid = self.uniform_in(shape.bid_min, shape.bid_max);
        let spread = self.uniform_in(shape.spread_min, shape.spread_max);
        let ask = bid + spread;
        let qty = self.params.mean_market_order_size as u32;
        let bottom = bid.checked_sub(shape.depth).ok_or(SimError::PriceOutOfRange {
            price: i64::from(bid) - i64::from(shape.depth),
            range: matcher.book.price_range(),
        })?;

        for price in (bottom..=bid).rev() {
            for _ in 0..shape.orders_per_level {
                let expires_at = start.saturating_add(self.lifespan());
                matcher.add_limit_order(Side::Bid, price, qty, expires_at, Owner::System)?;
            }
        }
        for price in ask..=ask + shape.depth {
            for _ in 0..shape.orders_per_level {
                let expires_at = start.saturating_add(self.lifespan());
                matcher.add_limit_order(Side::Ask, price, qty, expires_at, Owner::System)?;
            }
        }

        self.next_event_at = start;
        info!(bid, ask, orders = matcher.order_count(), start, "market seeded");
        Ok(())
    }

    /// Advance the simulation to `target`.
    ///
    /// 1. Fire every synthetic event scheduled at or before `target`, each at
    ///    its own timestamp.
    /// 2. Sweep every tick for orders expired as of `target`.
    /// 3. Re-point bid and ask.
    ///
    /// An event that fails is still consumed: the schedule moves past it
    /// before the error is returned, so a retried step draws the same
    /// sequence as an uninterrupted run.
    pub fn step(&mut self, matcher: &mut MatchingEngine, target: u64) -> Result<StepReport, SimError> {
        let mut report = StepReport::default();

        while self.next_event_at <= target {
            let at = self.next_event_at;
            let fired = self.fire(matcher, at, &mut report);

            let gap = self.rng.exponential(self.params.mean_inter_arrival_ns);
            let next = at.checked_add(gap);
            self.next_event_at = next.unwrap_or(u64::MAX);
            fired?;
            if next.is_none() {
                break;
            }
        }

        report.expired = matcher.sweep_all(target);
        matcher.refresh_bid_ask()?;

        debug!(
            target,
            market = report.market_orders,
            limit = report.limit_orders,
            expired = report.expired,
            resting = matcher.order_count(),
            "step complete"
        );
        Ok(report)
    }

    /// Draw and execute one synthetic order at time `at`.
    fn fire(&mut self, matcher: &mut MatchingEngine, at: u64, report: &mut StepReport) -> Result<(), SimError> {
        if self.rng.bernoulli(self.params.market_order_probability) {
            let qty = saturate(self.rng.exponential(self.params.mean_market_order_size));
            if self.rng.coin() {
                matcher.market_sell(qty, at)?;
            } else {
                matcher.market_buy(qty, at)?;
            }
            report.market_orders += 1;
            return Ok(());
        }

        // Sells are priced off the bid and buys off the ask, so a new order
        // may tighten the spread but never crosses it.
        let side = if self.rng.coin() { Side::Ask } else { Side::Bid };
        let reference = matcher
            .book
            .best_price(side.opposite())
            .ok_or(SimError::BookCollapse { side: side.opposite() })?;
        let offset = i64::try_from(self.rng.exponential(self.params.mean_limit_order_distance))
            .unwrap_or(i64::MAX);
        let price = match side {
            Side::Ask => i64::from(reference).saturating_add(offset),
            Side::Bid => i64::from(reference).saturating_sub(offset),
        };
        let price = matcher.book.check_price(price)?;

        let qty = saturate(self.rng.exponential(self.params.mean_limit_order_size));
        let expires_at = at.saturating_add(self.lifespan());
        matcher.add_limit_order(side, price, qty, expires_at, Owner::System)?;
        report.limit_orders += 1;
        Ok(())
    }

    #[inline]
    fn lifespan(&mut self) -> u64 {
        self.rng.exponential(self.params.mean_limit_order_lifespan_ns)
    }

    /// Uniform integer in `[lo, hi]`.
    fn uniform_in(&mut self, lo: u32, hi: u32) -> u32 {
        let width = f64::from(hi - lo + 1);
        let drawn = (self.rng.uniform() * width) as u32;
        lo + drawn.min(hi - lo)
    }
}

#[inline]
fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
