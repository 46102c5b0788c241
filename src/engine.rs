//! Engine - the simulator's outward face.
//!
//! Owns the matching engine and the synthetic flow, keeps the simulated
//! clock, and applies user commands at the current time. Everything is
//! synchronous: one caller mutates the engine at a time.

use arrayvec::ArrayVec;
use tracing::warn;

use crate::command::{
    Command, LadderRow, LevelSummary, Outcome, Owner, Side, StepReport, UserOrderView,
};
use crate::config::SimConfig;
use crate::error::{ConfigError, SimError};
use crate::generator::{EventGenerator, FlowParams, MarketShape};
use crate::ledger::AccountLedger;
use crate::matching::MatchingEngine;
use crate::pool::NEVER;

/// The simulator: book, synthetic flow, and clock.
pub struct Engine {
    /// The underlying matching engine
    pub matcher: MatchingEngine,
    generator: EventGenerator,
    shape: MarketShape,
    /// Time of the last completed step (ns)
    now: u64,
    realistic_user_market_orders: bool,
}

impl Engine {
    /// Create an engine with an empty book.
    ///
    /// Call [`seed_market`](Self::seed_market) before stepping, or rest
    /// orders on both sides through [`matcher`](Self::matcher).
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            matcher: MatchingEngine::from_config(&config),
            generator: EventGenerator::new(config.seed, FlowParams::from(&config)),
            shape: MarketShape::from(&config),
            now: 0,
            realistic_user_market_orders: config.realistic_user_market_orders,
        })
    }

    /// Lay down the initial book and start the clock at `start`.
    pub fn seed_market(&mut self, start: u64) -> Result<(), SimError> {
        self.generator.seed_market(&mut self.matcher, &self.shape, start)?;
        self.now = start;
        Ok(())
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Process a single command.
    ///
    /// This is the main entry point for synchronous usage (testing, benchmarks).
    pub fn process_command(&mut self, cmd: Command) -> Result<Outcome, SimError> {
        match cmd {
            Command::MarketBuy { qty } => self
                .submit_market_buy(qty)
                .map(|notional| Outcome::Executed { notional }),
            Command::MarketSell { qty } => self
                .submit_market_sell(qty)
                .map(|notional| Outcome::Executed { notional }),
            Command::LimitBuy { qty } => self
                .submit_limit_buy(qty)
                .map(|price| Outcome::Rested { price }),
            Command::LimitSell { qty } => self
                .submit_limit_sell(qty)
                .map(|price| Outcome::Rested { price }),
            Command::WithdrawAll => Ok(Outcome::Withdrawn {
                count: self.withdraw_all_user_orders(),
            }),
            Command::Step { until } => self.step(until).map(Outcome::Stepped),
        }
    }

    /// Advance the clock to `target`, running all synthetic flow due by then.
    pub fn step(&mut self, target: u64) -> Result<StepReport, SimError> {
        if target < self.now {
            return Err(SimError::ClockRegression {
                now: self.now,
                target,
            });
        }
        let report = self.generator.step(&mut self.matcher, target)?;
        self.now = target;
        Ok(report)
    }

    /// Buy `qty` shares at market. Returns the notional paid.
    pub fn submit_market_buy(&mut self, qty: u32) -> Result<u64, SimError> {
        self.submit_market(Side::Bid, qty)
    }

    /// Sell `qty` shares at market. Returns the notional received.
    pub fn submit_market_sell(&mut self, qty: u32) -> Result<u64, SimError> {
        self.submit_market(Side::Ask, qty)
    }

    fn submit_market(&mut self, side: Side, qty: u32) -> Result<u64, SimError> {
        let notional = if self.realistic_user_market_orders {
            let executed = match side {
                Side::Bid => self.matcher.market_buy(qty, self.now),
                Side::Ask => self.matcher.market_sell(qty, self.now),
            };
            match executed {
                Ok(notional) => notional,
                Err(err @ SimError::SideExhausted { notional, .. }) => {
                    // Filled in full; book it before reporting the collapse
                    self.matcher.ledger_mut().record_market_order(side, qty, notional);
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        } else {
            if qty == 0 {
                return Err(SimError::InvalidQuantity);
            }
            let maker = side.opposite();
            let price = self
                .matcher
                .book
                .best_price(maker)
                .ok_or(SimError::BookCollapse { side: maker })?;
            u64::from(price) * u64::from(qty)
        };

        self.matcher.ledger_mut().record_market_order(side, qty, notional);
        Ok(notional)
    }

    /// Rest a user buy of `qty` shares at the bid. Returns the price.
    pub fn submit_limit_buy(&mut self, qty: u32) -> Result<u32, SimError> {
        self.submit_limit(Side::Bid, qty)
    }

    /// Rest a user sell of `qty` shares at the ask. Returns the price.
    pub fn submit_limit_sell(&mut self, qty: u32) -> Result<u32, SimError> {
        self.submit_limit(Side::Ask, qty)
    }

    fn submit_limit(&mut self, side: Side, qty: u32) -> Result<u32, SimError> {
        let price = self
            .matcher
            .book
            .best_price(side)
            .ok_or(SimError::BookCollapse { side })?;
        self.matcher
            .add_limit_order(side, price, qty, NEVER, Owner::User)
            .map(|_| price)
    }

    /// Withdraw every outstanding user order; they leave the book at the
    /// next sweep. Returns how many were withdrawn.
    pub fn withdraw_all_user_orders(&mut self) -> usize {
        self.matcher.withdraw_all_user_orders()
    }

    /// Drain queued commands at a step boundary.
    ///
    /// Results are pushed to `output` on a best-effort basis; a full output
    /// ring drops them. Returns the number of commands processed.
    #[cfg(feature = "runtime")]
    pub fn drain(
        &mut self,
        input: &mut rtrb::Consumer<Command>,
        output: &mut rtrb::Producer<Result<Outcome, SimError>>,
    ) -> usize {
        let mut processed = 0;
        while let Ok(cmd) = input.pop() {
            let result = self.process_command(cmd);
            if let Err(err) = &result {
                warn!(?cmd, %err, "queued command failed");
            }
            // Best effort - drop if full
            let _ = output.push(result);
            processed += 1;
        }
        processed
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) {
        match core_affinity::get_core_ids().and_then(|ids| ids.last().copied()) {
            Some(core) => {
                core_affinity::set_for_current(core);
            }
            None => warn!("no core ids available; running unpinned"),
        }
    }

    /// Warm up the engine by pre-faulting memory pages.
    pub fn warm_up(&mut self) {
        self.matcher.warm_up();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    pub fn current_bid(&self) -> Option<u32> {
        self.matcher.best_bid()
    }

    #[inline]
    pub fn current_ask(&self) -> Option<u32> {
        self.matcher.best_ask()
    }

    #[inline]
    pub fn price_level_summary(&self, price: u32) -> LevelSummary {
        self.matcher.price_level_summary(price)
    }

    #[inline]
    pub fn user_outstanding_orders(&self) -> Vec<UserOrderView> {
        self.matcher.user_outstanding_orders()
    }

    #[inline]
    pub fn ledger(&self) -> &AccountLedger {
        self.matcher.ledger()
    }

    /// Simulated time of the last completed step.
    #[inline]
    pub fn now(&self) -> u64 {
        self.now
    }

    #[inline]
    pub fn next_event_at(&self) -> u64 {
        self.generator.next_event_at()
    }

    #[inline]
    pub fn order_count(&self) -> u32 {
        self.matcher.order_count()
    }

    /// `N` ladder rows centred on the mid price, highest first.
    #[inline]
    pub fn ladder<const N: usize>(&self) -> ArrayVec<LadderRow, N> {
        self.matcher.ladder::<N>()
    }

    /// Compute state hash for determinism testing.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.matcher.state_hash()
    }
}
