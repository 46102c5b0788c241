//! Simulation configuration.
//!
//! Every option has a default, so a config file only needs the fields it
//! changes. Timing values are nanoseconds; prices are ticks.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where a new order joins the queue at its price.
///
/// Fills always start from the head of the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// New arrivals go to the head and fill first (LIFO)
    HeadInsert,
    /// New arrivals go to the tail and fill last (FIFO)
    #[default]
    TailInsert,
}

/// Construction-time options for [`Engine`](crate::Engine).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Maximum number of live orders
    pub pool_capacity: u32,
    /// Number of discrete price ticks; valid prices are `0..price_range`
    pub price_range: u32,
    /// Mean gap between synthetic orders
    pub mean_inter_arrival_ns: f64,
    pub mean_market_order_size: f64,
    pub mean_limit_order_size: f64,
    pub mean_limit_order_lifespan_ns: f64,
    /// Mean distance in ticks from the opposite best price
    pub mean_limit_order_distance: f64,
    /// Probability that a synthetic order is a market order
    pub market_order_probability: f64,
    pub tie_break: TieBreak,
    pub seed: u64,
    /// Capacity of the outstanding user order list
    pub max_user_orders: usize,

    // Initial market shape
    pub initial_bid_min: u32,
    pub initial_bid_max: u32,
    pub initial_spread_min: u32,
    pub initial_spread_max: u32,
    /// Ticks seeded beyond the best price on each side
    pub seed_depth: u32,
    pub seed_orders_per_level: u32,

    /// When false, user market orders are booked at the best price without
    /// consuming liquidity
    pub realistic_user_market_orders: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 1_000_000,
            price_range: 100_000,
            mean_inter_arrival_ns: 0.2e9,
            mean_market_order_size: 8.0,
            mean_limit_order_size: 10.0,
            mean_limit_order_lifespan_ns: 100.0e9,
            mean_limit_order_distance: 3.0,
            market_order_probability: 0.5,
            tie_break: TieBreak::TailInsert,
            seed: 0,
            max_user_orders: 100,
            initial_bid_min: 500,
            initial_bid_max: 500,
            initial_spread_min: 1,
            initial_spread_max: 1,
            seed_depth: 10,
            seed_orders_per_level: 10,
            realistic_user_market_orders: true,
        }
    }
}

impl SimConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Check option ranges and the consistency of the initial market shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, reason })
        }
        fn positive_mean(value: f64) -> bool {
            value.is_finite() && value > 0.0
        }

        if self.pool_capacity == 0 || self.pool_capacity == u32::MAX {
            return invalid("pool_capacity", "must be in 1..u32::MAX");
        }
        if self.price_range < 2 {
            return invalid("price_range", "needs at least two ticks");
        }
        if !positive_mean(self.mean_inter_arrival_ns) {
            return invalid("mean_inter_arrival_ns", "must be a positive number");
        }
        if !positive_mean(self.mean_market_order_size) {
            return invalid("mean_market_order_size", "must be a positive number");
        }
        if !positive_mean(self.mean_limit_order_size) {
            return invalid("mean_limit_order_size", "must be a positive number");
        }
        if !positive_mean(self.mean_limit_order_lifespan_ns) {
            return invalid("mean_limit_order_lifespan_ns", "must be a positive number");
        }
        if !positive_mean(self.mean_limit_order_distance) {
            return invalid("mean_limit_order_distance", "must be a positive number");
        }
        if !(0.0..=1.0).contains(&self.market_order_probability) {
            return invalid("market_order_probability", "must be within [0, 1]");
        }
        if self.initial_bid_min > self.initial_bid_max {
            return invalid("initial_bid_min", "exceeds initial_bid_max");
        }
        if self.initial_spread_min == 0 || self.initial_spread_min > self.initial_spread_max {
            return invalid("initial_spread_min", "must be in 1..=initial_spread_max");
        }
        if self.initial_bid_min < self.seed_depth {
            return invalid("seed_depth", "reaches below tick zero");
        }
        let top = u64::from(self.initial_bid_max)
            + u64::from(self.initial_spread_max)
            + u64::from(self.seed_depth);
        if top >= u64::from(self.price_range) {
            return invalid("price_range", "too small for the seeded market");
        }
        if self.seed_orders_per_level == 0 || self.mean_market_order_size < 1.0 {
            return invalid("seed_orders_per_level", "seeded levels would be empty");
        }
        Ok(())
    }
}
