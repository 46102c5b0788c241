//! # Tick-Sim
//!
//! A deterministic continuous double-auction limit order book simulator.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One caller owns the book exclusively (no locks)
//! - **Arena Allocation**: Orders live in a fixed pool; links are 32-bit handles
//! - **Dense Prices**: One level per tick, addressed directly by price
//! - **Lazy Removal**: Expired and withdrawn orders leave at the next sweep
//! - **Reproducible**: One seeded generator drives all synthetic flow
//!
//! ## Architecture
//!
//! ```text
//! [User Commands] --> [Engine] --> [MatchingEngine] --> [OrderBook + OrderPool]
//!                        |                |
//!                 [EventGenerator]  [AccountLedger]
//! ```

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod matching;
pub mod order_book;
pub mod pool;
pub mod price_level;
pub mod rng;

// Re-exports for convenience
pub use command::{
    Command, LadderRow, LevelSummary, Outcome, Owner, Side, StepReport, UserOrderView,
};
pub use config::{SimConfig, TieBreak};
pub use engine::Engine;
pub use error::{ConfigError, IntegrityError, SimError};
pub use generator::{EventGenerator, FlowParams, MarketShape};
pub use ledger::{AccountLedger, Fill};
pub use matching::{MatchingEngine, UserOrders};
pub use order_book::OrderBook;
pub use pool::{OrderHandle, OrderNode, OrderPool, NEVER, NULL_HANDLE, WITHDRAWN};
pub use price_level::PriceLevel;
pub use rng::Prng;
