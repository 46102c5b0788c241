//! Error types for the simulator.
//!
//! Fatal book conditions are returned as values and the caller decides
//! whether to halt. Nothing is retried here.

use thiserror::Error;

use crate::command::Side;

/// Errors raised by book, matching, and generator operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// An order slot was requested while every slot is live.
    #[error("order pool exhausted ({capacity} slots live)")]
    PoolExhausted { capacity: u32 },

    /// One side of the book ran out of resting orders.
    #[error("book collapse: no resting orders left on the {side} side")]
    BookCollapse { side: Side },

    /// A market order filled in full but took the last resting order on
    /// the `side` it traded against. The fills stand.
    #[error("book collapse: {side} side emptied by a market order filled for {notional}")]
    SideExhausted { side: Side, notional: u64 },

    /// A user limit order was submitted while the tracking list is full.
    #[error("user order capacity exceeded ({capacity} outstanding)")]
    UserOrderCapacityExceeded { capacity: usize },

    /// Price falls outside the configured tick range.
    #[error("price {price} outside tick range 0..{range}")]
    PriceOutOfRange { price: i64, range: u32 },

    /// Resting the order would lock or cross the book.
    #[error("{side} order at {price} would cross the book")]
    WouldCross { side: Side, price: u32 },

    /// Order quantity must be positive.
    #[error("order quantity must be positive")]
    InvalidQuantity,

    /// The simulation clock only moves forward.
    #[error("clock regression: now {now}, requested {target}")]
    ClockRegression { now: u64, target: u64 },
}

impl SimError {
    /// True for either form of book collapse.
    #[inline]
    pub const fn is_collapse(&self) -> bool {
        matches!(self, SimError::BookCollapse { .. } | SimError::SideExhausted { .. })
    }
}

/// Errors raised while loading or validating a [`SimConfig`](crate::SimConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Violations reported by [`MatchingEngine::verify_integrity`](crate::MatchingEngine::verify_integrity).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("crossed book: bid {bid} >= ask {ask}")]
    Crossed { bid: u32, ask: u32 },

    #[error("{side} best price missing or pointing at an empty level")]
    EmptyBestLevel { side: Side },

    #[error("slot {handle} reachable from more than one level position")]
    DuplicateLink { handle: u32 },

    #[error("slot {handle} is on the free list but linked into level {price}")]
    FreeSlotLinked { handle: u32, price: u32 },

    #[error("{allocated} slots allocated but {reachable} reachable from levels")]
    LeakedSlots { allocated: u32, reachable: u32 },

    #[error("level {price} cached totals disagree with its list")]
    LevelTotals { price: u32 },

    #[error("slot {handle} stored at level {price} but records price {recorded}")]
    PriceMismatch { handle: u32, price: u32, recorded: u32 },

    #[error("live user order in slot {handle} is not tracked")]
    UntrackedUserOrder { handle: u32 },

    #[error("tracked handle {handle} is not a live user order")]
    StaleTracking { handle: u32 },
}
