//! Command and view types for the simulator.
//!
//! Commands are inputs from the (external) presentation layer.
//! Views are read-only snapshots handed back to it.

use std::fmt;

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => f.write_str("bid"),
            Side::Ask => f.write_str("ask"),
        }
    }
}

/// Who placed a resting order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Owner {
    /// Synthetic participant flow
    #[default]
    System = 0,
    /// The interactive user; fills are booked to the ledger
    User = 1,
}

impl Owner {
    #[inline]
    pub const fn is_user(self) -> bool {
        matches!(self, Owner::User)
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// Commands accepted from the presentation layer.
///
/// Sizes are share counts. Limit orders rest at the current best price of
/// their side and never expire on their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Buy `qty` shares against the asks
    MarketBuy { qty: u32 },
    /// Sell `qty` shares against the bids
    MarketSell { qty: u32 },
    /// Rest a buy of `qty` shares at the bid
    LimitBuy { qty: u32 },
    /// Rest a sell of `qty` shares at the ask
    LimitSell { qty: u32 },
    /// Withdraw every outstanding user order
    WithdrawAll,
    /// Advance the simulation clock to `until` (nanoseconds)
    Step { until: u64 },
}

// ============================================================================
// Outcomes and Views
// ============================================================================

/// Result of a successfully processed [`Command`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Market order executed for this total notional
    Executed { notional: u64 },
    /// Limit order resting at this price
    Rested { price: u32 },
    /// This many user orders were marked for removal
    Withdrawn { count: usize },
    /// Clock advanced
    Stepped(StepReport),
}

/// Summary of one call to `step`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Synthetic market orders executed
    pub market_orders: u32,
    /// Synthetic limit orders placed
    pub limit_orders: u32,
    /// Orders removed by the end-of-step sweep
    pub expired: u32,
}

/// Aggregate of one price level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LevelSummary {
    /// Number of resting orders
    pub count: u32,
    /// Sum of their remaining sizes
    pub total_qty: u64,
}

/// One outstanding user order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserOrderView {
    pub price: u32,
    pub qty: u32,
}

/// One row of the price ladder around the mid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LadderRow {
    pub price: u32,
    /// `Some(Bid)` at or below the bid, `Some(Ask)` at or above the ask
    pub side: Option<Side>,
    pub count: u32,
    pub total_qty: u64,
}
