//! Account Ledger - the user's running balance and position.
//!
//! Amounts are booked in the direction of the aggressing market order: a
//! buy debits the balance and adds shares, a sell credits the balance and
//! removes shares.

use crate::command::Side;

/// One execution against a resting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fill {
    /// Tick the resting order sat at
    pub price: u32,
    /// Shares exchanged
    pub qty: u32,
    /// Side of the market order that took liquidity
    pub aggressor: Side,
}

impl Fill {
    #[inline]
    pub const fn notional(&self) -> u64 {
        self.price as u64 * self.qty as u64
    }
}

/// Signed balance (ticks x shares) and position (shares).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccountLedger {
    balance: i64,
    position: i64,
}

impl AccountLedger {
    pub const fn new() -> Self {
        Self {
            balance: 0,
            position: 0,
        }
    }

    #[inline]
    pub const fn balance(&self) -> i64 {
        self.balance
    }

    #[inline]
    pub const fn position(&self) -> i64 {
        self.position
    }

    /// Book a fill against one of the user's resting orders.
    #[inline]
    pub fn record_fill(&mut self, fill: &Fill) {
        self.book(fill.aggressor, fill.qty, fill.notional());
    }

    /// Book a market order the user submitted directly.
    #[inline]
    pub fn record_market_order(&mut self, side: Side, qty: u32, notional: u64) {
        self.book(side, qty, notional);
    }

    fn book(&mut self, side: Side, qty: u32, notional: u64) {
        let notional = notional as i64;
        let qty = i64::from(qty);
        match side {
            Side::Bid => {
                self.balance -= notional;
                self.position += qty;
            }
            Side::Ask => {
                self.balance += notional;
                self.position -= qty;
            }
        }
    }
}
