//! Fuzz Test - Compares the matching engine against a reference implementation.
//!
//! Uses a naive but correct reference book to verify the arena-backed
//! engine produces identical prices, queues, fills, and ledger entries.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};
use tick_sim::{LevelSummary, MatchingEngine, Owner, Side, SimError, TieBreak, UserOrderView, NEVER};

const RANGE: u32 = 1_000;
const USER_CAPACITY: usize = 50;

#[derive(Clone, Copy, Debug)]
struct RefOrder {
    id: u64,
    qty: u32,
    expires_at: u64,
    user: bool,
}

impl RefOrder {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Simple reference implementation for verification
struct ReferenceBook {
    bids: BTreeMap<u32, VecDeque<RefOrder>>,
    asks: BTreeMap<u32, VecDeque<RefOrder>>,
    user_ids: Vec<u64>,
    next_id: u64,
    tie_break: TieBreak,
    balance: i64,
    position: i64,
}

impl ReferenceBook {
    fn new(tie_break: TieBreak) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            user_ids: Vec::new(),
            next_id: 1,
            tie_break,
            balance: 0,
            position: 0,
        }
    }

    fn best_bid(&self) -> Option<u32> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<u32> {
        self.asks.keys().next().copied()
    }

    fn order_count(&self) -> usize {
        self.bids.values().chain(self.asks.values()).map(VecDeque::len).sum()
    }

    fn insert(&mut self, side: Side, price: u32, qty: u32, expires_at: u64, user: bool) {
        let order = RefOrder {
            id: self.next_id,
            qty,
            expires_at,
            user,
        };
        self.next_id += 1;
        if user {
            self.user_ids.push(order.id);
        }

        let levels = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let queue = levels.entry(price).or_default();
        match self.tie_break {
            TieBreak::TailInsert => queue.push_back(order),
            TieBreak::HeadInsert => queue.push_front(order),
        }
    }

    /// Non-expired quantity resting on one side.
    fn live_qty(&self, side: Side, now: u64) -> u64 {
        let levels = match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        };
        levels
            .values()
            .flatten()
            .filter(|o| !o.is_expired(now))
            .map(|o| u64::from(o.qty))
            .sum()
    }

    fn market(&mut self, aggressor: Side, qty: u32, now: u64) -> u64 {
        let maker = match aggressor {
            Side::Bid => &mut self.asks,
            Side::Ask => &mut self.bids,
        };
        let prices: Vec<u32> = match aggressor {
            Side::Bid => maker.keys().copied().collect(),
            Side::Ask => maker.keys().rev().copied().collect(),
        };

        let mut remaining = qty;
        let mut notional = 0u64;
        let mut filled_users = Vec::new();

        for price in prices {
            if remaining == 0 {
                break;
            }
            let queue = maker.get_mut(&price).unwrap();
            queue.retain(|o| !o.is_expired(now));

            while remaining > 0 {
                let Some(front) = queue.front_mut() else {
                    break;
                };
                let traded = front.qty.min(remaining);
                front.qty -= traded;
                remaining -= traded;
                let amount = u64::from(price) * u64::from(traded);
                notional += amount;

                if front.user {
                    match aggressor {
                        Side::Bid => {
                            self.balance -= amount as i64;
                            self.position += i64::from(traded);
                        }
                        Side::Ask => {
                            self.balance += amount as i64;
                            self.position -= i64::from(traded);
                        }
                    }
                }
                if front.qty == 0 {
                    if front.user {
                        filled_users.push(front.id);
                    }
                    queue.pop_front();
                }
            }
        }

        maker.retain(|_, q| !q.is_empty());
        self.user_ids.retain(|id| !filled_users.contains(id));
        assert_eq!(remaining, 0, "reference walked off the book");
        notional
    }

    fn withdraw_all(&mut self) -> usize {
        let ids = std::mem::take(&mut self.user_ids);
        for order in self.bids.values_mut().chain(self.asks.values_mut()).flatten() {
            if ids.contains(&order.id) {
                order.expires_at = 0;
            }
        }
        ids.len()
    }

    fn sweep(&mut self, now: u64) {
        for levels in [&mut self.bids, &mut self.asks] {
            for queue in levels.values_mut() {
                queue.retain(|o| !o.is_expired(now));
            }
            levels.retain(|_, q| !q.is_empty());
        }
    }

    fn summaries(&self) -> impl Iterator<Item = (u32, LevelSummary)> + '_ {
        self.bids.iter().chain(self.asks.iter()).map(|(&price, queue)| {
            let summary = LevelSummary {
                count: queue.len() as u32,
                total_qty: queue.iter().map(|o| u64::from(o.qty)).sum(),
            };
            (price, summary)
        })
    }

    fn user_views(&self) -> Vec<UserOrderView> {
        self.user_ids
            .iter()
            .map(|id| {
                let (price, order) = self
                    .bids
                    .iter()
                    .chain(self.asks.iter())
                    .find_map(|(&price, q)| q.iter().find(|o| o.id == *id).map(|o| (price, *o)))
                    .unwrap();
                UserOrderView { price, qty: order.qty }
            })
            .collect()
    }
}

fn assert_same(engine: &MatchingEngine, reference: &ReferenceBook, step: usize) {
    assert_eq!(engine.best_bid(), reference.best_bid(), "bid at step {}", step);
    assert_eq!(engine.best_ask(), reference.best_ask(), "ask at step {}", step);
    assert_eq!(
        engine.order_count() as usize,
        reference.order_count(),
        "order count at step {}",
        step
    );
    for (price, summary) in reference.summaries() {
        assert_eq!(
            engine.price_level_summary(price),
            summary,
            "level {} at step {}",
            price,
            step
        );
    }
    assert_eq!(engine.ledger().balance(), reference.balance, "balance at step {}", step);
    assert_eq!(engine.ledger().position(), reference.position, "position at step {}", step);
    assert_eq!(engine.user_outstanding_orders(), reference.user_views(), "user orders at step {}", step);
}

fn run_fuzz(seed: u64, steps: usize, tie_break: TieBreak) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut engine = MatchingEngine::new(100_000, RANGE, USER_CAPACITY, tie_break);
    let mut reference = ReferenceBook::new(tie_break);

    // Anchors at the range edges keep both sides alive
    for (side, price, qty) in [
        (Side::Bid, 0, 1),
        (Side::Ask, RANGE - 1, 1),
        (Side::Bid, 400, 50),
        (Side::Ask, 600, 50),
    ] {
        engine.add_limit_order(side, price, qty, NEVER, Owner::System).unwrap();
        reference.insert(side, price, qty, NEVER, false);
    }

    let mut now = 0u64;

    for step in 0..steps {
        now += rng.gen_range(0..5);
        let bid = reference.best_bid().unwrap();
        let ask = reference.best_ask().unwrap();

        match rng.gen_range(0..100) {
            // System or user limit order
            op @ 0..=57 => {
                let user = op >= 50;
                let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
                let (lo, hi) = match side {
                    Side::Bid => (ask.saturating_sub(30).max(1), ask - 1),
                    Side::Ask => (bid + 1, (bid + 30).min(RANGE - 2)),
                };
                if lo > hi {
                    continue;
                }
                let price = rng.gen_range(lo..=hi);
                let qty = rng.gen_range(1..40);
                let (owner, expires_at) = if user {
                    (Owner::User, NEVER)
                } else {
                    (Owner::System, now + rng.gen_range(1..300))
                };

                let result = engine.add_limit_order(side, price, qty, expires_at, owner);
                if user && reference.user_ids.len() == USER_CAPACITY {
                    assert_eq!(
                        result,
                        Err(SimError::UserOrderCapacityExceeded { capacity: USER_CAPACITY })
                    );
                } else {
                    result.unwrap();
                    reference.insert(side, price, qty, expires_at, user);
                }
            }
            // Market order that leaves at least one live share behind
            58..=87 => {
                let aggressor = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
                let live = reference.live_qty(aggressor.opposite(), now);
                if live < 2 {
                    continue;
                }
                let qty = rng.gen_range(1..=(live - 1).min(60) as u32);
                let expected = reference.market(aggressor, qty, now);
                let notional = match aggressor {
                    Side::Bid => engine.market_buy(qty, now),
                    Side::Ask => engine.market_sell(qty, now),
                }
                .unwrap();
                assert_eq!(notional, expected, "notional at step {}", step);
            }
            88..=89 => {
                assert_eq!(engine.withdraw_all_user_orders(), reference.withdraw_all());
            }
            _ => {
                engine.sweep_all(now);
                engine.refresh_bid_ask().unwrap();
                reference.sweep(now);
            }
        }

        assert_same(&engine, &reference, step);
        if step % 1_000 == 0 {
            engine.verify_integrity().unwrap();
        }
    }
}

#[test]
fn test_fuzz_fifo() {
    run_fuzz(0x5EED, 20_000, TieBreak::TailInsert);
}

#[test]
fn test_fuzz_lifo() {
    run_fuzz(0xF00D, 20_000, TieBreak::HeadInsert);
}

#[test]
fn test_fuzz_many_seeds() {
    for seed in 0..20 {
        run_fuzz(seed, 2_000, TieBreak::TailInsert);
    }
}
