//! Determinism Test - Golden Master verification.
//!
//! Verifies that the simulator produces identical results across runs
//! when given the same seed and the same user command sequence.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tick_sim::{Command, Engine, Outcome, SimConfig, SimError};

const FRAME_NS: u64 = 16_000_000;

fn config(seed: u64) -> SimConfig {
    SimConfig {
        pool_capacity: 100_000,
        price_range: 10_000,
        seed,
        ..SimConfig::default()
    }
}

/// Generate a deterministic sequence of user commands interleaved with steps
fn generate_commands(seed: u64, frames: u64) -> Vec<Command> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut commands = Vec::new();

    for frame in 1..=frames {
        if rng.gen_bool(0.1) {
            let qty = rng.gen_range(1..20);
            commands.push(match rng.gen_range(0..5) {
                0 => Command::MarketBuy { qty },
                1 => Command::MarketSell { qty },
                2 => Command::LimitBuy { qty },
                3 => Command::LimitSell { qty },
                _ => Command::WithdrawAll,
            });
        }
        commands.push(Command::Step { until: frame * FRAME_NS });
    }

    commands
}

/// Hash every outcome in order
fn hash_outcomes(outcomes: &[Result<Outcome, SimError>]) -> u64 {
    let mut hasher = DefaultHasher::new();

    for outcome in outcomes {
        match outcome {
            Ok(Outcome::Executed { notional }) => {
                "Executed".hash(&mut hasher);
                notional.hash(&mut hasher);
            }
            Ok(Outcome::Rested { price }) => {
                "Rested".hash(&mut hasher);
                price.hash(&mut hasher);
            }
            Ok(Outcome::Withdrawn { count }) => {
                "Withdrawn".hash(&mut hasher);
                count.hash(&mut hasher);
            }
            Ok(Outcome::Stepped(report)) => {
                "Stepped".hash(&mut hasher);
                report.market_orders.hash(&mut hasher);
                report.limit_orders.hash(&mut hasher);
                report.expired.hash(&mut hasher);
            }
            Err(err) => {
                "Rejected".hash(&mut hasher);
                err.to_string().hash(&mut hasher);
            }
        }
    }

    hasher.finish()
}

/// Run a seeded engine over a command sequence and return hashes
fn run_engine(seed: u64, commands: &[Command]) -> (u64, u64) {
    let mut engine = Engine::new(config(seed)).unwrap();
    engine.seed_market(0).unwrap();

    let mut outcomes = Vec::with_capacity(commands.len());
    for cmd in commands {
        let outcome = engine.process_command(*cmd);
        let collapsed = matches!(&outcome, Err(err) if err.is_collapse());
        outcomes.push(outcome);
        if collapsed {
            break;
        }
    }

    (hash_outcomes(&outcomes), engine.state_hash())
}

#[test]
fn test_determinism_small() {
    const SEED: u64 = 0xDEADBEEF;
    const FRAMES: u64 = 1_000;
    const RUNS: usize = 5;

    let commands = generate_commands(SEED, FRAMES);

    // Run multiple times and verify identical results
    let (first_outcome_hash, first_state_hash) = run_engine(SEED, &commands);

    for run in 1..RUNS {
        let (outcome_hash, state_hash) = run_engine(SEED, &commands);

        assert_eq!(outcome_hash, first_outcome_hash, "Outcome hash mismatch on run {}", run);
        assert_eq!(state_hash, first_state_hash, "State hash mismatch on run {}", run);
    }

    println!("Determinism test passed!");
    println!("  Commands: {}", commands.len());
    println!("  Runs: {}", RUNS);
    println!("  Outcome hash: {:#018x}", first_outcome_hash);
    println!("  State hash: {:#018x}", first_state_hash);
}

#[test]
fn test_determinism_large() {
    const SEED: u64 = 0xCAFEBABE;
    const FRAMES: u64 = 20_000;

    let commands = generate_commands(SEED, FRAMES);

    let first = run_engine(SEED, &commands);
    let second = run_engine(SEED, &commands);

    assert_eq!(first, second);
}

#[test]
fn test_queries_match_step_by_step() {
    let commands = generate_commands(7, 500);
    let mut a = Engine::new(config(7)).unwrap();
    let mut b = Engine::new(config(7)).unwrap();
    a.seed_market(0).unwrap();
    b.seed_market(0).unwrap();

    for cmd in &commands {
        assert_eq!(a.process_command(*cmd), b.process_command(*cmd));
        assert_eq!(a.current_bid(), b.current_bid());
        assert_eq!(a.current_ask(), b.current_ask());
        assert_eq!(a.ledger(), b.ledger());
        assert_eq!(a.user_outstanding_orders(), b.user_outstanding_orders());
        if let (Some(bid), Some(ask)) = (a.current_bid(), a.current_ask()) {
            assert_eq!(a.price_level_summary(bid), b.price_level_summary(bid));
            assert_eq!(a.price_level_summary(ask), b.price_level_summary(ask));
        }
    }
    assert_eq!(a.state_hash(), b.state_hash());
}

#[test]
fn test_different_seeds_produce_different_results() {
    let commands = generate_commands(1, 1_000);

    let (_, hash1) = run_engine(1, &commands);
    let (_, hash2) = run_engine(2, &commands);

    assert_ne!(hash1, hash2, "Different seeds should produce different results");
}
