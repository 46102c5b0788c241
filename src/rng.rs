//! Deterministic random source for the synthetic order flow.
//!
//! Backed by ChaCha8, whose output stream is fixed for a given seed on every
//! platform. All random quantities in the simulator come from
//! [`Prng::exponential`], [`Prng::coin`] and [`Prng::bernoulli`].

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// 2^-53, the spacing of the 53-bit uniform grid.
const UNIT: f64 = 1.0 / (1u64 << 53) as f64;

/// Seeded 64-bit generator.
#[derive(Clone, Debug)]
pub struct Prng {
    inner: ChaCha8Rng,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Uniform float in `(0, 1]`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        ((self.next() >> 11) + 1) as f64 * UNIT
    }

    /// Exponentially distributed positive integer with the given mean.
    ///
    /// Computed as `ceil(-mean * ln(u))`, clamped to at least 1.
    #[inline]
    pub fn exponential(&mut self, mean: f64) -> u64 {
        let y = -mean * self.uniform().ln();
        (y.ceil() as u64).max(1)
    }

    /// Equiprobable choice.
    #[inline]
    pub fn coin(&mut self) -> bool {
        self.next() & 1 == 1
    }

    /// True with probability `p`.
    #[inline]
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.uniform() < p
    }
}
