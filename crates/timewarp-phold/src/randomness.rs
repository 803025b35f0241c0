//! Deterministic Randomness
//!
//! Seeded random variates for the PHOLD workload. Every generated event
//! draws from its own stream, derived from the run seed and the event id, so
//! a re-execution after rollback sees exactly the same numbers.

//-----------------------------------------------------------------------------
// Imports
//-----------------------------------------------------------------------------

use rand::prelude::{SeedableRng, StdRng};
use rand::Rng;

/// Mean parameter of the PHOLD timestamp increment
pub const LAMBDA: f64 = 5.0;

/// A wrapper around a seeded PRNG so that runs are reproducible.
#[derive(Debug, Clone)]
pub struct SeededRng {
    rng: StdRng,
    seed: u64,
}

impl SeededRng {
    /// Creates a new RNG instance seeded with the given 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Independent stream `stream` of the run seeded with `seed`.
    pub fn for_stream(seed: u64, stream: u64) -> Self {
        Self::new(mix(seed ^ mix(stream)))
    }

    /// Returns the seed used to initialize this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform integer in `[min, max]`
    pub fn uniform_int(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Uniform float in `(0, 1]`
    pub fn uniform_open(&mut self) -> f64 {
        1.0 - self.rng.gen::<f64>()
    }

    /// Exponential increment `⌊-λ·ln u + 1⌋`, always at least 1.
    pub fn exponential(&mut self, lambda: f64) -> i64 {
        let u = self.uniform_open();
        (-lambda * u.ln() + 1.0) as i64
    }
}

/// splitmix64 finalizer
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
