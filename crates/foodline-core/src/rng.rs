//! Environment-owned deterministic PRNG.
//!
//! One `SimRng` lives inside the factory and is threaded `&mut` into every
//! malfunction check. Stations never own randomness, so `reset(seed)`
//! reproduces a run exactly. SplitMix64: 8 bytes of state, trivially
//! serializable for snapshots.

use crate::fixed::Fixed64;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
    draws: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed,
            draws: 0,
        }
    }

    /// Restart the sequence from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.state = seed;
        self.draws = 0;
    }

    pub fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `[0, 1)` with 32 fractional bits.
    pub fn next_unit(&mut self) -> Fixed64 {
        let upper = self.next_u64() >> 32;
        Fixed64::from_bits(upper as i64)
    }

    /// Bernoulli draw. `probability <= 0` never fires and consumes no
    /// entropy; `probability >= 1` always fires.
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        // For p in (0,1) the Q32.32 bits are the fraction scaled to [0, 2^32).
        self.next_unit() < probability
    }

    /// Internal state, for hashing.
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Number of values drawn since the last seed.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
