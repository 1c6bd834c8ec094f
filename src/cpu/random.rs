//! Pseudorandom source for the `RAND` instruction.
//!
//! A SplitMix64 generator: small, serializable with the rest of the CPU
//! state, and fully determined by its seed.

use rand_core::{impls, Error, OsRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic SplitMix64 generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prng {
    state: u64,
}

impl Prng {
    /// Create a generator from an explicit seed.
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Create a generator from the configured seed, or from OS entropy.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::new(OsRng.next_u64()),
        }
    }

    /// Restart the sequence from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.state = seed;
    }

    /// Uniform value in `[0, bound)`; a zero bound means the full `u32` range.
    pub fn below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            self.next_u32()
        } else {
            (self.next_u64() % bound as u64) as u32
        }
    }

    /// Uniform float in `[0, 1)` built from the top 24 bits of a draw.
    pub fn next_unit_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }
}

impl RngCore for Prng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Prng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Prng::new(0x043A_7FD1);
        let mut b = Prng::seed_from_u64(0x043A_7FD1);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_reseed_restarts() {
        let mut rng = Prng::new(7);
        let first = rng.next_u32();
        rng.next_u32();
        rng.reseed(7);
        assert_eq!(rng.next_u32(), first);
    }

    #[test]
    fn test_below_respects_bound() {
        let mut rng = Prng::new(1);
        for _ in 0..1000 {
            assert!(rng.below(10) < 10);
        }
    }

    #[test]
    fn test_unit_float_range() {
        let mut rng = Prng::new(99);
        for _ in 0..1000 {
            let f = rng.next_unit_f32();
            assert!((0.0..1.0).contains(&f));
        }
    }
}
