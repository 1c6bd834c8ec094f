//! Float register bank.
//!
//! Sixteen IEEE-754 single precision slots, `F0` to `F15`. They share no
//! storage with the byte registers; instructions that want the bit pattern
//! go through [`FloatRegisters::get_bits`].

use crate::cpu::random::Prng;
use serde::{Deserialize, Serialize};

/// Number of float registers.
pub const FLOAT_REGISTER_COUNT: usize = 16;

/// Seed the float sequence starts from after a reset.
const DEFAULT_FLOAT_SEED: u64 = 0x0C93_F10A;

/// The float register bank and its random sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatRegisters {
    regs: [f32; FLOAT_REGISTER_COUNT],
    rng: Prng,
}

impl FloatRegisters {
    pub fn new() -> Self {
        Self {
            regs: [0.0; FLOAT_REGISTER_COUNT],
            rng: Prng::new(DEFAULT_FLOAT_SEED),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// # Panics
    /// Panics if `index` is not below [`FLOAT_REGISTER_COUNT`].
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.regs[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: f32) {
        self.regs[index] = value;
    }

    /// Raw IEEE-754 bits of a slot.
    #[inline]
    pub fn get_bits(&self, index: usize) -> u32 {
        self.regs[index].to_bits()
    }

    /// Store a raw bit pattern into a slot.
    #[inline]
    pub fn set_bits(&mut self, index: usize, bits: u32) {
        self.regs[index] = f32::from_bits(bits);
    }

    /// Next float in `[0, 1)`, restarting the sequence first when seeded.
    pub fn next_random(&mut self, seed: Option<u32>) -> f32 {
        if let Some(seed) = seed {
            self.rng.reseed(seed as u64);
        }
        self.rng.next_unit_f32()
    }

    pub fn values(&self) -> &[f32; FLOAT_REGISTER_COUNT] {
        &self.regs
    }
}

impl Default for FloatRegisters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip() {
        let mut fregs = FloatRegisters::new();
        fregs.set(3, -1.5);
        assert_eq!(fregs.get_bits(3), (-1.5f32).to_bits());

        fregs.set_bits(4, 0x3F80_0000);
        assert_eq!(fregs.get(4), 1.0);
    }

    #[test]
    fn test_seeded_random_repeats() {
        let mut a = FloatRegisters::new();
        let mut b = FloatRegisters::new();
        b.next_random(None);

        let x = a.next_random(Some(0x043A_7FD1));
        let y = b.next_random(Some(0x043A_7FD1));
        assert_eq!(x, y);
        assert_ne!(x, a.next_random(Some(0x1234_5678)));
    }

    #[test]
    fn test_unseeded_continues_sequence() {
        let mut a = FloatRegisters::new();
        let mut b = FloatRegisters::new();

        a.next_random(Some(42));
        b.next_random(Some(42));
        assert_eq!(a.next_random(None), b.next_random(None));
    }
}
