//! Arithmetic and logic on resolved operand values.
//!
//! Everything here is width-aware and pure: the caller reads operands into
//! [`Value`]s, calls [`apply`] or [`compare`], and writes the result back.

use crate::cpu::decode::AluOp;
use crate::cpu::registers::width_mask;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// A value read through an operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Unsigned integer `width` bytes wide.
    Int { bits: u32, width: u8 },
    /// IEEE-754 single.
    Float(f32),
}

impl Value {
    pub fn int(bits: u32, width: u8) -> Self {
        Value::Int {
            bits: bits & width_mask(width),
            width,
        }
    }

    /// Raw bit pattern (floats give their IEEE-754 bits).
    pub fn raw_bits(self) -> u32 {
        match self {
            Value::Int { bits, .. } => bits,
            Value::Float(f) => f.to_bits(),
        }
    }

    /// Numeric value as an unsigned integer. Floats truncate toward zero and
    /// wrap to 32 bits.
    pub fn to_uint(self) -> u32 {
        match self {
            Value::Int { bits, .. } => bits,
            Value::Float(f) => f as i64 as u32,
        }
    }

    /// Numeric value as a float; integers are taken as unsigned.
    pub fn to_f32(self) -> f32 {
        match self {
            Value::Int { bits, .. } => bits as f32,
            Value::Float(f) => f,
        }
    }

    /// Two's complement value of an integer at its own width.
    pub fn to_signed(self) -> i64 {
        match self {
            Value::Int { bits, width } => {
                let shift = 64 - width as u32 * 8;
                ((bits as i64) << shift) >> shift
            }
            Value::Float(f) => f as i64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Value::Float(_))
    }
}

/// Errors raised by ALU operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AluError {
    #[error("division by zero")]
    DivisionByZero,
}

/// Apply `op` with `dest` as the left operand. The result keeps the kind and
/// width of `dest`.
pub fn apply(op: AluOp, dest: Value, src: Value) -> Result<Value, AluError> {
    match dest {
        Value::Int { bits, width } => {
            let mask = width_mask(width);
            let n = src.to_uint() & mask;
            let result = match op {
                AluOp::Ld => n,
                AluOp::Add => bits.wrapping_add(n),
                AluOp::Sub => bits.wrapping_sub(n),
                AluOp::Mul => bits.wrapping_mul(n),
                AluOp::Div => {
                    if n == 0 {
                        return Err(AluError::DivisionByZero);
                    }
                    bits / n
                }
                AluOp::And => bits & src.raw_bits(),
                AluOp::Or => bits | src.raw_bits(),
                AluOp::Xor => bits ^ src.raw_bits(),
                AluOp::Rl => rotate_left(bits, width, src.to_uint()),
                AluOp::Rr => rotate_right(bits, width, src.to_uint()),
            };
            Ok(Value::int(result, width))
        }
        Value::Float(f) => {
            let result = match op {
                AluOp::Ld => src.to_f32(),
                AluOp::Add => f + src.to_f32(),
                AluOp::Sub => f - src.to_f32(),
                AluOp::Mul => f * src.to_f32(),
                AluOp::Div => f / src.to_f32(),
                AluOp::And => f32::from_bits(f.to_bits() & src.raw_bits()),
                AluOp::Or => f32::from_bits(f.to_bits() | src.raw_bits()),
                AluOp::Xor => f32::from_bits(f.to_bits() ^ src.raw_bits()),
                AluOp::Rl => f32::from_bits(f.to_bits().rotate_left(src.to_uint() % 32)),
                AluOp::Rr => f32::from_bits(f.to_bits().rotate_right(src.to_uint() % 32)),
            };
            Ok(Value::Float(result))
        }
    }
}

/// Rotate the low `width` bytes of `bits` left; the amount is taken modulo
/// the bit width.
pub fn rotate_left(bits: u32, width: u8, amount: u32) -> u32 {
    let size = width as u32 * 8;
    let n = amount % size;
    let value = (bits & width_mask(width)) as u64;
    (((value << n) | (value >> (size - n))) as u32) & width_mask(width)
}

pub fn rotate_right(bits: u32, width: u8, amount: u32) -> u32 {
    let size = width as u32 * 8;
    rotate_left(bits, width, size - amount % size)
}

/// Signed comparison of two values. If either side is a float both are
/// compared as floats; `None` means the comparison was unordered (NaN).
pub fn compare(lhs: Value, rhs: Value) -> Option<Ordering> {
    if lhs.is_float() || rhs.is_float() {
        signed_f32(lhs).partial_cmp(&signed_f32(rhs))
    } else {
        Some(lhs.to_signed().cmp(&rhs.to_signed()))
    }
}

fn signed_f32(value: Value) -> f32 {
    match value {
        Value::Float(f) => f,
        int => int.to_signed() as f32,
    }
}

/// Apply a bytewise operation of a tile onto a chunk of memory.
pub fn apply_bytes(op: AluOp, chunk: &mut [u8], tile: &[u8]) {
    for (byte, &t) in chunk.iter_mut().zip(tile) {
        *byte = match op {
            AluOp::And => *byte & t,
            AluOp::Or => *byte | t,
            AluOp::Xor => *byte ^ t,
            _ => t,
        };
    }
}

/// Read up to four bytes as a little-endian integer.
pub fn le_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

/// Write the low `out.len()` bytes of `value` little-endian.
pub fn write_le(out: &mut [u8], value: u32) {
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (value >> (i * 8)) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_and_register_widths() {
        let dest = Value::int(0xFFFF, 2);
        let result = apply(AluOp::And, dest, Value::int(0x1234, 2)).unwrap();
        assert_eq!(result, Value::int(0x1234, 2));
    }

    #[test]
    fn test_and_float_raw_bits() {
        // Integer destination takes the float's bit pattern
        let result = apply(AluOp::And, Value::int(u32::MAX, 4), Value::Float(1.0)).unwrap();
        assert_eq!(result.raw_bits(), 1.0f32.to_bits());

        // Float destination is masked bitwise
        let result = apply(AluOp::And, Value::Float(-2.5), Value::int(0x7FFF_FFFF, 4)).unwrap();
        assert_eq!(result, Value::Float(2.5));
    }

    #[test]
    fn test_mul_float_into_int_truncates() {
        let result = apply(AluOp::Mul, Value::int(3, 1), Value::Float(2.9)).unwrap();
        assert_eq!(result, Value::int(6, 1));

        let result = apply(AluOp::Mul, Value::Float(1.5), Value::int(4, 1)).unwrap();
        assert_eq!(result, Value::Float(6.0));
    }

    #[test]
    fn test_rotate() {
        assert_eq!(rotate_left(0x81, 1, 1), 0x03);
        assert_eq!(rotate_right(0x81, 1, 1), 0xC0);
        assert_eq!(rotate_left(0x80_0001, 3, 4), 0x00_0018);
        assert_eq!(rotate_left(0x8000_0000, 4, 1), 1);
        assert_eq!(rotate_left(0x12, 1, 0), 0x12);
    }

    #[test]
    fn test_float_rotate_uses_bits() {
        let result = apply(AluOp::Rl, Value::Float(1.0), Value::int(1, 1)).unwrap();
        assert_eq!(result.raw_bits(), 1.0f32.to_bits().rotate_left(1));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            apply(AluOp::Div, Value::int(10, 1), Value::int(0, 1)),
            Err(AluError::DivisionByZero)
        );
        // Float division follows IEEE
        let result = apply(AluOp::Div, Value::Float(1.0), Value::int(0, 1)).unwrap();
        assert_eq!(result, Value::Float(f32::INFINITY));
    }

    #[test]
    fn test_compare_signed() {
        assert_eq!(compare(Value::int(0xFF, 1), Value::int(1, 1)), Some(Ordering::Less));
        assert_eq!(compare(Value::int(0x7F, 1), Value::int(0x80, 1)), Some(Ordering::Greater));
        assert_eq!(compare(Value::int(2, 2), Value::Float(2.0)), Some(Ordering::Equal));
        assert_eq!(compare(Value::Float(f32::NAN), Value::Float(1.0)), None);
    }

    #[test]
    fn test_little_endian_helpers() {
        assert_eq!(le_value(&[0x34, 0x12]), 0x1234);
        let mut out = [0u8; 3];
        write_le(&mut out, 0x00AB_CDEF);
        assert_eq!(out, [0xEF, 0xCD, 0xAB]);
    }

    proptest! {
        #[test]
        fn prop_and_zero_and_ones(width in 1u8..=4, bits: u32) {
            let dest = Value::int(bits, width);
            let zero = apply(AluOp::And, dest, Value::int(0, width)).unwrap();
            prop_assert_eq!(zero.raw_bits(), 0);

            let ones = apply(AluOp::And, dest, Value::int(u32::MAX, width)).unwrap();
            prop_assert_eq!(ones, dest);
        }

        #[test]
        fn prop_mul_wraps(width in 1u8..=4, a: u32, b: u32) {
            let mask = width_mask(width) as u64;
            let (a, b) = (a & mask as u32, b & mask as u32);
            let result = apply(AluOp::Mul, Value::int(a, width), Value::int(b, width)).unwrap();
            prop_assert_eq!(result.raw_bits() as u64, (a as u64 * b as u64) % (mask + 1));
        }

        #[test]
        fn prop_rotate_amount_masked(width in 1u8..=4, bits: u32, amount in 0u32..256) {
            let size = width as u32 * 8;
            let dest = Value::int(bits, width);
            let full = apply(AluOp::Rl, dest, Value::int(amount, 4)).unwrap();
            let masked = apply(AluOp::Rl, dest, Value::int(amount % size, 4)).unwrap();
            prop_assert_eq!(full, masked);
        }

        #[test]
        fn prop_compare_flags_consistent(a: i32, b: i32) {
            let ord = compare(Value::int(a as u32, 4), Value::int(b as u32, 4));
            prop_assert_eq!(ord, Some(a.cmp(&b)));
        }
    }
}
