//! Continuum93 memory controller.
//!
//! A flat byte array addressed with 24-bit addresses (16 MiB by default).
//! Multi-byte values are stored big-endian, the same order the register file
//! uses, so `set32` followed by `get8` at the same address returns the most
//! significant byte.
//!
//! Every access is bounds-checked: touching a byte outside the array is a
//! [`MemoryError::AddressOutOfRange`] rather than a silent wrap.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default RAM size: the whole 24-bit address space.
pub const MEMORY_SIZE: usize = 1 << 24;

/// Mask applied to computed effective addresses.
pub const ADDRESS_MASK: u32 = 0x00FF_FFFF;

/// Continuum93 RAM.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Create a zeroed memory of the default size.
    pub fn new() -> Self {
        Self::with_size(MEMORY_SIZE)
    }

    /// Create a zeroed memory of `size` bytes.
    pub fn with_size(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Validate that `len` bytes starting at `addr` are inside memory.
    fn range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(MemoryError::AddressOutOfRange {
                addr,
                len,
                size: self.bytes.len(),
            }),
        }
    }

    /// Read `width` bytes (1-4) as a big-endian unsigned value.
    pub fn get_uint(&self, addr: u32, width: u8) -> Result<u32, MemoryError> {
        let range = self.range(addr, width as usize)?;
        Ok(self.bytes[range]
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Write the low `width` bytes (1-4) of `value` big-endian.
    pub fn set_uint(&mut self, addr: u32, width: u8, value: u32) -> Result<(), MemoryError> {
        let range = self.range(addr, width as usize)?;
        let be = value.to_be_bytes();
        self.bytes[range].copy_from_slice(&be[4 - width as usize..]);
        Ok(())
    }

    #[inline]
    pub fn get8(&self, addr: u32) -> Result<u8, MemoryError> {
        Ok(self.get_uint(addr, 1)? as u8)
    }

    #[inline]
    pub fn get16(&self, addr: u32) -> Result<u16, MemoryError> {
        Ok(self.get_uint(addr, 2)? as u16)
    }

    #[inline]
    pub fn get24(&self, addr: u32) -> Result<u32, MemoryError> {
        self.get_uint(addr, 3)
    }

    #[inline]
    pub fn get32(&self, addr: u32) -> Result<u32, MemoryError> {
        self.get_uint(addr, 4)
    }

    #[inline]
    pub fn set8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.set_uint(addr, 1, value as u32)
    }

    #[inline]
    pub fn set16(&mut self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.set_uint(addr, 2, value as u32)
    }

    /// Write the low 24 bits of `value`.
    #[inline]
    pub fn set24(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.set_uint(addr, 3, value)
    }

    #[inline]
    pub fn set32(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.set_uint(addr, 4, value)
    }

    /// Read an IEEE-754 float stored as its big-endian bit pattern.
    pub fn get_float(&self, addr: u32) -> Result<f32, MemoryError> {
        Ok(f32::from_bits(self.get32(addr)?))
    }

    pub fn set_float(&mut self, addr: u32, value: f32) -> Result<(), MemoryError> {
        self.set32(addr, value.to_bits())
    }

    /// Borrow `len` bytes starting at `addr`.
    pub fn get_memory_at(&self, addr: u32, len: usize) -> Result<&[u8], MemoryError> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes[range])
    }

    /// Copy `data` into memory starting at `addr`.
    pub fn set_memory_at(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Every byte from `addr` to the end of memory.
    pub fn tail(&self, addr: u32) -> Result<&[u8], MemoryError> {
        let start = addr as usize;
        if start >= self.bytes.len() {
            return Err(MemoryError::AddressOutOfRange {
                addr,
                len: 1,
                size: self.bytes.len(),
            });
        }
        Ok(&self.bytes[start..])
    }

    /// Load a program image at `addr`.
    pub fn load_at(&mut self, addr: u32, program: &[u8]) -> Result<(), MemoryError> {
        let available = self.bytes.len().saturating_sub(addr as usize);
        if program.len() > available {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available,
            });
        }
        self.set_memory_at(addr, program)
    }

    /// Zero all memory.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Rows of 16 bytes starting at `start` (for debugging views).
    pub fn dump(&self, start: u32, rows: usize) -> Vec<(u32, &[u8])> {
        let start = (start as usize).min(self.bytes.len()) & !0xF;
        self.bytes[start..]
            .chunks(16)
            .take(rows)
            .enumerate()
            .map(|(i, row)| ((start + i * 16) as u32, row))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero bytes
        let non_zero = self.bytes.iter().filter(|&&b| b != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_bytes", &non_zero)
            .field("total_bytes", &self.bytes.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("address 0x{addr:06X} (+{len}) out of range for {size} bytes of memory")]
    AddressOutOfRange { addr: u32, len: usize, size: usize },

    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::with_size(256);
        mem.set8(10, 42).unwrap();
        assert_eq!(mem.get8(10).unwrap(), 42);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut mem = Memory::with_size(256);
        mem.set32(0x10, 0x1122_3344).unwrap();

        assert_eq!(mem.get8(0x10).unwrap(), 0x11);
        assert_eq!(mem.get8(0x13).unwrap(), 0x44);
        assert_eq!(mem.get16(0x11).unwrap(), 0x2233);
        assert_eq!(mem.get24(0x10).unwrap(), 0x11_2233);
        assert_eq!(mem.get_memory_at(0x10, 4).unwrap(), &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_set24_drops_high_byte() {
        let mut mem = Memory::with_size(16);
        mem.set24(0, 0xFFAB_CDEF).unwrap();
        assert_eq!(mem.get_memory_at(0, 4).unwrap(), &[0xAB, 0xCD, 0xEF, 0x00]);
    }

    #[test]
    fn test_float_roundtrip() {
        let mut mem = Memory::with_size(16);
        mem.set_float(4, 3.25).unwrap();
        assert_eq!(mem.get_float(4).unwrap(), 3.25);
        assert_eq!(mem.get32(4).unwrap(), 3.25f32.to_bits());
    }

    #[test]
    fn test_memory_bounds() {
        let mut mem = Memory::with_size(16);

        assert!(mem.get8(15).is_ok());
        assert!(mem.get8(16).is_err());
        // A multi-byte access may not straddle the end
        assert!(mem.get32(13).is_err());
        assert!(mem.set16(15, 0).is_err());
        assert!(mem.get_memory_at(8, 9).is_err());
    }

    #[test]
    fn test_load_program() {
        let mut mem = Memory::with_size(8);
        mem.load_at(2, &[1, 2, 3]).unwrap();
        assert_eq!(mem.get_memory_at(0, 6).unwrap(), &[0, 0, 1, 2, 3, 0]);

        assert_eq!(
            mem.load_at(6, &[1, 2, 3]),
            Err(MemoryError::ProgramTooLarge { size: 3, available: 2 })
        );
    }

    #[test]
    fn test_clear() {
        let mut mem = Memory::with_size(8);
        mem.set32(0, u32::MAX).unwrap();
        mem.clear();
        assert_eq!(mem.get32(0).unwrap(), 0);
    }
}
