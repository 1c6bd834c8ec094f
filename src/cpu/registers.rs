//! Continuum93 general purpose registers.
//!
//! The register file is 26 one-byte cells named `A` through `Z`. Wider
//! registers are views over runs of consecutive cells:
//! - `AB`: 16 bits, `A` is the high byte
//! - `ABC`: 24 bits (wide enough to hold an address)
//! - `ABCD`: 32 bits
//!
//! The cells form a ring, so `YZ`, `ZAB` and `XYZA` are valid too. There is
//! only one backing array; a composite write is visible through every cell
//! it covers and vice versa.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of one-byte register cells.
pub const REGISTER_COUNT: usize = 26;

/// Widest composite register, in bytes.
pub const MAX_REGISTER_WIDTH: u8 = 4;

/// A register operand: `width` consecutive cells starting at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reg {
    index: u8,
    width: u8,
}

impl Reg {
    /// Create a register view, validating the index and width.
    pub fn new(index: u8, width: u8) -> Result<Self, RegisterError> {
        if index as usize >= REGISTER_COUNT {
            return Err(RegisterError::InvalidIndex(index));
        }
        if width == 0 || width > MAX_REGISTER_WIDTH {
            return Err(RegisterError::InvalidWidth(width));
        }
        Ok(Self { index, width })
    }

    /// Index of the first (most significant) cell.
    #[inline]
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Width in bytes (1-4).
    #[inline]
    pub const fn width(&self) -> u8 {
        self.width
    }

    /// Width in bits.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.width as u32 * 8
    }

    /// Mask covering every bit of this register.
    #[inline]
    pub const fn mask(&self) -> u32 {
        width_mask(self.width)
    }

    /// Cell indices covered by this view, most significant first.
    pub fn cells(&self) -> impl Iterator<Item = usize> {
        let start = self.index as usize;
        (0..self.width as usize).map(move |i| (start + i) % REGISTER_COUNT)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in self.cells() {
            write!(f, "{}", (b'A' + cell as u8) as char)?;
        }
        Ok(())
    }
}

impl FromStr for Reg {
    type Err = RegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_REGISTER_WIDTH as usize {
            return Err(RegisterError::UnknownName(s.to_string()));
        }
        if !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(RegisterError::UnknownName(s.to_string()));
        }

        let first = bytes[0] - b'A';
        let reg = Reg::new(first, bytes.len() as u8)?;

        // Every following letter must be the next cell on the ring
        if !reg.cells().zip(bytes).all(|(cell, b)| cell == (b - b'A') as usize) {
            return Err(RegisterError::UnknownName(s.to_string()));
        }
        Ok(reg)
    }
}

/// Mask for a value `width` bytes wide.
#[inline]
pub const fn width_mask(width: u8) -> u32 {
    if width >= 4 {
        u32::MAX
    } else {
        (1u32 << (width as u32 * 8)) - 1
    }
}

/// The Continuum93 register file.
#[derive(Clone, Serialize, Deserialize)]
pub struct Registers {
    cells: [u8; REGISTER_COUNT],
}

impl Registers {
    /// Create a register file with every cell zeroed.
    pub fn new() -> Self {
        Self {
            cells: [0; REGISTER_COUNT],
        }
    }

    /// Reset every cell to zero.
    pub fn reset(&mut self) {
        self.cells = [0; REGISTER_COUNT];
    }

    /// Read one cell by index.
    ///
    /// # Panics
    /// Panics if `index` is not below [`REGISTER_COUNT`].
    #[inline]
    pub fn read_byte(&self, index: usize) -> u8 {
        self.cells[index]
    }

    /// Write one cell by index.
    ///
    /// # Panics
    /// Panics if `index` is not below [`REGISTER_COUNT`].
    #[inline]
    pub fn write_byte(&mut self, index: usize, value: u8) {
        self.cells[index] = value;
    }

    /// Read a (possibly composite) register as an unsigned value.
    pub fn read(&self, reg: Reg) -> u32 {
        reg.cells()
            .fold(0u32, |acc, cell| (acc << 8) | self.cells[cell] as u32)
    }

    /// Write a (possibly composite) register. Bits above its width are dropped.
    pub fn write(&mut self, reg: Reg, value: u32) {
        let width = reg.width() as usize;
        for (i, cell) in reg.cells().enumerate() {
            let shift = (width - 1 - i) * 8;
            self.cells[cell] = (value >> shift) as u8;
        }
    }

    /// Bytes of a register, most significant first.
    pub fn bytes(&self, reg: Reg) -> Vec<u8> {
        reg.cells().map(|cell| self.cells[cell]).collect()
    }

    /// Read a register by its textual name (`"A"`, `"QRS"`, ...).
    pub fn get(&self, name: &str) -> Result<u32, RegisterError> {
        Ok(self.read(name.parse()?))
    }

    /// Write a register by its textual name.
    pub fn set(&mut self, name: &str, value: u32) -> Result<(), RegisterError> {
        self.write(name.parse()?, value);
        Ok(())
    }

    /// All cells, `A` first.
    pub fn cells(&self) -> &[u8; REGISTER_COUNT] {
        &self.cells
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (i, value) in self.cells.iter().enumerate() {
            map.entry(&((b'A' + i as u8) as char), &format_args!("{:02X}", value));
        }
        map.finish()
    }
}

/// Errors for malformed register references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("unknown register: {0}")]
    UnknownName(String),

    #[error("register index {0} out of range")]
    InvalidIndex(u8),

    #[error("register width {0} not in 1..=4")]
    InvalidWidth(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str) -> Reg {
        name.parse().unwrap()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(reg("A"), Reg::new(0, 1).unwrap());
        assert_eq!(reg("AB"), Reg::new(0, 2).unwrap());
        assert_eq!(reg("QRS"), Reg::new(16, 3).unwrap());
        assert_eq!(reg("EFGH"), Reg::new(4, 4).unwrap());
        assert_eq!(reg("ZA"), Reg::new(25, 2).unwrap());
        assert_eq!(reg("XYZA").to_string(), "XYZA");
    }

    #[test]
    fn test_reject_bad_names() {
        for name in ["", "AC", "BA", "ABCDE", "ab", "F0", "A1"] {
            assert!(name.parse::<Reg>().is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_composite_aliases_cells() {
        let mut regs = Registers::new();
        regs.write(reg("ABCD"), 0x1122_3344);

        assert_eq!(regs.read(reg("A")), 0x11);
        assert_eq!(regs.read(reg("B")), 0x22);
        assert_eq!(regs.read(reg("BC")), 0x2233);
        assert_eq!(regs.read(reg("CD")), 0x3344);

        regs.write_byte(1, 0xFF);
        assert_eq!(regs.read(reg("ABCD")), 0x11FF_3344);
        assert_eq!(regs.read(reg("AB")), 0x11FF);
    }

    #[test]
    fn test_write_masks_to_width() {
        let mut regs = Registers::new();
        regs.write(reg("C"), 0xAA);
        regs.write(reg("AB"), 0x1234_5678);

        assert_eq!(regs.read(reg("AB")), 0x5678);
        // C is outside AB and must be untouched
        assert_eq!(regs.read(reg("C")), 0xAA);
    }

    #[test]
    fn test_wraparound_register() {
        let mut regs = Registers::new();
        regs.write(reg("YZAB"), 0xDEAD_BEEF);

        assert_eq!(regs.read(reg("Y")), 0xDE);
        assert_eq!(regs.read(reg("Z")), 0xAD);
        assert_eq!(regs.read(reg("AB")), 0xBEEF);
    }

    #[test]
    fn test_named_access() {
        let mut regs = Registers::new();
        regs.set("QRS", 0x01_02_03).unwrap();
        assert_eq!(regs.get("Q").unwrap(), 1);
        assert_eq!(regs.get("RS").unwrap(), 0x0203);
        assert!(regs.get("QS").is_err());
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new();
        regs.write(reg("ABCD"), u32::MAX);
        regs.reset();
        assert!(regs.cells().iter().all(|&c| c == 0));
    }
}
