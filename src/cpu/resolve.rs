//! Operand resolution.
//!
//! Turns a decoded [`Operand`] into a [`Location`] (a register, a float slot,
//! a memory address or a literal) and reads or writes values through it.
//! Effective addresses are computed when the instruction executes, from the
//! register values at that moment.

use crate::cpu::alu::Value;
use crate::cpu::decode::{AddressExpr, Operand};
use crate::cpu::execute::{Cpu, CpuError};
use crate::cpu::memory::{Memory, ADDRESS_MASK};
use crate::cpu::registers::Reg;

/// A concrete place an operand refers to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    Reg(Reg),
    FReg(usize),
    Mem(u32),
    Imm { value: u32, width: u8 },
    FloatImm(f32),
}

/// How the bytes behind a location are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int(u8),
    Float,
}

impl Kind {
    /// Kind of `op` when paired with `other`. Memory operands have no width
    /// of their own and follow the operand they are combined with.
    pub fn of(op: &Operand, other: &Operand) -> Kind {
        match op {
            Operand::FReg(_) | Operand::FloatImm(_) => Kind::Float,
            Operand::Mem(_) if other.is_float() => Kind::Float,
            Operand::Mem(_) => Kind::Int(other.width().unwrap_or(1)),
            op => Kind::Int(op.width().unwrap_or(1)),
        }
    }
}

impl Cpu {
    /// Effective address of a memory operand, wrapped to 24 bits.
    pub fn effective_address(&self, expr: &AddressExpr) -> u32 {
        let (base, offset) = match *expr {
            AddressExpr::Absolute(addr) => (addr, 0),
            AddressExpr::AbsoluteImm(addr, offset) => (addr, offset),
            AddressExpr::AbsoluteReg(addr, reg) => (addr, self.regs.read(reg)),
            AddressExpr::Indirect(base) => (self.regs.read(base), 0),
            AddressExpr::IndirectImm(base, offset) => (self.regs.read(base), offset),
            AddressExpr::IndirectReg(base, reg) => (self.regs.read(base), self.regs.read(reg)),
        };
        base.wrapping_add(offset) & ADDRESS_MASK
    }

    /// Bind an operand to a location using the current register values.
    pub fn resolve(&self, op: &Operand) -> Result<Location, CpuError> {
        Ok(match op {
            Operand::Reg(r) => Location::Reg(*r),
            Operand::FReg(i) => Location::FReg(*i as usize),
            Operand::Imm { value, width } => Location::Imm {
                value: *value,
                width: *width,
            },
            Operand::FloatImm(f) => Location::FloatImm(*f),
            Operand::Mem(expr) => Location::Mem(self.effective_address(expr)),
            Operand::Cond(c) => return Err(CpuError::InvalidOperand(c.name().to_string())),
        })
    }

    /// Read the value at a location.
    pub fn read_location(&self, mem: &Memory, loc: Location, kind: Kind) -> Result<Value, CpuError> {
        Ok(match loc {
            Location::Reg(r) => Value::int(self.regs.read(r), r.width()),
            Location::FReg(i) => Value::Float(self.fregs.get(i)),
            Location::Imm { value, width } => Value::int(value, width),
            Location::FloatImm(f) => Value::Float(f),
            Location::Mem(addr) => match kind {
                Kind::Int(width) => Value::int(mem.get_uint(addr, width)?, width),
                Kind::Float => Value::Float(mem.get_float(addr)?),
            },
        })
    }

    /// Write a value to a location. Integer values are stored at their own
    /// width; floats as their 32-bit pattern.
    pub fn write_location(&mut self, mem: &mut Memory, loc: Location, value: Value) -> Result<(), CpuError> {
        match loc {
            Location::Reg(r) => self.regs.write(r, value.raw_bits()),
            Location::FReg(i) => match value {
                Value::Float(f) => self.fregs.set(i, f),
                Value::Int { bits, .. } => self.fregs.set_bits(i, bits),
            },
            Location::Mem(addr) => match value {
                Value::Int { bits, width } => mem.set_uint(addr, width, bits)?,
                Value::Float(f) => mem.set_float(addr, f)?,
            },
            Location::Imm { .. } | Location::FloatImm(_) => {
                return Err(CpuError::InvalidOperand("literal destination".into()))
            }
        }
        Ok(())
    }

    /// Resolve and read an operand in one go.
    pub fn read_operand(&self, mem: &Memory, op: &Operand, kind: Kind) -> Result<Value, CpuError> {
        let loc = self.resolve(op)?;
        self.read_location(mem, loc, kind)
    }

    /// Integer value of a register or literal (repeat counts, bounds, seeds).
    pub fn scalar(&self, op: &Operand) -> Result<u32, CpuError> {
        match op {
            Operand::Reg(r) => Ok(self.regs.read(*r)),
            Operand::Imm { value, .. } => Ok(*value),
            Operand::FReg(i) => Ok(self.fregs.get_bits(*i as usize)),
            other => Err(CpuError::InvalidOperand(format!("{:?}", other))),
        }
    }
}
