//! Instruction encoding and decoding for Continuum93.
//!
//! An instruction record is laid out as:
//!
//! ```text
//! opcode | argc | mode[0] .. mode[argc-1] | payload[0] .. payload[argc-1]
//! ```
//!
//! Each operand-mode byte carries the operand class in its high nibble and
//! a width in its low nibble. The payload sizes follow from the mode alone,
//! so the decoder always knows the exact instruction length.
//!
//! [`Instruction::from_parts`] checks operand shapes. The assembler and the
//! decoder both go through it, so every image the assembler produces decodes
//! and every image that decodes could have been assembled.

use crate::cpu::fregs::FLOAT_REGISTER_COUNT;
use crate::cpu::registers::{Reg, RegisterError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width in bytes of an encoded address literal.
pub const ADDRESS_WIDTH: u8 = 3;

/// Largest block size or repeat count (24 bits).
pub const MAX_BLOCK_VALUE: u32 = 0x00FF_FFFF;

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Break = 0x00,
    Nop = 0x01,
    Ld = 0x02,
    Add = 0x03,
    Sub = 0x04,
    Mul = 0x05,
    Div = 0x06,
    And = 0x07,
    Or = 0x08,
    Xor = 0x09,
    Rl = 0x0A,
    Rr = 0x0B,
    Cp = 0x0C,
    Rand = 0x0D,
    Jp = 0x0E,
}

impl Opcode {
    pub const ALL: [Opcode; 15] = [
        Opcode::Break,
        Opcode::Nop,
        Opcode::Ld,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Rl,
        Opcode::Rr,
        Opcode::Cp,
        Opcode::Rand,
        Opcode::Jp,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| *op as u8 == byte)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Break => "BREAK",
            Opcode::Nop => "NOP",
            Opcode::Ld => "LD",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Rl => "RL",
            Opcode::Rr => "RR",
            Opcode::Cp => "CP",
            Opcode::Rand => "RAND",
            Opcode::Jp => "JP",
        }
    }

    /// Look up an opcode by (upper case) mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }

    /// The ALU operation behind this opcode, if it is one.
    pub fn alu_op(self) -> Option<AluOp> {
        match self {
            Opcode::Ld => Some(AluOp::Ld),
            Opcode::Add => Some(AluOp::Add),
            Opcode::Sub => Some(AluOp::Sub),
            Opcode::Mul => Some(AluOp::Mul),
            Opcode::Div => Some(AluOp::Div),
            Opcode::And => Some(AluOp::And),
            Opcode::Or => Some(AluOp::Or),
            Opcode::Xor => Some(AluOp::Xor),
            Opcode::Rl => Some(AluOp::Rl),
            Opcode::Rr => Some(AluOp::Rr),
            _ => None,
        }
    }
}

/// Two-operand operations sharing the destination/source operand engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluOp {
    Ld,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Rl,
    Rr,
}

impl AluOp {
    pub fn opcode(self) -> Opcode {
        match self {
            AluOp::Ld => Opcode::Ld,
            AluOp::Add => Opcode::Add,
            AluOp::Sub => Opcode::Sub,
            AluOp::Mul => Opcode::Mul,
            AluOp::Div => Opcode::Div,
            AluOp::And => Opcode::And,
            AluOp::Or => Opcode::Or,
            AluOp::Xor => Opcode::Xor,
            AluOp::Rl => Opcode::Rl,
            AluOp::Rr => Opcode::Rr,
        }
    }

    /// Operations that act on each byte independently.
    pub fn is_bytewise(self) -> bool {
        matches!(self, AluOp::Ld | AluOp::And | AluOp::Or | AluOp::Xor)
    }
}

/// Branch conditions for `JP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Condition {
    Z = 0,
    Nz = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Lt = 5,
    Gte = 6,
    Lte = 7,
}

impl Condition {
    pub const ALL: [Condition; 8] = [
        Condition::Z,
        Condition::Nz,
        Condition::Eq,
        Condition::Ne,
        Condition::Gt,
        Condition::Lt,
        Condition::Gte,
        Condition::Lte,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u8 == byte)
    }

    pub fn name(self) -> &'static str {
        match self {
            Condition::Z => "Z",
            Condition::Nz => "NZ",
            Condition::Eq => "EQ",
            Condition::Ne => "NE",
            Condition::Gt => "GT",
            Condition::Lt => "LT",
            Condition::Gte => "GTE",
            Condition::Lte => "LTE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// The ten memory addressing forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressExpr {
    /// `(nnn)`
    Absolute(u32),
    /// `(nnn+nnn)`
    AbsoluteImm(u32, u32),
    /// `(nnn+r)`, `(nnn+rr)`, `(nnn+rrr)`
    AbsoluteReg(u32, Reg),
    /// `(rrr)`
    Indirect(Reg),
    /// `(rrr+nnn)`
    IndirectImm(Reg, u32),
    /// `(rrr+r)`, `(rrr+rr)`, `(rrr+rrr)`
    IndirectReg(Reg, Reg),
}

/// A decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Integer register, 1-4 bytes.
    Reg(Reg),
    /// Float register `Fn`.
    FReg(u8),
    /// Integer literal, 1-4 bytes wide.
    Imm { value: u32, width: u8 },
    /// Float literal.
    FloatImm(f32),
    /// Memory operand.
    Mem(AddressExpr),
    /// `JP` condition.
    Cond(Condition),
}

// Operand classes (high nibble of the mode byte)
const CLASS_REG: u8 = 0x1;
const CLASS_FREG: u8 = 0x2;
const CLASS_IMM: u8 = 0x3;
const CLASS_FLOAT_IMM: u8 = 0x4;
const CLASS_ABS: u8 = 0x5;
const CLASS_ABS_IMM: u8 = 0x6;
const CLASS_ABS_REG: u8 = 0x7;
const CLASS_IND: u8 = 0x8;
const CLASS_IND_IMM: u8 = 0x9;
const CLASS_IND_REG: u8 = 0xA;
const CLASS_COND: u8 = 0xB;

impl Operand {
    /// Operand-mode byte: class in the high nibble, width in the low nibble.
    pub fn mode_byte(&self) -> u8 {
        let (class, width) = match self {
            Operand::Reg(r) => (CLASS_REG, r.width()),
            Operand::FReg(_) => (CLASS_FREG, 0),
            Operand::Imm { width, .. } => (CLASS_IMM, *width),
            Operand::FloatImm(_) => (CLASS_FLOAT_IMM, 0),
            Operand::Mem(AddressExpr::Absolute(_)) => (CLASS_ABS, 0),
            Operand::Mem(AddressExpr::AbsoluteImm(..)) => (CLASS_ABS_IMM, 0),
            Operand::Mem(AddressExpr::AbsoluteReg(_, r)) => (CLASS_ABS_REG, r.width()),
            Operand::Mem(AddressExpr::Indirect(_)) => (CLASS_IND, 0),
            Operand::Mem(AddressExpr::IndirectImm(..)) => (CLASS_IND_IMM, 0),
            Operand::Mem(AddressExpr::IndirectReg(_, r)) => (CLASS_IND_REG, r.width()),
            Operand::Cond(_) => (CLASS_COND, 0),
        };
        (class << 4) | width
    }

    /// Number of payload bytes following the mode bytes.
    pub fn payload_len(&self) -> usize {
        match self {
            Operand::Reg(_) | Operand::FReg(_) | Operand::Cond(_) => 1,
            Operand::Imm { width, .. } => *width as usize,
            Operand::FloatImm(_) => 4,
            Operand::Mem(expr) => match expr {
                AddressExpr::Absolute(_) => 3,
                AddressExpr::AbsoluteImm(..) => 6,
                AddressExpr::AbsoluteReg(..) => 4,
                AddressExpr::Indirect(_) => 1,
                AddressExpr::IndirectImm(..) => 4,
                AddressExpr::IndirectReg(..) => 2,
            },
        }
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        match self {
            Operand::Reg(r) => out.push(r.index()),
            Operand::FReg(i) => out.push(*i),
            Operand::Imm { value, width } => push_uint(out, *value, *width),
            Operand::FloatImm(f) => push_uint(out, f.to_bits(), 4),
            Operand::Cond(c) => out.push(*c as u8),
            Operand::Mem(expr) => match expr {
                AddressExpr::Absolute(a) => push_uint(out, *a, ADDRESS_WIDTH),
                AddressExpr::AbsoluteImm(a, o) => {
                    push_uint(out, *a, ADDRESS_WIDTH);
                    push_uint(out, *o, ADDRESS_WIDTH);
                }
                AddressExpr::AbsoluteReg(a, r) => {
                    push_uint(out, *a, ADDRESS_WIDTH);
                    out.push(r.index());
                }
                AddressExpr::Indirect(b) => out.push(b.index()),
                AddressExpr::IndirectImm(b, o) => {
                    out.push(b.index());
                    push_uint(out, *o, ADDRESS_WIDTH);
                }
                AddressExpr::IndirectReg(b, r) => {
                    out.push(b.index());
                    out.push(r.index());
                }
            },
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Mem(_))
    }

    /// True for float registers and float literals.
    pub fn is_float(&self) -> bool {
        matches!(self, Operand::FReg(_) | Operand::FloatImm(_))
    }

    /// Intrinsic width in bytes, if the operand has one.
    /// Memory operands take their width from the other operand.
    pub fn width(&self) -> Option<u8> {
        match self {
            Operand::Reg(r) => Some(r.width()),
            Operand::Imm { width, .. } => Some(*width),
            Operand::FReg(_) | Operand::FloatImm(_) => Some(4),
            Operand::Mem(_) | Operand::Cond(_) => None,
        }
    }
}

fn push_uint(out: &mut Vec<u8>, value: u32, width: u8) {
    out.extend_from_slice(&value.to_be_bytes()[4 - width as usize..]);
}

/// Trailing `size[, repeat]` arguments of a block operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Bytes per chunk.
    pub size: u32,
    /// Number of chunks: a literal or a register read at execute time.
    pub repeat: Option<Operand>,
}

/// A decoded Continuum93 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Halt execution
    Break,

    /// No operation
    Nop,

    /// `dest := dest <op> src`, optionally applied over memory blocks
    Alu {
        op: AluOp,
        dest: Operand,
        src: Operand,
        block: Option<BlockSpec>,
    },

    /// Compare and set flags
    Cp { lhs: Operand, rhs: Operand },

    /// Random integer below a bound, or random float from an optional seed
    Rand { dest: Operand, arg: Option<Operand> },

    /// Jump, optionally on a flag condition
    Jp { cond: Option<Condition>, target: Operand },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Break => Opcode::Break,
            Instruction::Nop => Opcode::Nop,
            Instruction::Alu { op, .. } => op.opcode(),
            Instruction::Cp { .. } => Opcode::Cp,
            Instruction::Rand { .. } => Opcode::Rand,
            Instruction::Jp { .. } => Opcode::Jp,
        }
    }

    /// Operands in encoding order.
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Instruction::Break | Instruction::Nop => Vec::new(),
            Instruction::Alu { dest, src, block, .. } => {
                let mut ops = vec![*dest, *src];
                if let Some(block) = block {
                    ops.push(Operand::Imm {
                        value: block.size,
                        width: ADDRESS_WIDTH,
                    });
                    ops.extend(block.repeat);
                }
                ops
            }
            Instruction::Cp { lhs, rhs } => vec![*lhs, *rhs],
            Instruction::Rand { dest, arg } => {
                let mut ops = vec![*dest];
                ops.extend(*arg);
                ops
            }
            Instruction::Jp { cond, target } => {
                let mut ops: Vec<Operand> = cond.iter().map(|c| Operand::Cond(*c)).collect();
                ops.push(*target);
                ops
            }
        }
    }

    /// Build an instruction from an opcode and operand list, checking that the
    /// operand classes and widths form a valid combination.
    pub fn from_parts(opcode: Opcode, operands: &[Operand]) -> Result<Self, ShapeError> {
        let mnemonic = opcode.mnemonic();
        let count = |expected: &'static str| ShapeError::OperandCount {
            mnemonic,
            expected,
            found: operands.len(),
        };

        if let Some(op) = opcode.alu_op() {
            return match operands {
                [dest, src] => {
                    check_pair(mnemonic, dest, src)?;
                    Ok(Instruction::Alu {
                        op,
                        dest: *dest,
                        src: *src,
                        block: None,
                    })
                }
                [dest, src, size, rest @ ..] if rest.len() <= 1 => {
                    let block = check_block(op, dest, src, size, rest.first())?;
                    Ok(Instruction::Alu {
                        op,
                        dest: *dest,
                        src: *src,
                        block: Some(block),
                    })
                }
                _ => Err(count("2 to 4")),
            };
        }

        match opcode {
            Opcode::Break | Opcode::Nop => {
                if !operands.is_empty() {
                    return Err(count("0"));
                }
                Ok(if opcode == Opcode::Break {
                    Instruction::Break
                } else {
                    Instruction::Nop
                })
            }
            Opcode::Cp => match operands {
                [lhs, rhs] => {
                    check_pair(mnemonic, lhs, rhs)?;
                    Ok(Instruction::Cp { lhs: *lhs, rhs: *rhs })
                }
                _ => Err(count("2")),
            },
            Opcode::Rand => match operands {
                [dest] => {
                    check_rand_dest(dest)?;
                    Ok(Instruction::Rand { dest: *dest, arg: None })
                }
                [dest, arg] => {
                    check_rand_dest(dest)?;
                    check_rand_arg(dest, arg)?;
                    Ok(Instruction::Rand {
                        dest: *dest,
                        arg: Some(*arg),
                    })
                }
                _ => Err(count("1 or 2")),
            },
            Opcode::Jp => match operands {
                [target] => {
                    check_jump_target(target)?;
                    Ok(Instruction::Jp { cond: None, target: *target })
                }
                [Operand::Cond(cond), target] => {
                    check_jump_target(target)?;
                    Ok(Instruction::Jp {
                        cond: Some(*cond),
                        target: *target,
                    })
                }
                [other, _] => Err(ShapeError::ExpectedCondition(format!("{:?}", other))),
                _ => Err(count("1 or 2")),
            },
            _ => unreachable!("ALU opcodes handled above"),
        }
    }
}

/// Check a destination/source pair for ALU ops and `CP`.
fn check_pair(mnemonic: &'static str, dest: &Operand, src: &Operand) -> Result<(), ShapeError> {
    match dest {
        Operand::Reg(_) | Operand::FReg(_) | Operand::Mem(_) => {}
        other => {
            return Err(ShapeError::InvalidDestination {
                mnemonic,
                operand: format!("{:?}", other),
            })
        }
    }
    if let Operand::Cond(c) = src {
        return Err(ShapeError::InvalidSource {
            mnemonic,
            operand: c.name().to_string(),
        });
    }
    check_operand_widths(src)?;

    match (dest, src) {
        (Operand::Mem(_), Operand::Mem(_)) => Err(ShapeError::MemoryToMemory),
        (Operand::Reg(d), Operand::Reg(s)) if d.width() != s.width() => {
            Err(ShapeError::WidthMismatch {
                dest: d.width(),
                src: s.width(),
            })
        }
        (Operand::Reg(d), Operand::Imm { width, .. }) if d.width() != *width => {
            Err(ShapeError::WidthMismatch {
                dest: d.width(),
                src: *width,
            })
        }
        (Operand::FReg(_), Operand::Imm { width, .. }) if *width != 4 => {
            Err(ShapeError::WidthMismatch { dest: 4, src: *width })
        }
        _ => check_operand_widths(dest),
    }
}

/// Widths the encoding can express but the machine does not accept.
fn check_operand_widths(op: &Operand) -> Result<(), ShapeError> {
    match op {
        Operand::Imm { width, .. } if *width == 0 || *width > 4 => {
            Err(ShapeError::InvalidImmediateWidth(*width))
        }
        Operand::FReg(i) if *i as usize >= FLOAT_REGISTER_COUNT => {
            Err(ShapeError::InvalidFloatRegister(*i))
        }
        Operand::Mem(expr) => match expr {
            AddressExpr::Indirect(base)
            | AddressExpr::IndirectImm(base, _)
            | AddressExpr::IndirectReg(base, _)
                if base.width() != ADDRESS_WIDTH =>
            {
                Err(ShapeError::IndirectBaseWidth(base.width()))
            }
            AddressExpr::AbsoluteReg(_, offset) | AddressExpr::IndirectReg(_, offset)
                if offset.width() > ADDRESS_WIDTH =>
            {
                Err(ShapeError::OffsetRegisterWidth(offset.width()))
            }
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

fn check_block(
    op: AluOp,
    dest: &Operand,
    src: &Operand,
    size: &Operand,
    repeat: Option<&Operand>,
) -> Result<BlockSpec, ShapeError> {
    if !dest.is_memory() {
        return Err(ShapeError::BlockDestination);
    }
    check_operand_widths(dest)?;
    match src {
        Operand::Reg(_) | Operand::FReg(_) | Operand::Imm { .. } | Operand::Mem(_) => {
            check_operand_widths(src)?
        }
        other => return Err(ShapeError::BlockSource(format!("{:?}", other))),
    }

    let size = match size {
        Operand::Imm { value, .. } => *value,
        other => return Err(ShapeError::BlockSize(format!("{:?}", other))),
    };
    if size == 0 || size > MAX_BLOCK_VALUE {
        return Err(ShapeError::BlockSize(size.to_string()));
    }
    if !op.is_bytewise() && size > 4 {
        return Err(ShapeError::NumericBlockTooWide(size));
    }

    match repeat {
        None | Some(Operand::Imm { .. }) => {}
        Some(Operand::Reg(r)) if r.width() <= ADDRESS_WIDTH => {}
        Some(other) => return Err(ShapeError::BlockRepeat(format!("{:?}", other))),
    }

    Ok(BlockSpec {
        size,
        repeat: repeat.copied(),
    })
}

fn check_rand_dest(dest: &Operand) -> Result<(), ShapeError> {
    match dest {
        Operand::Reg(_) => Ok(()),
        Operand::FReg(i) if (*i as usize) < FLOAT_REGISTER_COUNT => Ok(()),
        other => Err(ShapeError::InvalidDestination {
            mnemonic: "RAND",
            operand: format!("{:?}", other),
        }),
    }
}

fn check_rand_arg(dest: &Operand, arg: &Operand) -> Result<(), ShapeError> {
    let dest_width = dest.width().unwrap_or(4);
    match arg {
        Operand::Imm { .. } | Operand::Reg(_) if arg.width() == Some(dest_width) => Ok(()),
        Operand::Imm { .. } | Operand::Reg(_) => Err(ShapeError::WidthMismatch {
            dest: dest_width,
            src: arg.width().unwrap_or(0),
        }),
        other => Err(ShapeError::InvalidSource {
            mnemonic: "RAND",
            operand: format!("{:?}", other),
        }),
    }
}

fn check_jump_target(target: &Operand) -> Result<(), ShapeError> {
    match target {
        Operand::Imm { width, .. } if *width == ADDRESS_WIDTH => Ok(()),
        Operand::Reg(r) if r.width() == ADDRESS_WIDTH => Ok(()),
        other => Err(ShapeError::JumpTarget(format!("{:?}", other))),
    }
}

/// Operand combinations that do not form a valid instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{mnemonic} takes {expected} operands, found {found}")]
    OperandCount {
        mnemonic: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("{mnemonic} cannot write to {operand}")]
    InvalidDestination { mnemonic: &'static str, operand: String },

    #[error("{mnemonic} cannot read from {operand}")]
    InvalidSource { mnemonic: &'static str, operand: String },

    #[error("operand width mismatch: destination is {dest} bytes, source is {src} bytes")]
    WidthMismatch { dest: u8, src: u8 },

    #[error("memory-to-memory operations need a block size")]
    MemoryToMemory,

    #[error("immediate width {0} not in 1..=4")]
    InvalidImmediateWidth(u8),

    #[error("float register F{0} does not exist")]
    InvalidFloatRegister(u8),

    #[error("indirect base register must be 3 bytes wide, found {0}")]
    IndirectBaseWidth(u8),

    #[error("offset register must be 1 to 3 bytes wide, found {0}")]
    OffsetRegisterWidth(u8),

    #[error("block operations need a memory destination")]
    BlockDestination,

    #[error("invalid block source {0}")]
    BlockSource(String),

    #[error("invalid block size {0}")]
    BlockSize(String),

    #[error("numeric block operations work on at most 4 bytes, found {0}")]
    NumericBlockTooWide(u32),

    #[error("invalid block repeat count {0}")]
    BlockRepeat(String),

    #[error("jump target must be a 24-bit address or register, found {0}")]
    JumpTarget(String),

    #[error("expected a jump condition, found {0}")]
    ExpectedCondition(String),
}

/// Encode an instruction to bytes.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let operands = instr.operands();
    let mut out = Vec::with_capacity(encoded_len(&operands));

    out.push(instr.opcode() as u8);
    out.push(operands.len() as u8);
    out.extend(operands.iter().map(Operand::mode_byte));
    for op in &operands {
        op.write_payload(&mut out);
    }
    out
}

/// Encoded size of an instruction with the given operands.
pub fn encoded_len(operands: &[Operand]) -> usize {
    2 + operands.len() + operands.iter().map(Operand::payload_len).sum::<usize>()
}

/// Byte cursor used while decoding.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.bytes.get(self.pos).ok_or(DecodeError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn uint(&mut self, width: u8) -> Result<u32, DecodeError> {
        (0..width).try_fold(0u32, |acc, _| Ok((acc << 8) | self.byte()? as u32))
    }

    fn reg(&mut self, width: u8) -> Result<Reg, DecodeError> {
        let index = self.byte()?;
        Ok(Reg::new(index, width)?)
    }
}

/// Decode the instruction at the start of `bytes`.
///
/// Returns the instruction and its encoded length.
pub fn decode(bytes: &[u8]) -> Result<(Instruction, usize), DecodeError> {
    let mut rd = Reader { bytes, pos: 0 };

    let op_byte = rd.byte()?;
    let opcode = Opcode::from_byte(op_byte).ok_or(DecodeError::InvalidOpcode(op_byte))?;
    let argc = rd.byte()? as usize;
    if argc > 4 {
        return Err(DecodeError::TooManyOperands(argc));
    }

    let mut modes = [0u8; 4];
    for mode in modes.iter_mut().take(argc) {
        *mode = rd.byte()?;
    }

    let mut operands = Vec::with_capacity(argc);
    for &mode in &modes[..argc] {
        operands.push(decode_operand(&mut rd, mode)?);
    }

    let instr = Instruction::from_parts(opcode, &operands)?;
    Ok((instr, rd.pos))
}

fn decode_operand(rd: &mut Reader<'_>, mode: u8) -> Result<Operand, DecodeError> {
    let class = mode >> 4;
    let width = mode & 0x0F;
    let bad_mode = DecodeError::InvalidOperandMode(mode);

    let operand = match class {
        CLASS_REG => Operand::Reg(rd.reg(width)?),
        CLASS_FREG if width == 0 => Operand::FReg(rd.byte()?),
        CLASS_IMM if (1..=4).contains(&width) => Operand::Imm {
            value: rd.uint(width)?,
            width,
        },
        CLASS_FLOAT_IMM if width == 0 => Operand::FloatImm(f32::from_bits(rd.uint(4)?)),
        CLASS_ABS if width == 0 => Operand::Mem(AddressExpr::Absolute(rd.uint(ADDRESS_WIDTH)?)),
        CLASS_ABS_IMM if width == 0 => {
            let base = rd.uint(ADDRESS_WIDTH)?;
            let offset = rd.uint(ADDRESS_WIDTH)?;
            Operand::Mem(AddressExpr::AbsoluteImm(base, offset))
        }
        CLASS_ABS_REG => {
            let base = rd.uint(ADDRESS_WIDTH)?;
            Operand::Mem(AddressExpr::AbsoluteReg(base, rd.reg(width)?))
        }
        CLASS_IND if width == 0 => Operand::Mem(AddressExpr::Indirect(rd.reg(ADDRESS_WIDTH)?)),
        CLASS_IND_IMM if width == 0 => {
            let base = rd.reg(ADDRESS_WIDTH)?;
            Operand::Mem(AddressExpr::IndirectImm(base, rd.uint(ADDRESS_WIDTH)?))
        }
        CLASS_IND_REG => {
            let base = rd.reg(ADDRESS_WIDTH)?;
            Operand::Mem(AddressExpr::IndirectReg(base, rd.reg(width)?))
        }
        CLASS_COND if width == 0 => {
            let byte = rd.byte()?;
            Operand::Cond(Condition::from_byte(byte).ok_or(DecodeError::InvalidCondition(byte))?)
        }
        _ => return Err(bad_mode),
    };
    Ok(operand)
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode: 0x{0:02X}")]
    InvalidOpcode(u8),

    #[error("invalid operand mode: 0x{0:02X}")]
    InvalidOperandMode(u8),

    #[error("invalid condition code: {0}")]
    InvalidCondition(u8),

    #[error("too many operands: {0}")]
    TooManyOperands(usize),

    #[error("instruction truncated at byte {0}")]
    Truncated(usize),

    #[error("bad register: {0}")]
    Register(#[from] RegisterError),

    #[error("malformed instruction: {0}")]
    Shape(#[from] ShapeError),
}
