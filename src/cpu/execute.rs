//! CPU execution engine for Continuum93.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! The CPU owns registers, float registers, flags and the program counter;
//! memory is passed in so the host can inspect and seed it between steps.

use crate::cpu::alu::{self, AluError, Value};
use crate::cpu::decode::{self, AluOp, BlockSpec, Condition, DecodeError, Instruction, Operand};
use crate::cpu::flags::Flags;
use crate::cpu::fregs::FloatRegisters;
use crate::cpu::memory::{Memory, MemoryError, ADDRESS_MASK};
use crate::cpu::random::Prng;
use crate::cpu::registers::Registers;
use crate::cpu::resolve::{Kind, Location};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed BREAK).
    Halted,
    /// CPU hit a fault and stopped.
    Error,
}

/// The Continuum93 CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// Byte registers `A`..`Z`.
    pub regs: Registers,
    /// Float registers `F0`..`F15`.
    pub fregs: FloatRegisters,
    /// Condition flags.
    pub flags: Flags,
    /// Program counter (24 bits).
    pub pc: u32,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    /// Integer random sequence for `RAND`.
    rng: Prng,
    seed: Option<u64>,
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a CPU whose integer `RAND` is seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_seed(None)
    }

    /// Create a CPU with an explicit integer `RAND` seed.
    pub fn with_seed(seed: Option<u64>) -> Self {
        Self {
            regs: Registers::new(),
            fregs: FloatRegisters::new(),
            flags: Flags::new(),
            pc: 0,
            state: CpuState::Running,
            cycles: 0,
            rng: Prng::from_optional_seed(seed),
            seed,
            last_instr: None,
        }
    }

    /// Reset the CPU to its initial state.
    pub fn reset(&mut self) {
        *self = Self::with_seed(self.seed);
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. Any error
    /// leaves the CPU in [`CpuState::Error`].
    pub fn step(&mut self, mem: &mut Memory) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let pc = self.pc;
        match self.fetch_and_execute(mem) {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                log::trace!("{:06X}: {}", pc, instr);
                Ok(instr)
            }
            Err(e) => {
                self.state = CpuState::Error;
                log::warn!("CPU fault at PC={:06X}: {}", pc, e);
                Err(e)
            }
        }
    }

    fn fetch_and_execute(&mut self, mem: &mut Memory) -> Result<Instruction, CpuError> {
        // Fetch + decode
        let (instr, len) = decode::decode(mem.tail(self.pc)?)?;

        // Advance PC before execute (jumps override)
        self.pc = (self.pc + len as u32) & ADDRESS_MASK;

        self.execute(instr, mem)?;
        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self, mem: &mut Memory) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(mem)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, mem: &mut Memory, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.state == CpuState::Running && self.cycles < limit {
            self.step(mem)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction, mem: &mut Memory) -> Result<(), CpuError> {
        match instr {
            Instruction::Break => {
                self.state = CpuState::Halted;
                log::info!("BREAK after {} instructions", self.cycles + 1);
            }

            Instruction::Nop => {}

            Instruction::Alu { op, dest, src, block: None } => {
                let dest_kind = Kind::of(&dest, &src);
                let src_kind = Kind::of(&src, &dest);

                // Resolve and read everything before the single write
                let dest_loc = self.resolve(&dest)?;
                let src_val = self.read_operand(mem, &src, src_kind)?;
                let dest_val = if op == AluOp::Ld {
                    zero_of(dest_kind)
                } else {
                    self.read_location(mem, dest_loc, dest_kind)?
                };

                let result = alu::apply(op, dest_val, src_val)?;
                self.write_location(mem, dest_loc, result)?;
            }

            Instruction::Alu { op, dest, src, block: Some(block) } => {
                self.execute_block(op, &dest, &src, &block, mem)?;
            }

            Instruction::Cp { lhs, rhs } => {
                let lhs_val = self.read_operand(mem, &lhs, Kind::of(&lhs, &rhs))?;
                let rhs_val = self.read_operand(mem, &rhs, Kind::of(&rhs, &lhs))?;
                self.flags.set_from_ordering(alu::compare(lhs_val, rhs_val));
            }

            Instruction::Rand { dest, arg } => {
                let arg = arg.as_ref().map(|a| self.scalar(a)).transpose()?;
                match dest {
                    Operand::Reg(r) => {
                        let value = self.rng.below(arg.unwrap_or(0)) & r.mask();
                        self.regs.write(r, value);
                    }
                    Operand::FReg(i) => {
                        let value = self.fregs.next_random(arg);
                        self.fregs.set(i as usize, value);
                    }
                    other => return Err(CpuError::InvalidOperand(format!("{:?}", other))),
                }
            }

            Instruction::Jp { cond, target } => {
                if cond.map_or(true, |c| self.condition_met(c)) {
                    self.pc = self.scalar(&target)? & ADDRESS_MASK;
                }
            }
        }

        Ok(())
    }

    /// Apply `op` over `repeat` consecutive `size`-byte chunks at `dest`.
    ///
    /// The value tile comes from `src` and is read once, before any chunk
    /// is written; it is reused unchanged for every chunk.
    fn execute_block(
        &mut self,
        op: AluOp,
        dest: &Operand,
        src: &Operand,
        block: &BlockSpec,
        mem: &mut Memory,
    ) -> Result<(), CpuError> {
        let size = block.size as usize;
        let base = match self.resolve(dest)? {
            Location::Mem(addr) => addr,
            other => return Err(CpuError::InvalidOperand(format!("{:?}", other))),
        };
        let repeat = match &block.repeat {
            Some(op) => self.scalar(op)?,
            None => 1,
        };

        if op.is_bytewise() {
            let tile = self.block_tile(mem, src, size)?;
            for i in 0..repeat {
                let addr = chunk_address(base, i, block.size);
                let mut chunk = mem.get_memory_at(addr, size)?.to_vec();
                alu::apply_bytes(op, &mut chunk, &tile);
                mem.set_memory_at(addr, &chunk)?;
            }
        } else {
            let width = size as u8;
            let operand = match src {
                Operand::Mem(expr) => {
                    let addr = self.effective_address(expr);
                    Value::int(alu::le_value(mem.get_memory_at(addr, size)?), width)
                }
                other => self.read_operand(mem, other, Kind::of(other, other))?,
            };
            for i in 0..repeat {
                let addr = chunk_address(base, i, block.size);
                let mut chunk = mem.get_memory_at(addr, size)?.to_vec();
                let current = Value::int(alu::le_value(&chunk), width);
                let result = alu::apply(op, current, operand)?;
                alu::write_le(&mut chunk, result.raw_bits());
                mem.set_memory_at(addr, &chunk)?;
            }
        }
        Ok(())
    }

    /// Bytes of a block source, cycled to fill `size` bytes.
    fn block_tile(&self, mem: &Memory, src: &Operand, size: usize) -> Result<Vec<u8>, CpuError> {
        let pattern: Vec<u8> = match src {
            Operand::Mem(expr) => {
                let addr = self.effective_address(expr);
                return Ok(mem.get_memory_at(addr, size)?.to_vec());
            }
            Operand::Imm { value, width } => value.to_be_bytes()[4 - *width as usize..].to_vec(),
            Operand::Reg(r) => self.regs.bytes(*r),
            Operand::FReg(i) => self.fregs.get_bits(*i as usize).to_be_bytes().to_vec(),
            other => return Err(CpuError::InvalidOperand(format!("{:?}", other))),
        };
        Ok(pattern.iter().copied().cycle().take(size).collect())
    }

    /// Evaluate a `JP` condition against the flags.
    pub fn condition_met(&self, cond: Condition) -> bool {
        let f = &self.flags;
        match cond {
            Condition::Z => f.z,
            Condition::Nz => !f.z,
            Condition::Eq => f.eq,
            Condition::Ne => !f.eq,
            Condition::Gt => f.gt,
            Condition::Lt => f.lt,
            Condition::Gte => f.gte,
            Condition::Lte => f.lte,
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

fn zero_of(kind: Kind) -> Value {
    match kind {
        Kind::Int(width) => Value::int(0, width),
        Kind::Float => Value::Float(0.0),
    }
}

fn chunk_address(base: u32, index: u32, size: u32) -> u32 {
    base.wrapping_add(index.wrapping_mul(size)) & ADDRESS_MASK
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("pc", &format_args!("{:06X}", self.pc))
            .field("cycles", &self.cycles)
            .field("flags", &self.flags)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("decode error: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("operand cannot be used here: {0}")]
    InvalidOperand(String),
}

impl From<AluError> for CpuError {
    fn from(e: AluError) -> Self {
        match e {
            AluError::DivisionByZero => CpuError::DivisionByZero,
        }
    }
}
