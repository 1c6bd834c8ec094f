//! CPU emulation for the Continuum93 machine.
//!
//! - 26 byte registers `A`..`Z`, combinable into 1-4 byte composites
//! - 16 float registers `F0`..`F15`
//! - 24-bit address space with ten memory addressing forms
//! - Variable-length instruction records decoded by operand mode

pub mod alu;
pub mod decode;
pub mod execute;
pub mod flags;
pub mod fregs;
pub mod memory;
pub mod random;
pub mod registers;
pub mod resolve;

pub use decode::{AddressExpr, AluOp, BlockSpec, Condition, DecodeError, Instruction, Opcode, Operand, ShapeError};
pub use execute::{Cpu, CpuError, CpuState};
pub use flags::Flags;
pub use fregs::FloatRegisters;
pub use memory::{Memory, MemoryError};
pub use registers::{Reg, RegisterError, Registers};
