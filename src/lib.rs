//! # Continuum93 Emulator
//!
//! An emulator and assembler for the Continuum93 fantasy CPU: 26 byte
//! registers that combine into composites up to 32 bits wide, 16 float
//! registers, a 24-bit address space and variable-length instructions whose
//! operands can address memory in ten different ways.

pub mod asm;
pub mod computer;
pub mod config;
pub mod cpu;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use asm::{assemble, disassemble, Assembler, AssemblerError, AssemblyFailed};
pub use computer::{Computer, Snapshot};
pub use config::{ConfigError, EmulatorConfig};
pub use cpu::{Cpu, CpuError, CpuState, Instruction, Memory, Registers};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
