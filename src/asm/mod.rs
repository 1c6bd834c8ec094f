//! Assembler and disassembler for Continuum93 programs.
//!
//! This module provides:
//! - A two-pass, best-effort assembler (text → memory image)
//! - A disassembler (memory image → text that assembles back to the same bytes)

pub mod assembler;
pub mod disasm;

pub use assembler::{assemble, Assembler, AssemblerError, AssemblyFailed};
pub use disasm::{disassemble, disassemble_instruction};
