//! TUI debugger for the Continuum93 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Byte register, flag and float register views
//! - Memory hex view
//! - Step/run/breakpoint controls
//! - Disassembly around PC

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
