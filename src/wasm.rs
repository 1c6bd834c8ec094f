//! WebAssembly bindings for the Continuum93 emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use crate::asm::disasm::disassemble_instruction;
use crate::asm::Assembler;
use crate::{Computer, EmulatorConfig};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmComputer {
    computer: Computer,
    image: Vec<u8>,
    origin: u32,
}

#[wasm_bindgen]
impl WasmComputer {
    /// Create a machine with `memory_size` bytes of RAM.
    #[wasm_bindgen(constructor)]
    pub fn new(memory_size: usize) -> Result<WasmComputer, JsError> {
        let config = EmulatorConfig {
            memory_size,
            ..Default::default()
        };
        let computer = Computer::with_config(config).map_err(|e| JsError::new(&e.to_string()))?;
        Ok(Self {
            computer,
            image: Vec::new(),
            origin: 0,
        })
    }

    /// Assemble and load a program. Returns the image size in bytes.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let mut asm = Assembler::new();
        asm.build(source);
        let image = asm
            .compiled_code()
            .ok_or_else(|| JsError::new(asm.log()))?
            .to_vec();

        self.origin = asm.origin();
        self.image = image;
        self.reset()?;
        Ok(self.image.len())
    }

    /// Step one instruction. Returns the executed instruction as text.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let instr = self
            .computer
            .step()
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(instr.to_string())
    }

    /// Run until halt or max cycles. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        self.computer
            .run_limited(max_cycles as u64)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.computer.cpu.cycles)
    }

    /// Reset the machine and reload the current program.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.computer.reset();
        self.computer
            .load_mem_at(self.origin, &self.image)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.computer.cpu.is_running()
    }

    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.computer.cpu.is_halted()
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.computer.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u32 {
        self.computer.cpu.pc
    }

    /// Read a register by name (`A`, `BC`, `XYZA`, ...).
    #[wasm_bindgen]
    pub fn register(&self, name: &str) -> Result<u32, JsError> {
        self.computer
            .cpu
            .regs
            .get(&name.to_uppercase())
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Read float register `Fn`.
    #[wasm_bindgen]
    pub fn float_register(&self, index: usize) -> f32 {
        self.computer.cpu.fregs.values().get(index).copied().unwrap_or(0.0)
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.computer.cpu.state)
    }

    /// Copy `len` bytes of memory starting at `addr`.
    #[wasm_bindgen]
    pub fn memory(&self, addr: u32, len: usize) -> Result<js_sys::Uint8Array, JsError> {
        let bytes = self
            .computer
            .memc
            .get_memory_at(addr, len)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(js_sys::Uint8Array::from(bytes))
    }

    /// Disassemble the instruction at `addr`.
    #[wasm_bindgen]
    pub fn disassemble_at(&self, addr: u32) -> String {
        match self.computer.memc.tail(addr) {
            Ok(bytes) => disassemble_instruction(bytes).0,
            Err(e) => e.to_string(),
        }
    }

    /// Get registers, flags and float bank as a JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.computer.snapshot()).map_err(|e| JsError::new(&e.to_string()))
    }
}

/// Assemble source code and return the image bytes.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<Vec<u8>, JsError> {
    crate::assemble(source).map_err(|e| {
        let details: Vec<String> = e.errors.iter().map(ToString::to_string).collect();
        JsError::new(&details.join("\n"))
    })
}

/// Disassemble an image loaded at `origin`.
#[wasm_bindgen]
pub fn wasm_disassemble(image: &[u8], origin: u32) -> String {
    crate::disassemble(image, origin)
}
