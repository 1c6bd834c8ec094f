//! A complete Continuum93 machine: one CPU and its memory.

use crate::config::{ConfigError, EmulatorConfig};
use crate::cpu::{Cpu, CpuError, CpuState, Flags, Instruction, Memory, MemoryError};
use serde::{Deserialize, Serialize};

/// CPU plus memory controller, built from an [`EmulatorConfig`].
#[derive(Debug, Clone)]
pub struct Computer {
    pub cpu: Cpu,
    pub memc: Memory,
    config: EmulatorConfig,
}

impl Computer {
    /// A machine with the default configuration.
    pub fn new() -> Self {
        let config = EmulatorConfig::default();
        Self {
            cpu: Cpu::with_seed(config.rng_seed),
            memc: Memory::with_size(config.memory_size),
            config,
        }
    }

    pub fn with_config(config: EmulatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        log::debug!(
            "Creating computer: {} bytes of memory, seed {:?}",
            config.memory_size,
            config.rng_seed
        );
        Ok(Self {
            cpu: Cpu::with_seed(config.rng_seed),
            memc: Memory::with_size(config.memory_size),
            config,
        })
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Load an image at the configured load address and point PC at it.
    pub fn load_mem(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.load_mem_at(self.config.load_address, image)
    }

    /// Load an image at `addr`, point PC at it and make the CPU runnable
    /// again. Registers, flags and the cycle count are kept.
    pub fn load_mem_at(&mut self, addr: u32, image: &[u8]) -> Result<(), MemoryError> {
        self.memc.load_at(addr, image)?;
        self.cpu.pc = addr;
        self.cpu.state = CpuState::Running;
        log::debug!("Loaded {} bytes at 0x{:06X}", image.len(), addr);
        Ok(())
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        self.cpu.step(&mut self.memc)
    }

    /// Run until halt, fault, or the configured cycle limit.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        match self.config.max_cycles {
            Some(max) => self.cpu.run_limited(&mut self.memc, max),
            None => self.cpu.run(&mut self.memc),
        }
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        self.cpu.run_limited(&mut self.memc, max_cycles)
    }

    /// Zero registers, flags and memory; reseed randomness.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.memc.clear();
        log::debug!("Computer reset");
    }

    /// Serializable view of the CPU registers.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of(&self.cpu)
    }
}

impl Default for Computer {
    fn default() -> Self {
        Self::new()
    }
}

/// Register, flag and float state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub pc: u32,
    pub cycles: u64,
    pub state: String,
    pub registers: Vec<u8>,
    pub float_registers: Vec<f32>,
    pub flags: Flags,
}

impl Snapshot {
    pub fn of(cpu: &Cpu) -> Self {
        Self {
            pc: cpu.pc,
            cycles: cpu.cycles,
            state: format!("{:?}", cpu.state),
            registers: cpu.regs.cells().to_vec(),
            float_registers: cpu.fregs.values().to_vec(),
            flags: cpu.flags,
        }
    }
}
