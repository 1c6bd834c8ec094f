//! Emulator configuration.
//!
//! Loaded from a JSON file, every field optional:
//!
//! ```json
//! {
//!   "memory_size": 1048576,
//!   "rng_seed": 42,
//!   "max_cycles": 100000,
//!   "load_address": 0
//! }
//! ```

use crate::cpu::memory::MEMORY_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Settings for building a [`Computer`](crate::Computer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Bytes of RAM. At most 16 MiB (the 24-bit address space).
    pub memory_size: usize,

    /// Seed for the integer `RAND` sequence. `None` draws one from the OS.
    pub rng_seed: Option<u64>,

    /// Upper bound on instructions per `run`. `None` runs until halt.
    pub max_cycles: Option<u64>,

    /// Where `load_mem` places an image and starts execution.
    pub load_address: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            memory_size: MEMORY_SIZE,
            rng_seed: None,
            max_cycles: None,
            load_address: 0,
        }
    }
}

impl EmulatorConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_json(&text)?;
        log::debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Check that the settings describe a machine that can exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 || self.memory_size > MEMORY_SIZE {
            return Err(ConfigError::InvalidMemorySize(self.memory_size));
        }
        if self.load_address as usize >= self.memory_size {
            return Err(ConfigError::LoadAddressOutOfRange {
                addr: self.load_address,
                size: self.memory_size,
            });
        }
        Ok(())
    }
}

/// Errors from loading or validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("memory size {0} must be between 1 and 16777216 bytes")]
    InvalidMemorySize(usize),

    #[error("load address 0x{addr:06X} is outside {size} bytes of memory")]
    LoadAddressOutOfRange { addr: u32, size: usize },
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmulatorConfig::default();
        assert_eq!(config.memory_size, MEMORY_SIZE);
        assert_eq!(config.rng_seed, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EmulatorConfig::from_json(r#"{ "rng_seed": 7 }"#).unwrap();
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.memory_size, MEMORY_SIZE);
        assert_eq!(config.load_address, 0);
    }

    #[test]
    fn test_invalid_memory_size() {
        assert_eq!(
            EmulatorConfig::from_json(r#"{ "memory_size": 0 }"#),
            Err(ConfigError::InvalidMemorySize(0))
        );
        let too_big = format!(r#"{{ "memory_size": {} }}"#, MEMORY_SIZE + 1);
        assert!(EmulatorConfig::from_json(&too_big).is_err());
    }

    #[test]
    fn test_load_address_must_fit() {
        let err = EmulatorConfig::from_json(r#"{ "memory_size": 256, "load_address": 256 }"#);
        assert!(matches!(err, Err(ConfigError::LoadAddressOutOfRange { .. })));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            EmulatorConfig::from_json("{ memory_size"),
            Err(ConfigError::Parse(_))
        ));
    }
}
