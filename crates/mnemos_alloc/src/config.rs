//! # Memory Configuration
//!
//! Arena and pool sizes, loaded once at startup from a TOML file.
//!
//! ```toml
//! [linear]
//! capacity = 1048576
//!
//! [stack]
//! capacity = 262144
//!
//! [pool]
//! capacity = 4096
//! ```
//!
//! Every section is optional; missing sections fall back to [`Default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};

/// Sizing for bump allocators (`LinearAllocator`, `SafeAllocator`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    /// Initial bump buffer size in bytes. May be zero: a `SafeAllocator`
    /// then learns its size from the first cycle's overflow.
    pub capacity: usize,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self { capacity: 64 * 1024 }
    }
}

/// Sizing for scoped stack buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Total bytes shared by all frames of one buffer.
    pub capacity: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self { capacity: 256 * 1024 }
    }
}

/// Sizing for fixed-capacity pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of slots in a fixed pool. Must be non-zero.
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Top-level memory configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Bump allocator sizing.
    pub linear: LinearConfig,
    /// Scoped stack buffer sizing.
    pub stack: StackConfig,
    /// Fixed pool sizing.
    pub pool: PoolConfig,
}

impl MemoryConfig {
    /// Server preset: sized so a 60Hz tick never touches the overflow heap
    /// after warm-up.
    ///
    /// - 4 MiB bump arena per cycle
    /// - 1 MiB of scoped call-tree scratch
    /// - 16K pooled objects
    #[must_use]
    pub const fn production() -> Self {
        Self {
            linear: LinearConfig {
                capacity: 4 * 1024 * 1024,
            },
            stack: StackConfig {
                capacity: 1024 * 1024,
            },
            pool: PoolConfig { capacity: 16_384 },
        }
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Parse`] for malformed TOML and
    /// [`MemoryError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Io`] if the file cannot be read, otherwise
    /// the same errors as [`MemoryConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MemoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            linear = config.linear.capacity,
            stack = config.stack.capacity,
            pool = config.pool.capacity,
            "memory configuration loaded"
        );
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the pool capacity is zero
    /// or a byte size cannot be represented as an allocation layout.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.pool.capacity == 0 {
            return Err(MemoryError::InvalidConfig(
                "pool.capacity must be greater than zero".to_string(),
            ));
        }
        for (name, bytes) in [
            ("linear.capacity", self.linear.capacity),
            ("stack.capacity", self.stack.capacity),
        ] {
            if bytes > isize::MAX as usize {
                return Err(MemoryError::InvalidConfig(format!(
                    "{name} = {bytes} exceeds isize::MAX"
                )));
            }
        }
        Ok(())
    }
}
