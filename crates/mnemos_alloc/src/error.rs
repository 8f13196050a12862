//! # Memory Error Types
//!
//! Recoverable errors raised while setting up allocators.
//!
//! Running out of arena space is not an error: bump and pool allocators
//! report it with `None`. Contract violations (freeing a foreign pointer,
//! resizing a buffer with live frames) are `debug_assert!`s.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while configuring the memory subsystem.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration text is not valid TOML for [`crate::MemoryConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration file {}: {source}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for memory subsystem setup.
pub type MemoryResult<T> = Result<T, MemoryError>;
