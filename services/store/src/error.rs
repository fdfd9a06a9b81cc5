//! services/store/src/error.rs
//!
//! Defines the primary error type for the store service binary.

use crate::config::ConfigError;
use bookshelf_core::PortError;

/// The primary error type for the `store` service.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the storage port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
