//! Configuration error module.
//!
//! This module defines error types that may occur during validation of
//! connection configuration.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Error when a configuration value fails validation.
    #[error("Validation error: {0}")]
    ValidationError(String),
}
