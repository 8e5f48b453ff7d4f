//! Configuration module for the Makai RPC runtime.
//!
//! This module defines the per-connection configuration. There is no file
//! or environment loading here: the runtime is embedded, so the embedder
//! owns flags and files and hands a validated [`ConnectionConfig`] to
//! [`crate::Connection::new`]. All values are validated before use.

use crate::error::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A trait for types that can be validated.
pub trait Validate {
    /// Validates that the configuration is correct.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the configuration is valid
    /// * `Err(ConfigError)` if the configuration is invalid
    fn validate(&self) -> ConfigResult<()>;
}

/// Byte-level framing discipline for a connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FramingKind {
    /// `Content-Length` header framing, as used by LSP.
    Header,
    /// Concatenated JSON values with boundaries found by incremental
    /// decoding. Suited to plain pipes and sockets.
    Raw,
}

impl Default for FramingKind {
    fn default() -> Self {
        Self::Header
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Framing discipline used by both directions of the stream
    pub framing: FramingKind,

    /// Method name of the cancellation notification, e.g. `$/cancelRequest`.
    /// When unset, no cancel notifications are sent and inbound ones are
    /// not recognized.
    pub cancel_method: Option<String>,

    /// Idle timeout in milliseconds. When set, the connection terminates
    /// with an idle-timeout error after this long with no inbound traffic,
    /// no pending outbound calls, and no in-flight inbound handlers.
    pub idle_timeout_ms: Option<u64>,

    /// Maximum message frame size in bytes
    pub max_frame_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            framing: FramingKind::default(),
            cancel_method: None,
            idle_timeout_ms: None,
            max_frame_bytes: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl ConnectionConfig {
    /// Sets the cancellation notification method name.
    pub fn with_cancel_method(mut self, method: impl Into<String>) -> Self {
        self.cancel_method = Some(method.into());
        self
    }

    /// Sets the framing discipline.
    pub fn with_framing(mut self, framing: FramingKind) -> Self {
        self.framing = framing;
        self
    }

    /// Sets the idle timeout in milliseconds.
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = Some(timeout_ms);
        self
    }
}

impl Validate for ConnectionConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_frame_bytes must be greater than 0".to_string(),
            ));
        }

        if let Some(ms) = self.idle_timeout_ms {
            if ms == 0 {
                return Err(ConfigError::ValidationError(
                    "idle_timeout_ms must be greater than 0 when set".to_string(),
                ));
            }
        }

        if let Some(method) = &self.cancel_method {
            if method.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "cancel_method cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
