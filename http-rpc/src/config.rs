//! Configuration module for the RPC dispatcher.
//!
//! This module provides the [`RpcConfig`] struct for customizing dispatch behavior.
//!
//! # Example
//! ```rust,ignore
//! use http_rpc::RpcConfig;
//!
//! let config = RpcConfig::new()
//!     .with_prefix("/rpc")
//!     .with_max_input_size(512 * 1024)
//!     .with_debug_logging(true);
//! ```

use crate::router::check_segment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum input size (1 MiB).
pub const DEFAULT_MAX_INPUT_SIZE: usize = 1024 * 1024;

/// Dispatcher configuration.
///
/// All fields have sensible defaults. Use [`RpcConfig::default()`] to get the
/// default configuration.
///
/// # Fields
///
/// * `prefix` - Mount prefix prepended to every flattened route. Default: `""`.
///
/// * `max_input_size` - Maximum raw input size in bytes (POST body or the
///   decoded `input` query value). Requests exceeding this limit are rejected
///   with `PAYLOAD_TOO_LARGE`. Default: 1 MiB.
///
/// * `development_mode` - When false, internal (5xx) errors are redacted
///   before they reach the caller. Default: `cfg!(debug_assertions)`.
///
/// * `debug_logging` - Emit a trace for every dispatch stage. Default: false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Mount prefix for every route (default: "")
    pub prefix: String,
    /// Maximum input size in bytes (default: 1MB)
    pub max_input_size: usize,
    /// Expose internal error details to callers
    pub development_mode: bool,
    /// Enable per-stage dispatch tracing (default: false)
    pub debug_logging: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            development_mode: cfg!(debug_assertions),
            debug_logging: false,
        }
    }
}

impl RpcConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mount prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the maximum input size in bytes.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Enable or disable development mode.
    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }

    /// Enable or disable per-stage tracing.
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// The prefix must be empty, or start with `/` and consist of literal
    /// segments with no trailing `/`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_input_size == 0 {
            return Err(ConfigError::ZeroInputSize);
        }
        if self.prefix.is_empty() {
            return Ok(());
        }
        let Some(rest) = self.prefix.strip_prefix('/') else {
            return Err(ConfigError::InvalidPrefix {
                prefix: self.prefix.clone(),
                reason: "must start with '/'".to_string(),
            });
        };
        if rest.ends_with('/') || rest.is_empty() {
            return Err(ConfigError::InvalidPrefix {
                prefix: self.prefix.clone(),
                reason: "must not end with '/'".to_string(),
            });
        }
        for segment in rest.split('/') {
            check_segment(segment).map_err(|reason| ConfigError::InvalidPrefix {
                prefix: self.prefix.clone(),
                reason: format!("segment '{}' {}", segment, reason),
            })?;
        }
        Ok(())
    }
}

/// Configuration rejected by [`RpcConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_input_size` is zero
    #[error("max_input_size must be greater than 0")]
    ZeroInputSize,

    /// The mount prefix is malformed
    #[error("invalid prefix '{prefix}': {reason}")]
    InvalidPrefix {
        /// The rejected prefix
        prefix: String,
        /// What is wrong with it
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(RpcConfig::default().validate(), Ok(()));
        assert_eq!(RpcConfig::new().with_prefix("/api/rpc").validate(), Ok(()));
    }

    #[test]
    fn test_prefix_forms_rejected() {
        for prefix in ["rpc", "/rpc/", "/", "/a//b", "/{id}", "/:v"] {
            let err = RpcConfig::new().with_prefix(prefix).validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidPrefix { .. }),
                "prefix '{}' gave {:?}",
                prefix,
                err
            );
        }
    }

    #[test]
    fn test_zero_input_size_rejected() {
        let err = RpcConfig::new().with_max_input_size(0).validate().unwrap_err();
        assert_eq!(err, ConfigError::ZeroInputSize);
        assert_eq!(err.to_string(), "max_input_size must be greater than 0");
    }
}
