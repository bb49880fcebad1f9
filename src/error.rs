//! Error types for the signal pipeline and its configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by signal generation and filtering.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalError {
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("filter design failed: {0}")]
    FilterDesign(String),
}

impl SignalError {
    pub(crate) fn parameter(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors raised while loading, saving or validating a pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] SignalError),
}
