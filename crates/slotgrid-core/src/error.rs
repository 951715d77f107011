//! Error types for slotgrid
//!
//! Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for slotgrid core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Slotgrid core error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Configuration read failed: {path}, reason: {reason}")]
    ConfigReadFailed { path: String, reason: String },

    #[error("Configuration parse failed: {reason}")]
    ConfigParseFailed { reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is caused by the operator's configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. }
                | Self::ConfigReadFailed { .. }
                | Self::ConfigParseFailed { .. }
        )
    }
}
