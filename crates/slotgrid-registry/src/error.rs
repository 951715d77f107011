//! Registry error types
//!
//! Only contract violations surface as errors. Staleness caused by
//! concurrent callers is logged and absorbed by the model.

use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Invalid node ID
    #[error("invalid node ID: {id}, reason: {reason}")]
    InvalidNodeId { id: String, reason: String },

    /// Invalid session ID
    #[error("invalid session ID: {id}, reason: {reason}")]
    InvalidSessionId { id: String, reason: String },

    /// Invalid slot ID
    #[error("invalid slot ID: {id}, reason: {reason}")]
    InvalidSlotId { id: String, reason: String },

    /// Node status rejected before reaching the registry
    #[error("invalid status for node {node_id}: {reason}")]
    InvalidNodeStatus { node_id: String, reason: String },
}

impl RegistryError {
    /// Create an invalid node status error
    pub fn invalid_node_status(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeStatus {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
