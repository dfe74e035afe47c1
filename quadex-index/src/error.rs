//! Error types for the index crate

use thiserror::Error;

/// Result type for relation operations
pub type Result<T> = std::result::Result<T, RelationError>;

/// Errors that can occur in relation operations
#[derive(Error, Debug)]
pub enum RelationError {
    /// Underlying sorted index failure
    #[error("Index error: {0}")]
    Index(String),

    /// Index is not registered with the index manager
    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    /// Index is already registered
    #[error("Index already exists: {0}")]
    AlreadyExists(String),

    /// Invalid relation configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Caller supplied data the relation cannot accept
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Write-write conflict that the resolver could not reconcile
    #[error("Validation failed: write-write conflict on key {key}")]
    ValidationFailed { key: String },

    /// A per-index write task panicked
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// Config (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Core error wrapper
    #[error("Core error: {0}")]
    Core(#[from] quadex_core::Error),
}

impl RelationError {
    /// Create an index error
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Create an unknown index error
    pub fn unknown_index(name: impl Into<String>) -> Self {
        Self::UnknownIndex(name.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a validation failure for a conflicting key
    pub fn conflict(key: &[u8]) -> Self {
        let hex: String = key.iter().map(|b| format!("{b:02x}")).collect();
        Self::ValidationFailed { key: hex }
    }

    /// Whether this error reports an operation on the wrong relation mode
    pub fn is_incompatible_mode(&self) -> bool {
        matches!(self, Self::Core(quadex_core::Error::IncompatibleMode(_)))
    }
}
