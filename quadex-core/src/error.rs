//! Error types for quadex-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A tuple is missing its subject, predicate or object
    #[error("Malformed tuple: {0}")]
    MalformedTuple(String),

    /// Operation does not fit the relation's mode (triples vs quads)
    #[error("Incompatible mode: {0}")]
    IncompatibleMode(String),

    /// Encoded key bytes could not be decoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Packed statement value byte could not be decoded
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The key has no successor (empty or every byte is 0xFF)
    #[error("No successor for key of length {0}")]
    NoSuccessor(usize),

    /// Unknown key order name
    #[error("Unknown key order: {0}")]
    UnknownKeyOrder(String),
}

impl Error {
    /// Create a malformed tuple error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedTuple(msg.into())
    }

    /// Create an incompatible mode error
    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::IncompatibleMode(msg.into())
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create an invalid value error
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}
