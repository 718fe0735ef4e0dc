//! Storage layer error types
//!
//! Defines all errors that can occur while routing, validating, reading or
//! writing datasets.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Malformed or contradictory request shape
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No backend is registered for the classification
    #[error("Unsupported classification: {0}")]
    UnsupportedClassification(String),

    /// A merge produced a non-unique time index
    #[error("Duplicated time index: {0}")]
    DuplicateIndex(String),

    /// Requested dataset does not exist on disk
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Panel shard decoded without its symbol order
    #[error("Missing symbol order for panel data: {0}")]
    MissingSymbols(String),

    /// Stored data does not match its metadata
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
