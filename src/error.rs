//! Error types and result handling for worklock.
//!
//! This module defines the core error type [`Error`] used throughout the crate,
//! as well as the [`Result`] alias for fallible operations.
//!
//! Absence and state mismatch are expected outcomes in a concurrent queue and
//! are represented as values (`None`, `false`, or a
//! [`StatusUpdateResult`](crate::types::StatusUpdateResult) variant), never as
//! errors. Only infrastructure failures and caller mistakes surface here.
use crate::types::ProcessingStatus;
use thiserror::Error;

/// Result type for worklock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for worklock operations.
///
/// This enum covers all error cases that can occur when using worklock,
/// including database connectivity, configuration, serialization, and
/// queue-specific operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (SQLx errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or parsing failed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Required configuration field is missing
    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },

    /// Configuration field has an invalid value
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Batch insert reported fewer rows than items supplied
    #[error("Partial insert: expected {expected} rows, datastore acknowledged {actual}")]
    PartialInsert { expected: usize, actual: usize },

    /// `complete` was called with a status that is not terminal
    #[error("Status '{status}' is not a result status")]
    InvalidResultStatus { status: ProcessingStatus },

    /// A persisted status string does not map to any known status
    #[error("Unknown processing status '{value}' read from the datastore")]
    UnknownStatus { value: String },
}
