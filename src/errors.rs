//! Error types shared across keyforge.
//!
//! Most failures in a run are recovered locally (bad amounts fall back to a
//! default, failed sessions are reported and skipped). What remains here is
//! what a caller can actually observe: configuration problems, an exhausted
//! session retry budget, and report persistence failures.

use thiserror::Error;

/// Errors produced by keyforge operations.
#[derive(Debug, Error)]
pub enum KeyforgeError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Session establishment failed on every attempt.
    #[error("session creation failed after {attempts} attempts: {reason}")]
    SessionFailed { attempts: u32, reason: String },

    /// Reading input or writing a report failed.
    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// A report could not be serialized.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Interactive input ended before a question was answered.
    #[error("input error: {0}")]
    InputError(String),
}

impl KeyforgeError {
    /// Returns true if the pipeline can report this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyforgeError::SessionFailed { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type KeyforgeResult<T> = Result<T, KeyforgeError>;
