//! Error types for asha-core

use thiserror::Error;

/// Result type alias using asha-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in asha-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local persistence rejected a write. Fatal to the submit call that
    /// caused it; the caller must surface it instead of dropping data.
    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    /// Local persistence could not be read. The sync engine skips the
    /// current pass and waits for the next trigger.
    #[error("Storage read failed: {0}")]
    StorageRead(String),

    /// Remote endpoint unreachable, or the request timed out. Transient;
    /// the submission stays retry-eligible.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote endpoint returned a non-success outcome. Treated like a
    /// network failure for retry purposes.
    #[error("Remote rejected submission (HTTP {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Submission not found
    #[error("Submission not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
