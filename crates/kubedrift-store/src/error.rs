//! Error types for the record store.

use thiserror::Error;

use crate::key::KeyError;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// `Open` is fatal: the daemon refuses to start without its store.
/// Everything else is scoped to the single call that raised it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Encode(String),

    #[error("failed to decode value at {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error(transparent)]
    Key(#[from] KeyError),
}
