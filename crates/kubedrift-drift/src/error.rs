//! Error types for drift recording.

use kubedrift_store::{KeyError, StoreError};
use thiserror::Error;

pub type RecordResult<T> = Result<T, RecordError>;

#[derive(Debug, Error)]
pub enum RecordError {
    /// The resource lacks an identity segment (name or uid).
    #[error("cannot key resource: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
