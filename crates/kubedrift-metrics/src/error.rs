//! Error types for exposition decoding.

use thiserror::Error;

/// Result type alias for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A scrape body that could not be decoded.
///
/// Any decode error invalidates the whole body it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("scrape body is not valid UTF-8")]
    InvalidUtf8,

    #[error("text format parsing error in line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("text format parsing error in line {line}: unexpected end of input")]
    Truncated { line: usize },
}
