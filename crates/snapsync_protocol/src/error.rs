//! Error types for wire encoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Input bytes were not a valid message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A field held a value outside its domain.
    #[error("invalid value for '{field}': {value}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

impl ProtocolError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }
}
