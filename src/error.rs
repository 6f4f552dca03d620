//! Error types for wikilite
//!
//! This module provides error handling for all wikilite operations,
//! including vector codecs, distance computation, storage and embedding.

use thiserror::Error;

/// Main error type for wikilite operations
#[derive(Error, Debug)]
pub enum WikiliteError {
    /// Vector or byte length disagreement in distance/codec operations
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Byte slice cannot be decoded as a float32 array
    #[error("malformed vector blob: length {0} is not a multiple of 4")]
    MalformedVector(usize),

    /// Article or vector absent from the store
    #[error("not found: {0}")]
    NotFound(String),

    /// Unknown ANN quantization mode
    #[error("invalid ANN mode: {0}")]
    InvalidAnnMode(String),

    /// ANN size precondition violated (mrl mode requires a positive size)
    #[error("invalid ANN size: mrl mode requires annSize > 0")]
    InvalidAnnSize,

    /// Embedding generation errors
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// SQLite database errors
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Candle ML framework errors
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for wikilite operations
pub type Result<T> = std::result::Result<T, WikiliteError>;

impl From<anyhow::Error> for WikiliteError {
    fn from(err: anyhow::Error) -> Self {
        WikiliteError::Embedding(err.to_string())
    }
}
