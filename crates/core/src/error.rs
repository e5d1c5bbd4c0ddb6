//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid chunk size: {size} (must be between {min} and {max})")]
    InvalidChunkSize { size: u64, min: u64, max: u64 },

    #[error("too many parts: {parts} (maximum {max})")]
    TooManyParts { parts: u64, max: u64 },

    #[error("upload session error: {0}")]
    UploadSession(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid slug: {0}")]
    InvalidSlug(String),

    #[error("invalid mime type: {0}")]
    InvalidMimeType(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
