//! Upload coordinator errors.

use axum::http::StatusCode;
use vault_metadata::MetadataError;
use vault_storage::StorageError;

/// Failure of a coordinator operation.
///
/// Every variant carries a stable reason code (see [`UploadError::reason`])
/// that the HTTP layer returns and counts.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Malformed input. Nothing was changed.
    #[error("{0}")]
    Validation(String),

    /// The session belongs to someone else.
    #[error("access denied")]
    Forbidden,

    /// Unknown, expired or already finalized session.
    #[error("upload session not found")]
    NotFound,

    /// Not every part has been received. The session is kept.
    #[error("upload incomplete: {} part(s) missing", .missing.len())]
    IncompleteUpload { missing: Vec<u32> },

    /// The caller's role does not allow this much data.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A unique name (such as a vanity slug) is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata failure: {0}")]
    Metadata(MetadataError),
}

impl UploadError {
    /// Stable machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage_failure",
            Self::Metadata(_) => "metadata_failure",
        }
    }

    /// HTTP status the error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::IncompleteUpload { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::QuotaExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Storage(StorageError::Io(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) | Self::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MetadataError> for UploadError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::QuotaExceeded(message) => Self::QuotaExceeded(message),
            other => Self::Metadata(other),
        }
    }
}

impl From<vault_core::Error> for UploadError {
    fn from(e: vault_core::Error) -> Self {
        Self::Validation(e.to_string())
    }
}
