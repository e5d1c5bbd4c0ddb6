//! API error types.

use crate::coordinator::UploadError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Part indices still missing, for incomplete uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u32>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("storage error: {0}")]
    Storage(#[from] vault_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] vault_metadata::MetadataError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
            Self::Upload(e) => e.reason(),
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upload(e) => e.status_code(),
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(e) => match e {
                vault_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                vault_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        if let Self::Upload(e) = &self {
            crate::metrics::record_upload_error(code);
            if status.is_server_error() {
                tracing::error!(reason = code, error = %e, "Upload operation failed");
            } else {
                tracing::debug!(reason = code, error = %e, "Upload request rejected");
            }
        } else if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        }

        let missing = match &self {
            Self::Upload(UploadError::IncompleteUpload { missing }) => Some(missing.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            code: code.to_string(),
            message: self.to_string(),
            missing,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_errors_keep_their_status() {
        let err = ApiError::from(UploadError::QuotaExceeded("too big".to_string()));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code(), "quota_exceeded");

        let err = ApiError::from(UploadError::NotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_incomplete_upload_body_lists_missing_parts() {
        let response = ApiError::from(UploadError::IncompleteUpload {
            missing: vec![1, 3],
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "incomplete_upload");
        assert_eq!(json["missing"], serde_json::json!([1, 3]));
    }

    #[tokio::test]
    async fn test_plain_errors_omit_missing() {
        let response = ApiError::Unauthorized("no token".to_string()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "unauthorized");
        assert!(json.get("missing").is_none());
    }
}
