//! Upload handlers.
//!
//! Every chunked operation lives on `/upload` and is selected by the
//! `action` query parameter. A `POST /upload` without an action is the
//! single-request multipart upload.

use crate::auth::{AuthenticatedUser, require_auth};
use crate::coordinator::UploadError;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use vault_core::token::TokenScope;
use vault_core::upload::{InitUploadRequest, RetryPolicy, UploadId, UploadIdRequest, UploadOptions};

/// Largest JSON body accepted by init, complete and abort.
const MAX_JSON_BODY_SIZE: usize = 64 * 1024;

/// Query parameters of `/upload`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub action: Option<String>,
    pub upload_id: Option<String>,
    pub part: Option<String>,
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::Upload(UploadError::Validation(message.into()))
}

/// Authenticated caller holding the upload scope.
fn uploader(req: &Request) -> ApiResult<AuthenticatedUser> {
    let auth = require_auth(req)?.clone();
    auth.require_scope(TokenScope::Upload)?;
    Ok(auth)
}

fn parse_upload_id(raw: Option<&str>) -> ApiResult<UploadId> {
    let raw = raw.ok_or_else(|| invalid("uploadId is required"))?;
    UploadId::parse(raw).map_err(|e| invalid(e.to_string()))
}

async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| invalid(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid(format!("invalid JSON: {e}")))
}

/// Session ID from the query string, or else from a `{ uploadId }` body.
async fn session_id(query: &UploadQuery, req: Request) -> ApiResult<UploadId> {
    match query.upload_id.as_deref() {
        Some(raw) => parse_upload_id(Some(raw)),
        None => {
            let body: UploadIdRequest = read_json(req).await?;
            parse_upload_id(Some(&body.upload_id))
        }
    }
}

/// POST /upload - init, complete, abort, or a single-request upload.
pub async fn post_upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    req: Request,
) -> ApiResult<Response> {
    let auth = uploader(&req)?;

    match query.action.as_deref() {
        Some("init") => init_upload(&state, &auth, req).await,
        Some("complete") => {
            let upload_id = session_id(&query, req).await?;
            complete_upload(&state, &auth, upload_id).await
        }
        Some("abort") => {
            let upload_id = session_id(&query, req).await?;
            abort_upload(&state, &auth, upload_id).await
        }
        None => single_upload(&state, &auth, req).await,
        Some(other) => Err(invalid(format!("unknown action '{other}'"))),
    }
}

/// PUT /upload?action=part - store one part.
#[tracing::instrument(skip(state, req), fields(upload_id = ?query.upload_id, part = ?query.part))]
pub async fn put_upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    req: Request,
) -> ApiResult<Response> {
    let auth = uploader(&req)?;
    if query.action.as_deref() != Some("part") {
        return Err(invalid("PUT /upload requires action=part"));
    }

    let upload_id = parse_upload_id(query.upload_id.as_deref())?;
    let index: u32 = query
        .part
        .as_deref()
        .ok_or_else(|| invalid("part is required"))?
        .parse()
        .map_err(|_| invalid("part must be a non-negative integer"))?;

    // No part is ever larger than the configured chunk size.
    let limit = usize::try_from(state.config.upload.chunk_size).unwrap_or(usize::MAX);
    let data = axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|_| invalid(format!("part body exceeds the chunk size of {limit} bytes")))?;

    let receipt = state
        .coordinator
        .upload_part(auth.uploader(), upload_id, index, data)
        .await?;
    Ok(Json(receipt).into_response())
}

/// GET /upload?action=status - received parts of a session.
pub async fn get_upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    req: Request,
) -> ApiResult<Response> {
    let auth = uploader(&req)?;
    if query.action.as_deref() != Some("status") {
        return Err(invalid("GET /upload requires action=status"));
    }

    let upload_id = parse_upload_id(query.upload_id.as_deref())?;
    let status = state.coordinator.status(auth.user_id(), upload_id).await?;
    Ok(Json(status).into_response())
}

#[tracing::instrument(skip_all, fields(owner = %auth.user_id()))]
async fn init_upload(state: &AppState, auth: &AuthenticatedUser, req: Request) -> ApiResult<Response> {
    let body: InitUploadRequest = read_json(req).await?;
    let response = state.coordinator.init(auth.uploader(), body).await?;

    let headers = [
        ("Upload-Chunk-Size", response.chunk_size.to_string()),
        ("Upload-Chunk-TTL", response.ttl_seconds.to_string()),
        ("Upload-Retry-Base-Ms", response.retry.base_ms.to_string()),
        ("Upload-Retry-Max-Ms", response.retry.max_ms.to_string()),
        ("Upload-Retry-Max-Retries", response.retry.max_retries.to_string()),
    ];
    Ok((StatusCode::OK, headers, Json(response)).into_response())
}

async fn complete_upload(
    state: &AppState,
    auth: &AuthenticatedUser,
    upload_id: UploadId,
) -> ApiResult<Response> {
    let record = state.coordinator.complete(auth.uploader(), upload_id).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

async fn abort_upload(
    state: &AppState,
    auth: &AuthenticatedUser,
    upload_id: UploadId,
) -> ApiResult<Response> {
    state.coordinator.abort(auth.user_id(), upload_id).await?;
    Ok(Json(serde_json::json!({ "success": true })).into_response())
}

/// The `file` part of a multipart upload.
struct FilePart {
    name: String,
    content_type: Option<String>,
    data: Bytes,
}

#[tracing::instrument(skip_all, fields(owner = %auth.user_id()))]
async fn single_upload(state: &AppState, auth: &AuthenticatedUser, req: Request) -> ApiResult<Response> {
    let threshold = state.config.upload.chunk_threshold_bytes();
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| invalid(format!("expected multipart/form-data: {}", e.body_text())))?;

    let mut file = None;
    let mut options = UploadOptions::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid(format!("malformed multipart body: {}", e.body_text())))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let mut buffer = BytesMut::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| invalid(format!("failed to read file: {}", e.body_text())))?
                {
                    if (buffer.len() + chunk.len()) as u64 > threshold {
                        return Err(invalid(format!(
                            "files larger than {threshold} bytes must use the chunked upload"
                        )));
                    }
                    buffer.extend_from_slice(&chunk);
                }
                file = Some(FilePart {
                    name,
                    content_type,
                    data: buffer.freeze(),
                });
            }
            Some("metadata") => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| invalid(format!("failed to read metadata: {}", e.body_text())))?
                {
                    if buffer.len() + chunk.len() > MAX_JSON_BODY_SIZE {
                        return Err(invalid(format!(
                            "metadata field exceeds {MAX_JSON_BODY_SIZE} bytes"
                        )));
                    }
                    buffer.extend_from_slice(&chunk);
                }
                options = serde_json::from_slice(&buffer)
                    .map_err(|e| invalid(format!("invalid metadata JSON: {e}")))?;
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| invalid("missing 'file' field"))?;
    let record = state
        .coordinator
        .upload_single(
            auth.uploader(),
            &file.name,
            file.content_type,
            file.data,
            options,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// Upload policy advertised to clients.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfigResponse {
    pub chunk_size: u64,
    pub chunk_threshold_bytes: u64,
    pub max_concurrency: u32,
    pub ttl_seconds: u64,
    pub retry: RetryPolicy,
}

/// GET /upload/config - chunking policy for clients.
pub async fn get_upload_config(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<UploadConfigResponse>> {
    uploader(&req)?;
    let config = &state.config.upload;

    Ok(Json(UploadConfigResponse {
        chunk_size: config.chunk_size,
        chunk_threshold_bytes: config.chunk_threshold_bytes(),
        max_concurrency: config.max_concurrency,
        ttl_seconds: config.session_ttl_secs,
        retry: config.retry_policy(),
    }))
}
