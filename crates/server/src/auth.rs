//! Authentication and authorization middleware.
//!
//! Clients authenticate with an opaque token, sent either as
//! `Authorization: Bearer <token>` or in the `vault_session` cookie set by
//! the web frontend. Only the SHA-256 of a token is stored.

use crate::coordinator::Uploader;
use crate::error::{ApiError, ApiResult};
use crate::ratelimit::UserIdExtension;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;
use vault_core::token::{Role, Token, TokenId, TokenScope, UserId, parse_scopes};
use vault_metadata::models::TokenRow;

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "vault_session";

/// Longest client-supplied trace ID kept, in characters.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-provided trace ID, truncated and stripped down to
    /// printable ASCII so it is safe to log.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// The validated token.
    pub token: Token,
    /// Role of the token's user.
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> UserId {
        self.token.user_id
    }

    /// The caller as seen by the upload coordinator.
    pub fn uploader(&self) -> Uploader {
        Uploader {
            id: self.token.user_id,
            role: self.role,
        }
    }

    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.token.has_scope(scope)
    }

    /// Require a specific scope, returning 403 if not present.
    pub fn require_scope(&self, scope: TokenScope) -> ApiResult<()> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("missing required scope: {scope}")))
        }
    }
}

/// Bearer token from the Authorization header. The scheme is
/// case-insensitive (RFC 6750).
fn extract_bearer_token(req: &Request) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_at_checked(7)?;
    scheme
        .eq_ignore_ascii_case("bearer ")
        .then(|| token.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Token from the header, falling back to the session cookie.
fn extract_token(req: &Request) -> Option<String> {
    extract_bearer_token(req).or_else(|| {
        CookieJar::from_headers(req.headers())
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Hash a token for storage lookup.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn token_from_row(row: TokenRow) -> ApiResult<Token> {
    let scopes = parse_scopes(&row.scopes).map_err(|e| {
        ApiError::Internal(format!("token {} has invalid scopes: {e}", row.token_id))
    })?;

    Ok(Token {
        id: TokenId::from(row.token_id),
        user_id: UserId::from(row.user_id),
        scopes,
        expires_at: row.expires_at,
        revoked_at: row.revoked_at,
        created_at: row.created_at,
        description: row.description,
    })
}

/// Resolve a presented token to its user. Unknown, expired and revoked
/// tokens are all rejected the same way.
async fn authenticate(state: &AppState, presented: &str) -> ApiResult<AuthenticatedUser> {
    let rejected = || ApiError::Unauthorized("invalid or expired token".to_string());

    let row = state
        .metadata
        .get_token_by_hash(&hash_token(presented))
        .await?
        .ok_or_else(rejected)?;
    let token = token_from_row(row)?;
    if !token.is_valid() {
        return Err(rejected());
    }

    let user = state
        .metadata
        .get_user(*token.user_id.as_uuid())
        .await?
        .ok_or_else(rejected)?;
    let role = Role::parse(&user.role)
        .map_err(|e| ApiError::Internal(format!("user {} has invalid role: {e}", user.user_id)))?;

    // Last-used tracking is best effort.
    let metadata = state.metadata.clone();
    let token_id = *token.id.as_uuid();
    tokio::spawn(async move {
        if let Err(e) = metadata
            .touch_token(token_id, OffsetDateTime::now_utc())
            .await
        {
            tracing::debug!(token_id = %token_id, error = %e, "Failed to update token last use");
        }
    });

    Ok(AuthenticatedUser { token, role })
}

/// Authentication middleware.
///
/// Requests without a token pass through unauthenticated and are rejected
/// by handlers that need a user. A token that is present but not valid is
/// rejected here with 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id, user_id = tracing::field::Empty);
    req.extensions_mut().insert(trace_id);

    if let Some(presented) = extract_token(&req) {
        let user = authenticate(&state, &presented).await?;
        span.record("user_id", tracing::field::display(user.user_id()));
        req.extensions_mut()
            .insert(UserIdExtension(user.user_id().to_string()));
        req.extensions_mut().insert(user);
    }

    Ok(next.run(req).instrument(span).await)
}

/// Require authentication (token must be present).
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
