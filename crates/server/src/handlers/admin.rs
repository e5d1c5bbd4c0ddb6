//! Administrative endpoints.

use crate::auth::require_auth;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::sweep::{SweepStats, sweep_expired};
use axum::Json;
use axum::extract::{Request, State};
use serde::Serialize;
use vault_core::token::TokenScope;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health - Health check.
///
/// Unauthenticated so probes and load balancers can reach it. Fails when
/// either the metadata store or the storage backend is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /admin/sweep - Run the expiry sweep now.
pub async fn trigger_sweep(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<SweepStats>> {
    let auth = require_auth(&req)?;
    auth.require_scope(TokenScope::Admin)?;

    tracing::info!(user_id = %auth.user_id(), "Manual sweep requested");
    let stats = sweep_expired(&state.coordinator, &state.config.gc).await?;
    Ok(Json(stats))
}
