//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::{ip_rate_limit_middleware, user_rate_limit_middleware};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check (unauthenticated for probes)
        .route("/health", get(handlers::health_check))
        // Upload protocol, dispatched on ?action=
        .route(
            "/upload",
            post(handlers::post_upload)
                .put(handlers::put_upload)
                .get(handlers::get_upload)
                // Handlers enforce their own limits: chunk size for parts,
                // the chunking threshold for multipart bodies.
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/upload/config", get(handlers::get_upload_config))
        // Admin endpoints (require the admin scope)
        .route("/admin/sweep", post(handlers::trigger_sweep));

    // When enabled, /metrics must be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let rate_limit_state = state.rate_limit.clone();

    // Order of execution: TraceLayer -> IP rate limit -> Auth -> user rate limit -> Handler
    router
        .layer(middleware::from_fn_with_state(
            rate_limit_state.clone(),
            user_rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
