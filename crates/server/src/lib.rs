//! HTTP server for the vault's chunked upload service.
//!
//! This crate provides:
//! - Upload sessions: init, part upload, status, complete, abort
//! - Single-request multipart uploads for small files
//! - Quota checks and file record finalization
//! - The expiry sweep for abandoned sessions and orphaned parts
//! - Token authentication, rate limiting and Prometheus metrics

pub mod auth;
pub mod bootstrap;
pub mod coordinator;
pub mod error;
pub mod finalize;
pub mod handlers;
pub mod metrics;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod sweep;

pub use auth::TraceId;
pub use coordinator::{UploadCoordinator, UploadError, Uploader};
pub use error::ApiError;
pub use ratelimit::{RateLimitState, UserIdExtension};
pub use routes::create_router;
pub use state::AppState;
pub use sweep::{SweepStats, sweep_expired};
