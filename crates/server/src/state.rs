//! Application state shared across handlers.

use crate::coordinator::UploadCoordinator;
use crate::ratelimit::RateLimitState;
use std::sync::Arc;
use std::time::Duration;
use vault_core::config::AppConfig;
use vault_metadata::MetadataStore;
use vault_storage::ObjectStore;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<AppConfig>,
    /// Storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload coordinator over the same storage and metadata.
    pub coordinator: UploadCoordinator,
    /// Rate limiter state.
    pub rate_limit: RateLimitState,
}

impl AppState {
    /// Build the state, rejecting unusable configuration. Warnings are
    /// logged.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self, String> {
        for warning in config.validate()? {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let rate_limit = RateLimitState::new(&config.rate_limit);
        let coordinator = UploadCoordinator::new(storage.clone(), metadata.clone(), &config);

        Ok(Self {
            config: Arc::new(config),
            storage,
            metadata,
            coordinator,
            rate_limit,
        })
    }

    /// Cleanup interval for the rate limiter, or `None` when it is disabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        self.rate_limit
            .is_enabled()
            .then(|| Duration::from_secs(self.config.rate_limit.cleanup_interval_secs.max(1)))
    }
}
