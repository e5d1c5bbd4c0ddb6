//! Configuration types shared across crates.

use crate::token::Role;
use crate::upload::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL used to build public file links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// When enabled, restrict it to scraper IPs at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Chunked upload policy handed to clients at init.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Part size in bytes chosen by the server.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Files larger than this (in MB) must use the chunked path.
    #[serde(default = "default_chunk_threshold_mb")]
    pub chunk_threshold_mb: u64,
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Recommended number of concurrent part uploads.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    /// Initial client backoff between failed part attempts.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Backoff ceiling.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// Attempts per part before the client gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_chunk_threshold_mb() -> u64 {
    95
}

fn default_session_ttl_secs() -> u64 {
    6 * 3600
}

fn default_max_concurrency() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    5
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_threshold_mb: default_chunk_threshold_mb(),
            session_ttl_secs: default_session_ttl_secs(),
            max_concurrency: default_max_concurrency(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl UploadConfig {
    /// Session lifetime as a Duration.
    pub fn session_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Threshold above which the single-request path is refused, in bytes.
    pub fn chunk_threshold_bytes(&self) -> u64 {
        self.chunk_threshold_mb.saturating_mul(1024 * 1024)
    }

    /// Retry advice snapshot.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_ms: self.retry_base_ms,
            max_ms: self.retry_max_ms,
            max_retries: self.max_retries,
        }
    }

    /// Validate upload policy.
    pub fn validate(&self) -> Result<(), String> {
        if !(crate::MIN_CHUNK_SIZE..=crate::MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(format!(
                "upload.chunk_size {} must be between {} and {}",
                self.chunk_size,
                crate::MIN_CHUNK_SIZE,
                crate::MAX_CHUNK_SIZE
            ));
        }
        if !(1..=crate::MAX_SESSION_TTL_SECS).contains(&self.session_ttl_secs) {
            return Err(format!(
                "upload.session_ttl_secs {} must be between 1 and {}",
                self.session_ttl_secs,
                crate::MAX_SESSION_TTL_SECS
            ));
        }
        if self.max_concurrency == 0 {
            return Err("upload.max_concurrency cannot be 0".to_string());
        }
        if self.retry_base_ms > self.retry_max_ms {
            return Err(format!(
                "upload.retry_base_ms {} exceeds upload.retry_max_ms {}",
                self.retry_base_ms, self.retry_max_ms
            ));
        }
        Ok(())
    }
}

/// Limits for one role. `None` means unlimited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleQuota {
    /// Largest single file.
    #[serde(default)]
    pub max_upload_bytes: Option<u64>,
    /// Total bytes of finalized files.
    #[serde(default)]
    pub storage_bytes: Option<u64>,
    /// Bytes finalized in the trailing 24 hours.
    #[serde(default)]
    pub daily_upload_bytes: Option<u64>,
}

/// Per-role quotas.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_user_quota")]
    pub user: RoleQuota,
    #[serde(default)]
    pub admin: RoleQuota,
}

fn default_user_quota() -> RoleQuota {
    RoleQuota {
        max_upload_bytes: Some(10 * 1024 * 1024 * 1024),
        storage_bytes: None,
        daily_upload_bytes: None,
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            user: default_user_quota(),
            admin: RoleQuota::default(),
        }
    }
}

impl QuotaConfig {
    /// Quota for a role.
    pub fn for_role(&self, role: Role) -> &RoleQuota {
        match role {
            Role::User => &self.user,
            Role::Admin => &self.admin,
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// Process-local memory. Contents are lost on restart.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, SQLite cannot cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Expiry sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Run the sweep in the background (default: true).
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_gc_interval_secs")]
    pub interval_secs: u64,
    /// Expired sessions fetched per batch.
    #[serde(default = "default_gc_batch_size")]
    pub batch_size: u32,
    /// Per-batch timeout in seconds.
    #[serde(default = "default_gc_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// Maximum batches per sweep run.
    #[serde(default = "default_max_gc_iterations")]
    pub max_iterations: u64,
    /// Also delete part namespaces that have no session row.
    #[serde(default = "default_sweep_orphans")]
    pub sweep_orphans: bool,
    /// Minimum age of an orphaned part namespace before it is deleted.
    #[serde(default = "default_orphan_grace_secs")]
    pub orphan_grace_secs: u64,
}

fn default_gc_enabled() -> bool {
    true
}

fn default_gc_interval_secs() -> u64 {
    300
}

fn default_gc_batch_size() -> u32 {
    100
}

fn default_gc_batch_timeout_secs() -> u64 {
    120
}

fn default_max_gc_iterations() -> u64 {
    1_000
}

fn default_sweep_orphans() -> bool {
    true
}

fn default_orphan_grace_secs() -> u64 {
    3600
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: default_gc_enabled(),
            interval_secs: default_gc_interval_secs(),
            batch_size: default_gc_batch_size(),
            batch_timeout_secs: default_gc_batch_timeout_secs(),
            max_iterations: default_max_gc_iterations(),
            sweep_orphans: default_sweep_orphans(),
            orphan_grace_secs: default_orphan_grace_secs(),
        }
    }
}

impl GcConfig {
    /// Interval between background sweeps.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Per-batch timeout.
    pub fn batch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.batch_timeout_secs)
    }

    /// Orphan grace period.
    pub fn orphan_grace(&self) -> Duration {
        Duration::seconds(i64::try_from(self.orphan_grace_secs).unwrap_or(i64::MAX))
    }

    /// Validate sweep configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.interval_secs == 0 {
            return Err("gc.interval_secs cannot be 0 when the sweep is enabled".to_string());
        }
        if self.batch_size == 0 {
            return Err("gc.batch_size cannot be 0".to_string());
        }
        if self.orphan_grace_secs > i64::MAX as u64 {
            return Err(format!(
                "gc.orphan_grace_secs {} exceeds maximum value {}",
                self.orphan_grace_secs,
                i64::MAX
            ));
        }
        Ok(())
    }
}

/// Rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default)]
    pub enabled: bool,
    /// Requests per minute per client IP.
    #[serde(default = "default_ip_requests_per_minute")]
    pub ip_requests_per_minute: u32,
    /// Requests per minute per authenticated user.
    #[serde(default = "default_user_requests_per_minute")]
    pub user_requests_per_minute: u32,
    /// Burst size (allows temporary burst above rate limit).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Forwarded headers are only honored for connections from these addresses.
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of tracked keys before new keys are rejected.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Seconds between cleanup sweeps of stale entries.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Entries idle longer than this are evicted during cleanup.
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
}

fn default_ip_requests_per_minute() -> u32 {
    120
}

fn default_user_requests_per_minute() -> u32 {
    1200
}

fn default_burst_size() -> u32 {
    30
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_entry_ttl_secs() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip_requests_per_minute: default_ip_requests_per_minute(),
            user_requests_per_minute: default_user_requests_per_minute(),
            burst_size: default_burst_size(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            entry_ttl_secs: default_entry_ttl_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration.
    /// Returns warnings for insecure-but-allowed settings and an error for unusable ones.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0".to_string());
        }

        if self.ip_requests_per_minute == 0 || self.user_requests_per_minute == 0 {
            return Err("rate_limit requests_per_minute values must be positive".to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers; \
                 clients can spoof their IP address and bypass per-IP limits"
                    .to_string(),
            );
        }

        if self.entry_ttl_secs < 120 {
            warnings.push(format!(
                "rate_limit.entry_ttl_secs={} is very short; entries may be evicted \
                 before limits reset (recommended minimum: 120)",
                self.entry_ttl_secs
            ));
        }

        Ok(warnings)
    }
}

/// Bootstrap admin token configuration.
///
/// The token is created for a dedicated admin user on startup. If the hash
/// changes between restarts the previous bootstrap token is revoked.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// SHA256 hex of the admin token. No bootstrap token when absent.
    pub token_hash: Option<String>,
    /// Scopes for the admin token (default: ["admin"]).
    pub token_scopes: Option<Vec<String>>,
    /// Description for the admin token.
    pub token_description: Option<String>,
}

impl AdminConfig {
    /// A test configuration with a deterministic hash.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: Some(
                "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5".to_string(),
            ),
            token_scopes: None,
            token_description: Some("Test admin token".to_string()),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub gc: GcConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** The background sweep is disabled so tests drive it
    /// explicitly.
    pub fn for_testing() -> Self {
        Self {
            upload: UploadConfig {
                chunk_size: 64 * 1024,
                ..UploadConfig::default()
            },
            gc: GcConfig {
                enabled: false,
                ..GcConfig::default()
            },
            admin: AdminConfig::for_testing(),
            ..Self::default()
        }
    }

    /// Validate every section, returning warnings that do not prevent startup.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.upload.validate()?;
        self.gc.validate()?;
        self.rate_limit.validate()
    }
}
