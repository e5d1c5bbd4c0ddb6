//! Token-bucket rate limiting.
//!
//! Two keyed buckets guard the API:
//! - per client IP, checked before authentication
//! - per authenticated user, checked after authentication
//!
//! Entry counts are capped and idle entries are evicted by a background
//! task, so a flood of distinct keys cannot grow memory without bound.
//!
//! Forwarded headers (X-Forwarded-For, X-Real-IP) are ignored unless the
//! connection comes from a configured trusted proxy.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
};
use ipnet::IpNet;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use vault_core::config::RateLimitConfig;

type KeyedLimiter =
    RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

/// Evictions below this share of entries do not trigger a limiter rebuild.
const REBUILD_EVICTION_FRACTION: f64 = 0.10;

/// Evictions at or above this count always trigger a rebuild.
const REBUILD_EVICTION_MIN_COUNT: usize = 100;

/// A rebuild happens at least this often while evictions occur.
const REBUILD_MIN_INTERVAL: Duration = Duration::from_secs(300);

/// Suggested wait when a bucket refuses new keys.
const AT_CAPACITY_RETRY_SECS: u64 = 60;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!("rate limiter lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!("rate limiter lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// One keyed limiter plus the bookkeeping needed to evict idle keys.
///
/// governor's keyed state cannot drop individual keys, so eviction rebuilds
/// the limiter, which resets every key's budget. Rebuilds are therefore
/// batched.
struct KeyedBucket {
    label: &'static str,
    quota: Quota,
    per_minute: u32,
    limiter: RwLock<KeyedLimiter>,
    last_access: DashMap<String, Instant>,
    last_rebuild: RwLock<Instant>,
    capacity_warned: AtomicBool,
}

impl KeyedBucket {
    fn new(label: &'static str, per_minute: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(rate).allow_burst(burst);
        Self {
            label,
            quota,
            per_minute: rate.get(),
            limiter: RwLock::new(RateLimiter::dashmap(quota)),
            last_access: DashMap::new(),
            last_rebuild: RwLock::new(Instant::now()),
            capacity_warned: AtomicBool::new(false),
        }
    }

    fn check(&self, key: &str, max_entries: u32) -> Result<(), RateLimitError> {
        let now = Instant::now();

        // len() must be read before taking an entry lock; DashMap can deadlock
        // otherwise. The race only lets the map overshoot by a few entries.
        let current_len = self.last_access.len();
        match self.last_access.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(now);
            }
            Entry::Vacant(_) if current_len >= max_entries as usize => {
                if !self.capacity_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        bucket = self.label,
                        current_entries = current_len,
                        max_entries,
                        "Rate limiter at capacity, rejecting new keys"
                    );
                }
                return Err(RateLimitError {
                    retry_after_secs: AT_CAPACITY_RETRY_SECS,
                    limit: self.per_minute,
                    reason: RateLimitReason::AtCapacity,
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }

        let limiter = read_lock(&self.limiter);
        limiter.check_key(&key.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
            RateLimitError {
                retry_after_secs: wait.as_secs() + 1,
                limit: self.per_minute,
                reason: RateLimitReason::RateLimited,
            }
        })
    }

    /// Evict keys idle longer than `ttl`. Returns how many were removed.
    fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<String> = self
            .last_access
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        // remove_if re-checks so a key touched after collection survives.
        let evicted = stale
            .iter()
            .filter(|key| {
                self.last_access
                    .remove_if(*key, |_, seen| now.duration_since(*seen) > ttl)
                    .is_some()
            })
            .count();

        if evicted == 0 {
            return 0;
        }

        self.capacity_warned.store(false, Ordering::Relaxed);
        let before = self.last_access.len() + evicted;
        let threshold = ((before as f64 * REBUILD_EVICTION_FRACTION) as usize)
            .max(REBUILD_EVICTION_MIN_COUNT);
        let overdue = now.duration_since(*read_lock(&self.last_rebuild)) >= REBUILD_MIN_INTERVAL;

        if evicted >= threshold || overdue {
            *write_lock(&self.limiter) = RateLimiter::dashmap(self.quota);
            *write_lock(&self.last_rebuild) = Instant::now();
            tracing::debug!(
                bucket = self.label,
                evicted,
                remaining = self.last_access.len(),
                "Rebuilt rate limiter after cleanup"
            );
        }

        evicted
    }
}

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Which peers may set forwarded headers.
#[derive(Clone, Debug)]
enum TrustedProxies {
    None,
    All,
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        match proxies {
            [] => Self::None,
            [only] if only == "*" => Self::All,
            _ => Self::List(
                proxies
                    .iter()
                    .filter_map(|p| {
                        let parsed = if p.contains('/') {
                            p.parse::<IpNet>().map(TrustedEntry::Cidr).map_err(|e| e.to_string())
                        } else {
                            p.parse::<IpAddr>().map(TrustedEntry::Ip).map_err(|e| e.to_string())
                        };
                        parsed
                            .inspect_err(|e| {
                                tracing::warn!("Invalid entry in trusted_proxies: '{p}': {e}")
                            })
                            .ok()
                    })
                    .collect(),
            ),
        }
    }

    fn is_trusted(&self, connection_ip: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => connection_ip.parse::<IpAddr>().is_ok_and(|ip| {
                entries.iter().any(|entry| match entry {
                    TrustedEntry::Ip(trusted) => *trusted == ip,
                    TrustedEntry::Cidr(network) => network.contains(&ip),
                })
            }),
        }
    }
}

struct RateLimitStateInner {
    ip: KeyedBucket,
    user: KeyedBucket,
    trusted_proxies: TrustedProxies,
    max_entries: u32,
    entry_ttl: Duration,
    connect_info_warned: AtomicBool,
}

/// Rate limiter state shared across requests. Cheap to clone.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                ip: KeyedBucket::new("ip", config.ip_requests_per_minute, config.burst_size),
                // Authenticated users get twice the burst of an anonymous IP.
                user: KeyedBucket::new(
                    "user",
                    config.user_requests_per_minute,
                    config.burst_size.saturating_mul(2),
                ),
                trusted_proxies: TrustedProxies::from_config(&config.trusted_proxies),
                max_entries: config.max_entries,
                entry_ttl: Duration::from_secs(config.entry_ttl_secs),
                connect_info_warned: AtomicBool::new(false),
            })),
        }
    }

    /// Check if a request from the given IP is allowed.
    pub fn check_ip(&self, ip: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.ip.check(ip, inner.max_entries),
            None => Ok(()),
        }
    }

    /// Check if a request from the given user is allowed.
    pub fn check_user(&self, user_id: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.user.check(user_id, inner.max_entries),
            None => Ok(()),
        }
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Evict idle entries from both buckets. Returns the number evicted.
    pub fn cleanup(&self) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let evicted = inner.ip.evict_idle(inner.entry_ttl) + inner.user.evict_idle(inner.entry_ttl);
        if evicted > 0 {
            tracing::debug!(
                evicted,
                ip_entries = inner.ip.last_access.len(),
                user_entries = inner.user.last_access.len(),
                "Rate limiter cleanup completed"
            );
        }
        evicted
    }

    /// Current number of tracked (ip, user) keys.
    pub fn entry_count(&self) -> (usize, usize) {
        match &self.inner {
            Some(inner) => (inner.ip.last_access.len(), inner.user.last_access.len()),
            None => (0, 0),
        }
    }

    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner
            && !inner.connect_info_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "ConnectInfo not available for rate limiting; all requests share the 'unknown' \
                 IP bucket. Serve with into_make_service_with_connect_info::<SocketAddr>()."
            );
        }
    }
}

/// Reason for rate limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// Request exceeded rate limit.
    RateLimited,
    /// Rate limiter at capacity, cannot track new entries.
    AtCapacity,
}

/// Error returned when rate limit is exceeded.
#[derive(Debug)]
pub struct RateLimitError {
    /// Number of seconds to wait before retrying.
    pub retry_after_secs: u64,
    /// Requests per minute of the bucket that refused the request.
    pub limit: u32,
    /// Reason for the rate limit.
    pub reason: RateLimitReason,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        crate::metrics::RATE_LIMITED_TOTAL.inc();

        let (code, message) = match self.reason {
            RateLimitReason::RateLimited => (
                "rate_limit_exceeded",
                format!(
                    "Rate limit exceeded. Retry after {} seconds.",
                    self.retry_after_secs
                ),
            ),
            RateLimitReason::AtCapacity => (
                "rate_limiter_at_capacity",
                "Server is experiencing high load. Please retry later.".to_string(),
            ),
        };

        let body = serde_json::json!({
            "code": code,
            "message": message,
            "retryAfter": self.retry_after_secs,
        });
        let retry_after = self.retry_after_secs.to_string();

        (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("RateLimit-Limit", self.limit.to_string()),
                ("RateLimit-Remaining", "0".to_string()),
                ("RateLimit-Reset", retry_after.clone()),
                ("Retry-After", retry_after),
            ],
            axum::Json(body),
        )
            .into_response()
    }
}

fn forwarded_ip(req: &Request<Body>) -> Option<String> {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

    // First hop of X-Forwarded-For is the client.
    header("x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .or_else(|| header("x-real-ip"))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn client_ip(req: &Request<Body>, state: &RateLimitState, inner: &RateLimitStateInner) -> String {
    let connection_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    let trust_headers = match &connection_ip {
        Some(ip) => inner.trusted_proxies.is_trusted(ip),
        // Without a peer address only a blanket trust setting applies.
        None => matches!(inner.trusted_proxies, TrustedProxies::All),
    };

    if trust_headers && let Some(ip) = forwarded_ip(req) {
        return ip;
    }

    connection_ip.unwrap_or_else(|| {
        state.warn_connect_info_missing();
        "unknown".to_string()
    })
}

/// Per-IP rate limiting middleware. Runs before authentication.
pub async fn ip_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(inner) = rate_limit.inner.clone() else {
        return next.run(req).await;
    };

    let ip = client_ip(&req, &rate_limit, &inner);
    match inner.ip.check(&ip, inner.max_entries) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// Per-user rate limiting middleware. Runs after authentication;
/// unauthenticated requests pass through to the IP bucket's verdict.
pub async fn user_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    if let Some(user) = req.extensions().get::<UserIdExtension>() {
        if let Err(e) = rate_limit.check_user(&user.0) {
            return e.into_response();
        }
    }
    next.run(req).await
}

/// Authenticated user ID, set by the auth middleware for rate limiting.
#[derive(Clone)]
pub struct UserIdExtension(pub String);

/// Spawn a background task that periodically evicts idle rate limiter entries.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::info!(evicted, "Rate limiter cleanup task evicted stale entries");
            }
        }
    })
}
