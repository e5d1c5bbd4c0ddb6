//! Expiry sweep.
//!
//! Removes sessions past their deadline together with their parts, then
//! looks for part namespaces with no session row at all. Those are left
//! behind when the process dies between finalizing a session and deleting
//! its parts, or when a part write lands after its session was claimed.

use crate::coordinator::{UploadCoordinator, UploadError};
use crate::metrics::{
    ACTIVE_UPLOAD_SESSIONS, SWEEP_DURATION, SWEEP_ERRORS, SWEEP_ORPHANS_DELETED, SWEEP_RUNS,
    UPLOAD_SESSIONS_EXPIRED,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use vault_core::config::GcConfig;
use vault_core::upload::UploadId;

/// Namespace holding every session's temporary parts.
const UPLOADS_PREFIX: &str = "uploads/";

/// Outcome of one sweep run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStats {
    /// Expired sessions removed by this run.
    pub sessions_expired: u64,
    /// Part objects deleted, for expired sessions and orphans alike.
    pub parts_deleted: u64,
    /// Part namespaces removed because no session owned them.
    pub orphans_deleted: u64,
    /// Individual failures. The sweep carries on past them.
    pub errors: u64,
}

/// Run one sweep.
#[tracing::instrument(skip_all)]
pub async fn sweep_expired(
    coordinator: &UploadCoordinator,
    config: &GcConfig,
) -> Result<SweepStats, UploadError> {
    let start = Instant::now();
    let mut stats = SweepStats::default();

    expire_sessions(coordinator, config, &mut stats).await?;
    if config.sweep_orphans {
        sweep_orphans(coordinator, config, &mut stats).await?;
    }

    match coordinator.metadata().count_active_sessions().await {
        Ok(active) => ACTIVE_UPLOAD_SESSIONS.set(i64::try_from(active).unwrap_or(i64::MAX)),
        Err(e) => tracing::warn!(error = %e, "Failed to count active sessions"),
    }

    SWEEP_RUNS.inc();
    SWEEP_ERRORS.inc_by(stats.errors);
    SWEEP_DURATION.observe(start.elapsed().as_secs_f64());

    if stats != SweepStats::default() {
        tracing::info!(
            sessions_expired = stats.sessions_expired,
            parts_deleted = stats.parts_deleted,
            orphans_deleted = stats.orphans_deleted,
            errors = stats.errors,
            "Sweep finished"
        );
    }
    Ok(stats)
}

async fn expire_sessions(
    coordinator: &UploadCoordinator,
    config: &GcConfig,
    stats: &mut SweepStats,
) -> Result<(), UploadError> {
    let now = OffsetDateTime::now_utc();

    for iteration in 0..config.max_iterations {
        let fetch = coordinator
            .metadata()
            .get_expired_sessions(now, config.batch_size);
        let batch = match tokio::time::timeout(config.batch_timeout(), fetch).await {
            Ok(batch) => batch?,
            Err(_) => {
                tracing::warn!(iteration, "Fetching expired sessions timed out, stopping");
                stats.errors += 1;
                return Ok(());
            }
        };

        let fetched = batch.len();
        for row in batch {
            let upload_id = UploadId::from(row.upload_id);
            match coordinator.expire(upload_id).await {
                Ok(Some(parts)) => {
                    stats.sessions_expired += 1;
                    stats.parts_deleted += parts;
                    UPLOAD_SESSIONS_EXPIRED.inc();
                }
                // Completed or aborted between the fetch and the claim.
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(upload_id = %upload_id, error = %e, "Failed to expire session");
                    stats.errors += 1;
                }
            }
        }

        if fetched < config.batch_size as usize {
            return Ok(());
        }
    }

    tracing::warn!(
        max_iterations = config.max_iterations,
        "Expiry sweep hit its iteration limit"
    );
    Ok(())
}

async fn sweep_orphans(
    coordinator: &UploadCoordinator,
    config: &GcConfig,
    stats: &mut SweepStats,
) -> Result<(), UploadError> {
    let storage = coordinator.storage();
    let Some(cutoff) = OffsetDateTime::now_utc().checked_sub(config.orphan_grace()) else {
        return Ok(());
    };

    let mut namespaces: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in storage.list(UPLOADS_PREFIX).await? {
        let Some(rest) = key.strip_prefix(UPLOADS_PREFIX) else {
            continue;
        };
        if let Some((id, _)) = rest.split_once('/') {
            namespaces.entry(id.to_string()).or_default().push(key.clone());
        }
    }

    for (id, keys) in namespaces {
        // Unparseable names can never match a session.
        if let Ok(uuid) = uuid::Uuid::parse_str(&id)
            && coordinator.metadata().get_session(uuid).await?.is_some()
        {
            continue;
        }

        let mut newest = None;
        for key in &keys {
            match storage.head(key).await {
                Ok(meta) => newest = newest.max(meta.last_modified),
                Err(vault_storage::StorageError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(key, error = %e, "Failed to stat orphan candidate");
                    stats.errors += 1;
                    newest = Some(OffsetDateTime::now_utc());
                }
            }
        }
        // Objects without a timestamp are treated as fresh.
        if newest.is_none_or(|modified| modified > cutoff) {
            continue;
        }

        match storage.delete_prefix(&format!("{UPLOADS_PREFIX}{id}/")).await {
            Ok(deleted) => {
                stats.orphans_deleted += 1;
                stats.parts_deleted += deleted;
                SWEEP_ORPHANS_DELETED.inc();
                tracing::info!(namespace = %id, deleted, "Removed orphaned upload parts");
            }
            Err(e) => {
                tracing::warn!(namespace = %id, error = %e, "Failed to remove orphaned parts");
                stats.errors += 1;
            }
        }
    }
    Ok(())
}

/// Spawn the periodic sweep.
pub fn spawn_sweep_task(
    coordinator: UploadCoordinator,
    config: GcConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval().max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_expired(&coordinator, &config).await {
                tracing::error!(error = %e, "Expiry sweep failed");
            }
        }
    })
}
