//! Admin token provisioning.

use anyhow::{Result, bail};
use time::OffsetDateTime;
use uuid::Uuid;
use vault_core::config::AdminConfig;
use vault_core::token::{Role, TokenScope};
use vault_metadata::{MetadataError, MetadataStore};
use vault_metadata::models::{TokenRow, UserRow};

/// Ensure the configured admin token exists.
///
/// If the hash changes between restarts the previous admin token is revoked
/// and a new one is created for the same admin user. Removing the hash from
/// the configuration revokes the previous token.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    let now = OffsetDateTime::now_utc();
    let previous_id = metadata.get_bootstrap_token_id().await?;

    let Some(configured) = config.token_hash.as_deref() else {
        if let Some(prev_id) = previous_id {
            revoke_previous(metadata, prev_id, now).await?;
            metadata.clear_bootstrap_token_id().await?;
            tracing::info!(token_id = %prev_id, "Admin token removed from config, revoked");
        }
        return Ok(());
    };

    // auth hashes are lowercase hex, so uppercase config values must match too.
    let hash = configured
        .strip_prefix("sha256:")
        .unwrap_or(configured)
        .to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); use a new token hash",
                existing.token_id
            );
        }
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={}); use a new token hash",
                existing.token_id,
                expires_at
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!("Admin token already exists");
        return Ok(());
    }

    let scopes = config
        .token_scopes
        .clone()
        .unwrap_or_else(|| vec![TokenScope::Admin.as_str().to_string()]);
    for scope in &scopes {
        TokenScope::parse(scope).map_err(|_| anyhow::anyhow!("invalid admin scope: {scope}"))?;
    }

    // Keep the admin user stable across rotations.
    let mut user_id = None;
    if let Some(prev_id) = previous_id {
        if let Some(previous) = metadata.get_token(prev_id).await? {
            user_id = Some(previous.user_id);
        }
        revoke_previous(metadata, prev_id, now).await?;
        tracing::info!(token_id = %prev_id, "Previous admin token revoked");
    }
    let user_id = user_id.unwrap_or_else(Uuid::new_v4);

    metadata
        .upsert_user(&UserRow {
            user_id,
            role: Role::Admin.as_str().to_string(),
            created_at: now,
        })
        .await?;

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id,
        token_hash: hash,
        scopes: serde_json::to_string(&scopes)?,
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };

    metadata.create_token(&token).await?;
    metadata.set_bootstrap_token_id(token.token_id).await?;
    tracing::info!(token_id = %token.token_id, user_id = %user_id, "Admin token created");

    Ok(())
}

/// Revoke the previously provisioned token. It may have been deleted by hand.
async fn revoke_previous(
    metadata: &dyn MetadataStore,
    token_id: Uuid,
    now: OffsetDateTime,
) -> Result<()> {
    match metadata.revoke_token(token_id, now).await {
        Ok(()) | Err(MetadataError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
