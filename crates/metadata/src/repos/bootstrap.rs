//! Marker for the token provisioned from the admin configuration.

use crate::error::MetadataResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Tracks which token was created from `admin.token_hash`, so a changed
/// or removed hash can revoke it on the next start.
#[async_trait]
pub trait BootstrapRepo: Send + Sync {
    /// The configured admin token, if one has been provisioned.
    async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>>;

    /// Record `token_id` as the configured admin token.
    async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()>;

    /// Forget the configured admin token.
    async fn clear_bootstrap_token_id(&self) -> MetadataResult<()>;
}
