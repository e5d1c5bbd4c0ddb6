//! User and token repositories.

use crate::error::MetadataResult;
use crate::models::{TokenRow, UserRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for users.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user, or update the role of an existing one.
    async fn upsert_user(&self, user: &UserRow) -> MetadataResult<()>;

    /// Get a user by ID.
    async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>>;
}

/// Repository for token operations.
#[async_trait]
pub trait TokenRepo: Send + Sync {
    /// Create a token.
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()>;

    /// Get a token by hash.
    async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>>;

    /// Get a token by ID.
    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>>;

    /// Update last used time.
    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()>;

    /// Revoke a token.
    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()>;

    /// List a user's tokens, newest first.
    async fn list_tokens(&self, user_id: Uuid) -> MetadataResult<Vec<TokenRow>>;
}
