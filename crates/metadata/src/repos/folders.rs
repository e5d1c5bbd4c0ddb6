//! Folder and tag repositories.

use crate::error::MetadataResult;
use crate::models::{FolderRow, TagRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for folders.
#[async_trait]
pub trait FolderRepo: Send + Sync {
    /// Get a folder by ID.
    async fn get_folder(&self, folder_id: Uuid) -> MetadataResult<Option<FolderRow>>;

    /// Return the owner's folder with this name, creating it if missing.
    async fn get_or_create_folder(&self, owner_id: Uuid, name: &str)
    -> MetadataResult<FolderRow>;
}

/// Repository for tags.
#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Tags with the given IDs that belong to the owner. Unknown or foreign
    /// IDs are left out.
    async fn get_owned_tags(&self, owner_id: Uuid, tag_ids: &[Uuid])
    -> MetadataResult<Vec<TagRow>>;

    /// Return the owner's tag with this name, creating it if missing.
    async fn get_or_create_tag(&self, owner_id: Uuid, name: &str) -> MetadataResult<TagRow>;
}
