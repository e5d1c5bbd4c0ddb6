//! Finalized file repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, NewFile};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for finalized files.
///
/// Files are only ever inserted through
/// [`UploadRepo::finalize_session`](crate::repos::UploadRepo::finalize_session)
/// or [`create_file`](FileRepo::create_file).
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a file in one transaction: check the owner limits against
    /// committed rows, create the named folder and tags, then insert the
    /// row and its tag links. Returns the row as stored.
    async fn create_file(&self, file: &NewFile) -> MetadataResult<FileRow>;

    /// Get a file by ID.
    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// Get a file by its public slug.
    async fn get_file_by_slug(&self, slug: &str) -> MetadataResult<Option<FileRow>>;

    /// Whether a slug is taken.
    async fn slug_exists(&self, slug: &str) -> MetadataResult<bool>;

    /// Tag names attached to a file, sorted.
    async fn get_file_tags(&self, file_id: Uuid) -> MetadataResult<Vec<String>>;

    /// Files owned by a user, newest first.
    async fn list_files(&self, owner_id: Uuid) -> MetadataResult<Vec<FileRow>>;

    /// Total bytes of a user's files.
    async fn storage_used(&self, owner_id: Uuid) -> MetadataResult<u64>;

    /// Bytes of a user's files created at or after `since`.
    async fn uploaded_since(&self, owner_id: Uuid, since: OffsetDateTime) -> MetadataResult<u64>;
}
