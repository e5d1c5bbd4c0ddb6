//! Upload session repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, NewFile, UploadPartRow, UploadSessionRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for upload session operations.
///
/// A session row is removed exactly once: by [`finalize_session`],
/// [`delete_session`] or the expiry sweep (which also calls
/// `delete_session`). Callers use the returned flag to learn whether
/// they won that race.
///
/// [`finalize_session`]: UploadRepo::finalize_session
/// [`delete_session`]: UploadRepo::delete_session
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Create a new upload session.
    async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()>;

    /// Get an upload session by ID.
    async fn get_session(&self, upload_id: Uuid) -> MetadataResult<Option<UploadSessionRow>>;

    /// Record a part as received, replacing any earlier record for the same
    /// index. Returns false (and records nothing) if the session is gone.
    async fn mark_part_received(
        &self,
        upload_id: Uuid,
        part_index: u32,
        size_bytes: u64,
        received_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Received parts for a session, ordered by index.
    async fn get_received_parts(&self, upload_id: Uuid) -> MetadataResult<Vec<UploadPartRow>>;

    /// Remove a session and its part records. Returns true if this call
    /// removed it.
    async fn delete_session(&self, upload_id: Uuid) -> MetadataResult<bool>;

    /// Atomically remove the session and insert the finalized file, as
    /// [`FileRepo::create_file`](crate::repos::FileRepo::create_file) does.
    /// Returns `None`, without writing anything, if the session no longer
    /// exists. Any insert failure, including
    /// [`MetadataError::QuotaExceeded`](crate::MetadataError::QuotaExceeded),
    /// leaves the session in place.
    async fn finalize_session(
        &self,
        upload_id: Uuid,
        file: &NewFile,
    ) -> MetadataResult<Option<FileRow>>;

    /// Sessions whose deadline is at or before `now`, oldest first.
    async fn get_expired_sessions(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadSessionRow>>;

    /// Count live sessions.
    async fn count_active_sessions(&self) -> MetadataResult<u64>;
}
