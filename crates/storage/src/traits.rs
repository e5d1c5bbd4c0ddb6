//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store for upload parts and finalized files.
///
/// Keys are `/`-separated relative paths. Parts of one upload share the
/// prefix `uploads/{upload_id}/`, finalized files live under `files/`.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically. An existing object under the same key is
    /// replaced, so a retried write leaves exactly one copy.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Start a streaming upload. Nothing is visible under `key` until
    /// [`StreamingUpload::finish`] succeeds.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Delete an object. Returns [`StorageError::NotFound`] if it is absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys with a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete every object under a prefix and return how many were removed.
    ///
    /// Objects that vanish concurrently are not errors.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let mut deleted = 0;
        for key in self.list(prefix).await? {
            match self.delete(&key).await {
                Ok(()) => deleted += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend availability.
    ///
    /// Called during startup and by the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload, discarding anything written.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
