//! In-process memory backend, used by tests and ephemeral deployments.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    modified: OffsetDateTime,
}

/// Object store backed by a concurrent map.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<DashMap<String, StoredObject>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Backdate an object's modification time. Lets sweep tests age objects
    /// without sleeping.
    pub fn set_modified(&self, key: &str, modified: OffsetDateTime) -> StorageResult<()> {
        let mut entry = self
            .objects
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        entry.modified = modified;
        Ok(())
    }

    fn insert(&self, key: &str, data: Bytes) {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                modified: OffsetDateTime::now_utc(),
            },
        );
    }

    fn load(&self, key: &str) -> StorageResult<StoredObject> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

fn check_key(key: &str) -> StorageResult<()> {
    if key.split('/').any(|part| part == "..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "path traversal not allowed: {key}"
        )));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        check_key(key)?;
        Ok(self.objects.contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        check_key(key)?;
        let object = self.load(key)?;
        Ok(ObjectMeta {
            size: object.data.len() as u64,
            last_modified: Some(object.modified),
            content_type: None,
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        check_key(key)?;
        Ok(self.load(key)?.data)
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let data = self.get(key).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        check_key(key)?;
        self.insert(key, data);
        Ok(())
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        check_key(key)?;
        Ok(Box::new(MemoryUpload {
            store: self.clone(),
            key: key.to_string(),
            buffer: BytesMut::new(),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        check_key(key)?;
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        check_key(prefix)?;
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryUpload {
    store: MemoryBackend,
    key: String,
    buffer: BytesMut,
}

#[async_trait]
impl StreamingUpload for MemoryUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let len = self.buffer.len() as u64;
        self.store.insert(&self.key, self.buffer.freeze());
        Ok(len)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
