//! Object storage abstraction and backends for the vault.
//!
//! This crate provides:
//! - Part storage under per-upload namespaces with atomic writes
//! - Streaming writes for assembling finalized files
//! - Backends: local filesystem and in-memory

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use std::sync::Arc;
use vault_core::config::StorageConfig;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            if path.as_os_str().is_empty() {
                return Err(StorageError::Config(
                    "storage.path cannot be empty".to_string(),
                ));
            }
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; uploads are lost on restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}
