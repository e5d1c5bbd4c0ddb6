//! Metadata store abstraction and implementation for the vault.
//!
//! This crate provides the control-plane data model:
//! - Upload sessions and received-part tracking
//! - Finalized files, folders and tags
//! - Users, tokens, scopes and revocation

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use std::sync::Arc;
use vault_core::config::MetadataConfig;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
