//! Core domain types and shared logic for the vault upload service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session lifecycle and chunk planning
//! - Pending file metadata and the finalized file record
//! - Users, roles, token scopes and authorization
//! - Configuration shared by the server and its collaborators

pub mod config;
pub mod error;
pub mod file;
pub mod token;
pub mod upload;

pub use error::{Error, Result};
pub use file::{FileId, FileRecord, MaxViewsAction, NameConvention, SlugConvention};
pub use token::{Role, Token, TokenId, TokenScope, UserId};
pub use upload::{
    ChunkPlan, FolderRef, PendingFileMetadata, RetryPolicy, UploadId, UploadSession,
};

/// Default chunk size: 25 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 25 * 1024 * 1024;

/// Maximum chunk size: 256 MiB
pub const MAX_CHUNK_SIZE: u64 = 256 * 1024 * 1024;

/// Minimum chunk size: 1 KiB
pub const MIN_CHUNK_SIZE: u64 = 1024;

/// Maximum number of parts a single upload may be split into.
pub const MAX_PARTS: u64 = 100_000;

/// Longest allowed upload session lifetime: 30 days.
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 3600;
