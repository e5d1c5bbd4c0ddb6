//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Users and tokens
// =============================================================================

/// User record. Identity comes from the external auth provider; only the
/// role is kept here because quotas depend on it.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub role: String,
    pub created_at: OffsetDateTime,
}

/// Token record.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}

// =============================================================================
// Upload sessions
// =============================================================================

/// Upload session record. Exists from init until completion, abort or expiry.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub upload_id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    pub chunk_size: i64,
    pub total_parts: i64,
    pub retry_base_ms: i64,
    pub retry_max_ms: i64,
    pub max_retries: i64,
    /// Pending file metadata, serialized as JSON.
    pub metadata_json: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// A part acknowledged for a session.
#[derive(Debug, Clone, FromRow)]
pub struct UploadPartRow {
    pub upload_id: Uuid,
    pub part_index: i64,
    pub size_bytes: i64,
    pub received_at: OffsetDateTime,
}

// =============================================================================
// Files, folders and tags
// =============================================================================

/// Finalized file record.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub owner_id: Uuid,
    pub slug: String,
    pub name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub object_key: String,
    pub is_public: bool,
    pub description: Option<String>,
    pub max_views: Option<i64>,
    pub max_views_action: String,
    pub views: i64,
    pub folder_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Folder record, unique per (owner, name).
#[derive(Debug, Clone, FromRow)]
pub struct FolderRow {
    pub folder_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
}

/// Tag record, unique per (owner, name).
#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub tag_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
}

/// A file row plus everything that is created or checked in the same
/// transaction as its insert.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub row: FileRow,
    /// Existing tags to link.
    pub tag_ids: Vec<Uuid>,
    /// Tags to create if missing, then link.
    pub tag_names: Vec<String>,
    /// Folder to create if missing. Takes precedence over `row.folder_id`.
    pub folder_name: Option<String>,
    pub limits: OwnerLimits,
}

impl NewFile {
    /// A plain insert with no links and no limits.
    pub fn new(row: FileRow) -> Self {
        Self {
            row,
            tag_ids: Vec::new(),
            tag_names: Vec::new(),
            folder_name: None,
            limits: OwnerLimits::default(),
        }
    }
}

/// Byte limits on the owner's files, enforced against the rows already
/// committed when the insert runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerLimits {
    /// Total bytes across all of the owner's files.
    pub storage_bytes: Option<u64>,
    /// Bytes across files created at or after the given instant.
    pub recent_bytes: Option<(u64, OffsetDateTime)>,
}
