//! Upload session types and lifecycle.

use crate::file::{MaxViewsAction, NameConvention, SlugConvention, validate_slug};
use crate::token::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
///
/// Session ids are random v4 UUIDs and double as the capability the client
/// presents on every subsequent call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::UploadSession(format!("invalid upload ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UploadId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a declared file size is split into fixed-size parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// Declared total size in bytes.
    pub size: u64,
    /// Size of every part except possibly the last.
    pub chunk_size: u64,
    /// Number of parts, `ceil(size / chunk_size)`.
    pub total_parts: u32,
}

impl ChunkPlan {
    /// Build a plan, rejecting empty files, out-of-range chunk sizes and
    /// plans with more than [`crate::MAX_PARTS`] parts.
    pub fn new(size: u64, chunk_size: u64) -> crate::Result<Self> {
        if !(crate::MIN_CHUNK_SIZE..=crate::MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(crate::Error::InvalidChunkSize {
                size: chunk_size,
                min: crate::MIN_CHUNK_SIZE,
                max: crate::MAX_CHUNK_SIZE,
            });
        }
        if size == 0 {
            return Err(crate::Error::UploadSession(
                "size must be greater than zero".to_string(),
            ));
        }

        let parts = size.div_ceil(chunk_size);
        if parts > crate::MAX_PARTS {
            return Err(crate::Error::TooManyParts {
                parts,
                max: crate::MAX_PARTS,
            });
        }

        Ok(Self {
            size,
            chunk_size,
            total_parts: parts as u32,
        })
    }

    /// Check whether `index` names a part of this plan.
    pub fn contains(&self, index: u32) -> bool {
        index < self.total_parts
    }

    /// Expected byte length of part `index`, or `None` if out of range.
    pub fn expected_part_len(&self, index: u32) -> Option<u64> {
        if !self.contains(index) {
            return None;
        }
        let last = self.total_parts - 1;
        if index < last {
            Some(self.chunk_size)
        } else {
            Some(self.size - self.chunk_size * u64::from(last))
        }
    }

    /// Indices in `0..total_parts` that are not in `received`, ascending.
    pub fn missing(&self, received: &BTreeSet<u32>) -> Vec<u32> {
        (0..self.total_parts)
            .filter(|i| !received.contains(i))
            .collect()
    }

}

/// Client backoff advice, snapshotted into the session at init.
///
/// The server never retries on the client's behalf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_retries: u32,
}

/// Folder the finished file should land in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderRef {
    /// An existing folder owned by the uploader.
    Id(Uuid),
    /// A folder looked up by name, created if missing.
    Name(String),
}

/// Options shared by the chunked init call and the single-request upload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadOptions {
    /// Display name; derived from the name convention when absent.
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    /// Vanity slug.
    pub slug: Option<String>,
    pub max_views: Option<u32>,
    pub max_views_action: MaxViewsAction,
    pub name_convention: NameConvention,
    pub slug_convention: SlugConvention,
    pub folder_id: Option<Uuid>,
    pub folder_name: Option<String>,
    pub tag_ids: Vec<Uuid>,
    pub new_tags: Vec<String>,
}

/// Maximum length of a description.
pub const MAX_DESCRIPTION_LEN: usize = 2048;

/// Maximum number of tags attached to one file.
pub const MAX_TAGS: usize = 32;

impl UploadOptions {
    /// Validate the options and capture them as immutable pending metadata.
    pub fn into_pending(self) -> crate::Result<PendingFileMetadata> {
        let folder = match (self.folder_id, self.folder_name) {
            (Some(_), Some(_)) => {
                return Err(crate::Error::UploadSession(
                    "folderId and folderName are mutually exclusive".to_string(),
                ));
            }
            (Some(id), None) => Some(FolderRef::Id(id)),
            (None, Some(name)) => {
                let name = name.trim().to_string();
                if name.is_empty() || name.len() > 255 {
                    return Err(crate::Error::UploadSession(
                        "folderName must be 1-255 characters".to_string(),
                    ));
                }
                Some(FolderRef::Name(name))
            }
            (None, None) => None,
        };

        if let Some(slug) = &self.slug {
            validate_slug(slug)?;
        }

        if self.max_views == Some(0) {
            return Err(crate::Error::UploadSession(
                "maxViews must be at least 1".to_string(),
            ));
        }

        if let Some(description) = &self.description
            && description.len() > MAX_DESCRIPTION_LEN
        {
            return Err(crate::Error::UploadSession(format!(
                "description exceeds {MAX_DESCRIPTION_LEN} bytes"
            )));
        }

        let mut new_tags: Vec<String> = self
            .new_tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        new_tags.sort();
        new_tags.dedup();

        let mut tag_ids = self.tag_ids;
        tag_ids.sort();
        tag_ids.dedup();

        if tag_ids.len() + new_tags.len() > MAX_TAGS {
            return Err(crate::Error::UploadSession(format!(
                "at most {MAX_TAGS} tags may be attached"
            )));
        }

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(PendingFileMetadata {
            name,
            description: self.description,
            is_public: self.is_public,
            slug: self.slug,
            max_views: self.max_views,
            max_views_action: self.max_views_action,
            name_convention: self.name_convention,
            slug_convention: self.slug_convention,
            folder,
            tag_ids,
            new_tags,
        })
    }
}

/// Everything needed to create the final file record, captured at init.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFileMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub slug: Option<String>,
    pub max_views: Option<u32>,
    pub max_views_action: MaxViewsAction,
    pub name_convention: NameConvention,
    pub slug_convention: SlugConvention,
    pub folder: Option<FolderRef>,
    pub tag_ids: Vec<Uuid>,
    pub new_tags: Vec<String>,
}

/// An in-flight chunked upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: UploadId,
    /// User that initiated the session.
    pub owner: UserId,
    /// Declared final file name (sanitized).
    pub file_name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size and part layout.
    pub plan: ChunkPlan,
    /// Backoff advice handed to the client.
    pub retry: RetryPolicy,
    /// Metadata for the final file record.
    pub pending: PendingFileMetadata,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session and its parts become eligible for the sweep.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new upload session expiring `ttl` from now.
    pub fn new(
        owner: UserId,
        file_name: String,
        mime_type: String,
        plan: ChunkPlan,
        retry: RetryPolicy,
        pending: PendingFileMetadata,
        ttl: time::Duration,
    ) -> crate::Result<Self> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            crate::Error::UploadSession(format!("session ttl of {ttl} is out of range"))
        })?;
        Ok(Self {
            id: UploadId::new(),
            owner,
            file_name,
            mime_type,
            plan,
            retry,
            pending,
            created_at: now,
            expires_at,
        })
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Check expiry against a fixed instant.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Whether `user` owns this session.
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

/// Storage key prefix that holds every temporary part of a session.
pub fn part_namespace(id: UploadId) -> String {
    format!("uploads/{id}/")
}

/// Storage key of one temporary part.
pub fn part_key(id: UploadId, index: u32) -> String {
    format!("uploads/{id}/parts/{index:08}")
}

/// Request body for `POST /upload?action=init`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub file_name: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub options: UploadOptions,
}

/// Response from `POST /upload?action=init`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: UploadId,
    pub chunk_size: u64,
    pub total_parts: u32,
    pub ttl_seconds: u64,
    pub retry: RetryPolicy,
}

/// Response from `GET /upload?action=status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub upload_id: UploadId,
    pub total_parts: u32,
    pub received_parts: Vec<u32>,
}

/// Acknowledgement of a stored part.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartReceipt {
    pub upload_id: UploadId,
    pub part: u32,
    pub size: u64,
}

/// Body of `complete` and `abort`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadIdRequest {
    pub upload_id: String,
}
