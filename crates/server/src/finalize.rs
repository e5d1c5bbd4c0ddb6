//! File record creation shared by the chunked and single-request upload paths.
//!
//! Both paths end the same way: the pending metadata is resolved against the
//! owner's folders and tags, a display name and slug are derived, and one
//! file row is inserted. Named folders and tags are created and the storage
//! and daily limits re-checked inside that insert's transaction. For chunked
//! uploads the same transaction also claims the session.

use crate::coordinator::UploadError;
use time::OffsetDateTime;
use uuid::Uuid;
use vault_core::config::RoleQuota;
use vault_core::file::{FileId, FileRecord, MaxViewsAction, file_key};
use vault_core::upload::{FolderRef, PendingFileMetadata, UploadId};
use vault_core::UserId;
use vault_metadata::models::{FileRow, NewFile, OwnerLimits};
use vault_metadata::{MetadataError, MetadataStore};

/// Attempts at a generated slug before giving up.
const MAX_SLUG_ATTEMPTS: u32 = 5;

/// Check a new upload of `size` bytes against the owner's role limits.
pub async fn check_quota(
    metadata: &dyn MetadataStore,
    quota: &RoleQuota,
    owner: UserId,
    size: u64,
) -> Result<(), UploadError> {
    if let Some(max) = quota.max_upload_bytes
        && size > max
    {
        return Err(UploadError::QuotaExceeded(format!(
            "file size {size} exceeds the per-file limit of {max} bytes"
        )));
    }

    if let Some(limit) = quota.storage_bytes {
        let used = metadata.storage_used(*owner.as_uuid()).await?;
        if used.saturating_add(size) > limit {
            return Err(UploadError::QuotaExceeded(format!(
                "storage quota of {limit} bytes would be exceeded ({used} bytes used)"
            )));
        }
    }

    if let Some(limit) = quota.daily_upload_bytes {
        let since = daily_window_start(OffsetDateTime::now_utc());
        let today = metadata.uploaded_since(*owner.as_uuid(), since).await?;
        if today.saturating_add(size) > limit {
            return Err(UploadError::QuotaExceeded(format!(
                "daily upload limit of {limit} bytes would be exceeded ({today} bytes in the last 24h)"
            )));
        }
    }

    Ok(())
}

fn daily_window_start(now: OffsetDateTime) -> OffsetDateTime {
    now - time::Duration::days(1)
}

/// The role limits the insert transaction enforces against committed rows.
pub fn owner_limits(quota: &RoleQuota, now: OffsetDateTime) -> OwnerLimits {
    OwnerLimits {
        storage_bytes: quota.storage_bytes,
        recent_bytes: quota
            .daily_upload_bytes
            .map(|limit| (limit, daily_window_start(now))),
    }
}

/// Read-only validation of the references in pending metadata, done at init
/// so a session is never created for a request that cannot finalize.
pub async fn check_references(
    metadata: &dyn MetadataStore,
    owner: UserId,
    pending: &PendingFileMetadata,
) -> Result<(), UploadError> {
    if let Some(FolderRef::Id(folder_id)) = &pending.folder {
        owned_folder(metadata, owner, *folder_id).await?;
    }

    if !pending.tag_ids.is_empty() {
        let found = metadata
            .get_owned_tags(*owner.as_uuid(), &pending.tag_ids)
            .await?;
        if found.len() != pending.tag_ids.len() {
            return Err(UploadError::Validation("unknown tag id".to_string()));
        }
    }

    if let Some(slug) = &pending.slug
        && metadata.slug_exists(slug).await?
    {
        return Err(UploadError::Conflict(format!("slug '{slug}' is already taken")));
    }

    Ok(())
}

async fn owned_folder(
    metadata: &dyn MetadataStore,
    owner: UserId,
    folder_id: Uuid,
) -> Result<Uuid, UploadError> {
    match metadata.get_folder(folder_id).await? {
        Some(folder) if folder.owner_id == *owner.as_uuid() => Ok(folder.folder_id),
        // Foreign folders look the same as missing ones.
        _ => Err(UploadError::Validation("folder not found".to_string())),
    }
}

/// Pending metadata resolved against the owner's folders and tags.
///
/// Nothing is created while resolving. Named folders and tags are carried
/// along and created with the file row, so a failed upload leaves none
/// behind.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub original_name: String,
    pub name: String,
    pub folder_id: Option<Uuid>,
    pub folder_name: Option<String>,
    pub tag_ids: Vec<Uuid>,
    pub new_tags: Vec<String>,
    /// Sorted tag names, as shown on the record.
    pub tag_names: Vec<String>,
}

/// Check folder and tag references and derive the display name.
pub async fn resolve(
    metadata: &dyn MetadataStore,
    owner: UserId,
    pending: &PendingFileMetadata,
    original_name: &str,
    now: OffsetDateTime,
) -> Result<ResolvedFile, UploadError> {
    let (folder_id, folder_name) = match &pending.folder {
        Some(FolderRef::Id(id)) => (Some(owned_folder(metadata, owner, *id).await?), None),
        Some(FolderRef::Name(name)) => (None, Some(name.clone())),
        None => (None, None),
    };

    let mut tag_names = Vec::new();
    if !pending.tag_ids.is_empty() {
        let owned = metadata
            .get_owned_tags(*owner.as_uuid(), &pending.tag_ids)
            .await?;
        if owned.len() != pending.tag_ids.len() {
            return Err(UploadError::Validation("unknown tag id".to_string()));
        }
        tag_names.extend(owned.into_iter().map(|t| t.name));
    }
    // Tag names are unique per owner, so equal names are the same tag.
    tag_names.extend(pending.new_tags.iter().cloned());
    tag_names.sort();
    tag_names.dedup();

    let name = pending
        .name
        .clone()
        .unwrap_or_else(|| pending.name_convention.apply(original_name, now));

    Ok(ResolvedFile {
        original_name: original_name.to_string(),
        name,
        folder_id,
        folder_name,
        tag_ids: pending.tag_ids.clone(),
        new_tags: pending.new_tags.clone(),
        tag_names,
    })
}

/// The stored object a record will point at.
#[derive(Debug, Clone, Copy)]
pub struct StoredObject<'a> {
    pub file_id: FileId,
    pub mime_type: &'a str,
    pub size: u64,
}

/// Insert the file record, retrying generated slugs on collision.
///
/// With `claim` set, the insert happens in the same transaction that removes
/// that upload session, and [`UploadError::NotFound`] is returned when
/// another caller removed it first. Nothing is written in that case, and
/// nothing is written when `limits` would be exceeded.
#[allow(clippy::too_many_arguments)]
pub async fn insert_record(
    metadata: &dyn MetadataStore,
    public_base_url: &str,
    owner: UserId,
    pending: &PendingFileMetadata,
    resolved: &ResolvedFile,
    object: StoredObject<'_>,
    limits: OwnerLimits,
    claim: Option<UploadId>,
) -> Result<FileRecord, UploadError> {
    let created_at = OffsetDateTime::now_utc();
    let attempts = if pending.slug.is_some() {
        1
    } else {
        MAX_SLUG_ATTEMPTS
    };

    for attempt in 0..attempts {
        let slug = match &pending.slug {
            Some(vanity) => vanity.clone(),
            None => pending
                .slug_convention
                .generate(&resolved.original_name, attempt),
        };
        let row = FileRow {
            file_id: *object.file_id.as_uuid(),
            owner_id: *owner.as_uuid(),
            slug: slug.clone(),
            name: resolved.name.clone(),
            original_name: resolved.original_name.clone(),
            mime_type: object.mime_type.to_string(),
            size: i64::try_from(object.size)
                .map_err(|_| UploadError::Validation("size out of range".to_string()))?,
            object_key: file_key(object.file_id),
            is_public: pending.is_public,
            description: pending.description.clone(),
            max_views: pending.max_views.map(i64::from),
            max_views_action: pending.max_views_action.as_str().to_string(),
            views: 0,
            folder_id: resolved.folder_id,
            created_at,
        };

        let file = NewFile {
            row,
            tag_ids: resolved.tag_ids.clone(),
            tag_names: resolved.new_tags.clone(),
            folder_name: resolved.folder_name.clone(),
            limits,
        };

        let inserted = match claim {
            Some(upload_id) => {
                metadata
                    .finalize_session(*upload_id.as_uuid(), &file)
                    .await
            }
            None => metadata.create_file(&file).await.map(Some),
        };

        match inserted {
            Ok(Some(stored)) => {
                return record_from_row(&stored, resolved.tag_names.clone(), public_base_url);
            }
            Ok(None) => return Err(UploadError::NotFound),
            Err(MetadataError::AlreadyExists(_)) if pending.slug.is_none() => {
                tracing::debug!(attempt, slug = %slug, "Generated slug collided, retrying");
            }
            Err(MetadataError::AlreadyExists(_)) => {
                return Err(UploadError::Conflict(format!("slug '{slug}' is already taken")));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(UploadError::Conflict(
        "could not generate a unique slug".to_string(),
    ))
}

/// Public link for a slug.
pub fn public_url(public_base_url: &str, slug: &str) -> String {
    format!("{}/f/{slug}", public_base_url.trim_end_matches('/'))
}

/// Build the response record from a stored row.
pub fn record_from_row(
    row: &FileRow,
    tags: Vec<String>,
    public_base_url: &str,
) -> Result<FileRecord, UploadError> {
    let corrupt = |what: &str| {
        UploadError::Metadata(MetadataError::Internal(format!(
            "corrupt file row {}: {what}",
            row.file_id
        )))
    };

    Ok(FileRecord {
        id: FileId::from(row.file_id),
        slug: row.slug.clone(),
        name: row.name.clone(),
        original_name: row.original_name.clone(),
        mime_type: row.mime_type.clone(),
        size: u64::try_from(row.size).map_err(|_| corrupt("size"))?,
        url: public_url(public_base_url, &row.slug),
        is_public: row.is_public,
        description: row.description.clone(),
        max_views: row
            .max_views
            .map(u32::try_from)
            .transpose()
            .map_err(|_| corrupt("max_views"))?,
        max_views_action: MaxViewsAction::parse(&row.max_views_action)
            .map_err(|_| corrupt("max_views_action"))?,
        views: u64::try_from(row.views).map_err(|_| corrupt("views"))?,
        folder_id: row.folder_id,
        tags,
        created_at: row.created_at,
    })
}
