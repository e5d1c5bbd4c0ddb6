//! Chunked upload coordinator.
//!
//! Owns the session lifecycle: init, part ingestion, status, ordered
//! reassembly with exactly-once finalization, and abort. The coordinator
//! only talks to the storage driver and the metadata store; it knows nothing
//! about HTTP.
//!
//! Mutual exclusion between `complete`, `abort` and the expiry sweep comes
//! from the metadata store: removing a session row is a conditional delete,
//! and only the caller that removed it goes on to act.

mod error;

pub use error::UploadError;

use crate::finalize::{self, StoredObject};
use crate::metrics::{
    BYTES_UPLOADED, FILES_CREATED, PART_UPLOAD_DURATION, PARTS_UPLOADED, UPLOAD_COMPLETE_DURATION,
    UPLOAD_SESSIONS_ABORTED, UPLOAD_SESSIONS_COMPLETED, UPLOAD_SESSIONS_CREATED,
};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use vault_core::config::{AppConfig, QuotaConfig, UploadConfig};
use vault_core::file::{FileId, FileRecord, file_key, sanitize_file_name, validate_mime_type};
use vault_core::upload::{
    ChunkPlan, InitUploadRequest, InitUploadResponse, PartReceipt, PendingFileMetadata,
    RetryPolicy, UploadId, UploadOptions, UploadSession, UploadStatus, part_key, part_namespace,
};
use vault_core::{Role, UserId};
use vault_metadata::MetadataStore;
use vault_metadata::models::UploadSessionRow;
use vault_storage::{ObjectStore, StorageError};

/// MIME type assumed when the client declares none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// The caller of a coordinator operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Uploader {
    pub id: UserId,
    pub role: Role,
}

/// Coordinates chunked and single-request uploads. Cheap to clone.
#[derive(Clone)]
pub struct UploadCoordinator {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    upload: UploadConfig,
    quota: QuotaConfig,
    public_base_url: String,
}

impl UploadCoordinator {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            storage,
            metadata,
            upload: config.upload.clone(),
            quota: config.quota.clone(),
            public_base_url: config.server.public_base_url.clone(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn upload_config(&self) -> &UploadConfig {
        &self.upload
    }

    /// Start a chunked upload.
    ///
    /// Validates the request and the caller's quota before anything is
    /// allocated. No file record exists until `complete`.
    #[tracing::instrument(skip(self, request), fields(owner = %uploader.id, size = request.size))]
    pub async fn init(
        &self,
        uploader: Uploader,
        request: InitUploadRequest,
    ) -> Result<InitUploadResponse, UploadError> {
        let file_name = sanitize_file_name(&request.file_name)?;
        let mime_type = request
            .mime_type
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        validate_mime_type(&mime_type)?;
        let plan = ChunkPlan::new(request.size, self.upload.chunk_size)?;
        let pending = request.options.into_pending()?;

        finalize::check_quota(
            self.metadata.as_ref(),
            self.quota.for_role(uploader.role),
            uploader.id,
            plan.size,
        )
        .await?;
        finalize::check_references(self.metadata.as_ref(), uploader.id, &pending).await?;

        let session = UploadSession::new(
            uploader.id,
            file_name,
            mime_type,
            plan,
            self.upload.retry_policy(),
            pending,
            self.upload.session_ttl(),
        )?;
        self.metadata
            .create_session(&session_to_row(&session)?)
            .await?;
        UPLOAD_SESSIONS_CREATED.inc();

        tracing::info!(
            upload_id = %session.id,
            total_parts = plan.total_parts,
            "Upload session created"
        );

        Ok(InitUploadResponse {
            upload_id: session.id,
            chunk_size: plan.chunk_size,
            total_parts: plan.total_parts,
            ttl_seconds: self.upload.session_ttl_secs,
            retry: session.retry,
        })
    }

    /// Store one part. Re-uploading an index replaces the earlier bytes.
    #[tracing::instrument(skip(self, data), fields(owner = %uploader.id, upload_id = %upload_id, part = index))]
    pub async fn upload_part(
        &self,
        uploader: Uploader,
        upload_id: UploadId,
        index: u32,
        data: Bytes,
    ) -> Result<PartReceipt, UploadError> {
        let start = Instant::now();
        let session = self.live_session(uploader.id, upload_id).await?;

        let expected = session.plan.expected_part_len(index).ok_or_else(|| {
            UploadError::Validation(format!(
                "part index {index} out of range (0..{})",
                session.plan.total_parts
            ))
        })?;
        let size = data.len() as u64;
        if size != expected {
            return Err(UploadError::Validation(format!(
                "part {index} must be exactly {expected} bytes, got {size}"
            )));
        }

        let key = part_key(upload_id, index);
        self.storage.put(&key, data).await?;

        let marked = self
            .metadata
            .mark_part_received(*upload_id.as_uuid(), index, size, OffsetDateTime::now_utc())
            .await?;
        if !marked {
            // The session was completed, aborted or swept while we wrote.
            self.discard_object(&key).await;
            return Err(UploadError::NotFound);
        }

        PARTS_UPLOADED.inc();
        BYTES_UPLOADED.inc_by(size);
        PART_UPLOAD_DURATION.observe(start.elapsed().as_secs_f64());

        Ok(PartReceipt {
            upload_id,
            part: index,
            size,
        })
    }

    /// Received part indices, ascending.
    pub async fn status(
        &self,
        owner: UserId,
        upload_id: UploadId,
    ) -> Result<UploadStatus, UploadError> {
        let session = self.live_session(owner, upload_id).await?;
        let received = self.received_parts(upload_id).await?;

        Ok(UploadStatus {
            upload_id,
            total_parts: session.plan.total_parts,
            received_parts: received.into_iter().collect(),
        })
    }

    /// Reassemble the parts in index order and create the file record.
    ///
    /// Succeeds at most once per session. Concurrent calls race on the
    /// session claim; losers get [`UploadError::NotFound`] and leave no
    /// trace behind.
    #[tracing::instrument(skip(self), fields(owner = %uploader.id, upload_id = %upload_id))]
    pub async fn complete(
        &self,
        uploader: Uploader,
        upload_id: UploadId,
    ) -> Result<FileRecord, UploadError> {
        let start = Instant::now();
        let session = self.live_session(uploader.id, upload_id).await?;

        let received = self.received_parts(upload_id).await?;
        let missing = session.plan.missing(&received);
        if !missing.is_empty() {
            return Err(UploadError::IncompleteUpload { missing });
        }

        // Early refusal before the reassembly copy. The binding check runs
        // again inside the insert transaction.
        let quota = self.quota.for_role(uploader.role);
        finalize::check_quota(self.metadata.as_ref(), quota, uploader.id, session.plan.size)
            .await?;

        let now = OffsetDateTime::now_utc();
        let resolved = finalize::resolve(
            self.metadata.as_ref(),
            uploader.id,
            &session.pending,
            &session.file_name,
            now,
        )
        .await?;

        let file_id = FileId::new();
        let object_key = file_key(file_id);
        if let Err(e) = self.assemble(&session, &object_key).await {
            return Err(self.assembly_failure(upload_id, e).await);
        }

        let record = finalize::insert_record(
            self.metadata.as_ref(),
            &self.public_base_url,
            uploader.id,
            &session.pending,
            &resolved,
            StoredObject {
                file_id,
                mime_type: &session.mime_type,
                size: session.plan.size,
            },
            finalize::owner_limits(quota, now),
            Some(upload_id),
        )
        .await;

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                self.discard_object(&object_key).await;
                return Err(e);
            }
        };

        self.release_parts(upload_id).await;

        UPLOAD_SESSIONS_COMPLETED.inc();
        FILES_CREATED.with_label_values(&["chunked"]).inc();
        UPLOAD_COMPLETE_DURATION.observe(start.elapsed().as_secs_f64());
        tracing::info!(file_id = %record.id, slug = %record.slug, "Upload completed");

        Ok(record)
    }

    /// Cancel a session and free its parts. Cancelling a session that does
    /// not exist (or no longer exists) succeeds.
    #[tracing::instrument(skip(self), fields(owner = %owner, upload_id = %upload_id))]
    pub async fn abort(&self, owner: UserId, upload_id: UploadId) -> Result<(), UploadError> {
        let Some(row) = self.metadata.get_session(*upload_id.as_uuid()).await? else {
            return Ok(());
        };
        if row.owner_id != *owner.as_uuid() {
            return Err(UploadError::Forbidden);
        }

        if self.metadata.delete_session(*upload_id.as_uuid()).await? {
            UPLOAD_SESSIONS_ABORTED.inc();
            tracing::info!("Upload session aborted");
        }
        self.release_parts(upload_id).await;
        Ok(())
    }

    /// Single-request upload for files below the chunk threshold.
    ///
    /// Produces the same record as a chunked upload with the same options.
    #[tracing::instrument(skip(self, data, options), fields(owner = %uploader.id, size = data.len()))]
    pub async fn upload_single(
        &self,
        uploader: Uploader,
        file_name: &str,
        mime_type: Option<String>,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<FileRecord, UploadError> {
        let size = data.len() as u64;
        if size == 0 {
            return Err(UploadError::Validation("file is empty".to_string()));
        }
        let threshold = self.upload.chunk_threshold_bytes();
        if size > threshold {
            return Err(UploadError::Validation(format!(
                "files larger than {threshold} bytes must use the chunked upload"
            )));
        }

        let file_name = sanitize_file_name(file_name)?;
        let mime_type = mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        validate_mime_type(&mime_type)?;
        let pending = options.into_pending()?;

        let quota = self.quota.for_role(uploader.role);
        finalize::check_quota(self.metadata.as_ref(), quota, uploader.id, size).await?;
        finalize::check_references(self.metadata.as_ref(), uploader.id, &pending).await?;
        let now = OffsetDateTime::now_utc();
        let resolved =
            finalize::resolve(self.metadata.as_ref(), uploader.id, &pending, &file_name, now)
                .await?;

        let file_id = FileId::new();
        let object_key = file_key(file_id);
        self.storage.put(&object_key, data).await?;

        let record = finalize::insert_record(
            self.metadata.as_ref(),
            &self.public_base_url,
            uploader.id,
            &pending,
            &resolved,
            StoredObject {
                file_id,
                mime_type: &mime_type,
                size,
            },
            finalize::owner_limits(quota, now),
            None,
        )
        .await;

        match record {
            Ok(record) => {
                FILES_CREATED.with_label_values(&["single"]).inc();
                BYTES_UPLOADED.inc_by(size);
                Ok(record)
            }
            Err(e) => {
                self.discard_object(&object_key).await;
                Err(e)
            }
        }
    }

    /// Remove an expired session if nobody else has. Returns the number of
    /// parts deleted, or `None` when another caller claimed it first.
    pub(crate) async fn expire(&self, upload_id: UploadId) -> Result<Option<u64>, UploadError> {
        if !self.metadata.delete_session(*upload_id.as_uuid()).await? {
            return Ok(None);
        }
        let deleted = self
            .storage
            .delete_prefix(&part_namespace(upload_id))
            .await?;
        Ok(Some(deleted))
    }

    /// Load a session the caller may act on: it exists, is theirs and has not
    /// expired.
    async fn live_session(
        &self,
        owner: UserId,
        upload_id: UploadId,
    ) -> Result<UploadSession, UploadError> {
        let row = self
            .metadata
            .get_session(*upload_id.as_uuid())
            .await?
            .ok_or(UploadError::NotFound)?;
        let session = session_from_row(row)?;

        if !session.is_owned_by(owner) {
            return Err(UploadError::Forbidden);
        }
        if session.is_expired() {
            return Err(UploadError::NotFound);
        }
        Ok(session)
    }

    async fn received_parts(&self, upload_id: UploadId) -> Result<BTreeSet<u32>, UploadError> {
        let rows = self
            .metadata
            .get_received_parts(*upload_id.as_uuid())
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| u32::try_from(row.part_index).ok())
            .collect())
    }

    /// Stream every part, in index order, into `object_key`.
    async fn assemble(&self, session: &UploadSession, object_key: &str) -> Result<(), StorageError> {
        let mut upload = self.storage.put_stream(object_key).await?;

        for index in 0..session.plan.total_parts {
            let copied = async {
                let mut stream = self.storage.get_stream(&part_key(session.id, index)).await?;
                while let Some(chunk) = stream.next().await {
                    upload.write(chunk?).await?;
                }
                Ok::<_, StorageError>(())
            }
            .await;

            if let Err(e) = copied {
                if let Err(abort_err) = upload.abort().await {
                    tracing::warn!(error = %abort_err, "Failed to abort partial reassembly");
                }
                return Err(e);
            }
        }

        let written = upload.finish().await?;
        if written != session.plan.size {
            self.discard_object(object_key).await;
            return Err(StorageError::SizeMismatch {
                key: object_key.to_string(),
                expected: session.plan.size,
                actual: written,
            });
        }
        Ok(())
    }

    /// A part vanishing mid-reassembly means someone else ended the session.
    async fn assembly_failure(&self, upload_id: UploadId, error: StorageError) -> UploadError {
        if matches!(error, StorageError::NotFound(_))
            && matches!(self.metadata.get_session(*upload_id.as_uuid()).await, Ok(None))
        {
            return UploadError::NotFound;
        }
        UploadError::Storage(error)
    }

    /// Delete the temporary namespace. Failures are left to the orphan sweep.
    async fn release_parts(&self, upload_id: UploadId) {
        if let Err(e) = self.storage.delete_prefix(&part_namespace(upload_id)).await {
            tracing::warn!(
                upload_id = %upload_id,
                error = %e,
                "Failed to delete upload parts; the orphan sweep will retry"
            );
        }
    }

    async fn discard_object(&self, key: &str) {
        match self.storage.delete(key).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => tracing::warn!(key, error = %e, "Failed to discard object"),
        }
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64, UploadError> {
    i64::try_from(value).map_err(|_| UploadError::Validation(format!("{what} out of range")))
}

fn corrupt(upload_id: uuid::Uuid, what: &str) -> UploadError {
    UploadError::Metadata(vault_metadata::MetadataError::Internal(format!(
        "corrupt upload session {upload_id}: {what}"
    )))
}

pub(crate) fn session_to_row(session: &UploadSession) -> Result<UploadSessionRow, UploadError> {
    let metadata_json = serde_json::to_string(&session.pending)
        .map_err(|e| UploadError::Validation(format!("unserializable metadata: {e}")))?;

    Ok(UploadSessionRow {
        upload_id: *session.id.as_uuid(),
        owner_id: *session.owner.as_uuid(),
        file_name: session.file_name.clone(),
        mime_type: session.mime_type.clone(),
        size: to_i64(session.plan.size, "size")?,
        chunk_size: to_i64(session.plan.chunk_size, "chunk size")?,
        total_parts: i64::from(session.plan.total_parts),
        retry_base_ms: to_i64(session.retry.base_ms, "retry base")?,
        retry_max_ms: to_i64(session.retry.max_ms, "retry max")?,
        max_retries: i64::from(session.retry.max_retries),
        metadata_json,
        created_at: session.created_at,
        expires_at: session.expires_at,
    })
}

pub(crate) fn session_from_row(row: UploadSessionRow) -> Result<UploadSession, UploadError> {
    let id = row.upload_id;
    let size = u64::try_from(row.size).map_err(|_| corrupt(id, "size"))?;
    let chunk_size = u64::try_from(row.chunk_size).map_err(|_| corrupt(id, "chunk size"))?;
    let plan = ChunkPlan::new(size, chunk_size).map_err(|e| corrupt(id, &e.to_string()))?;
    if i64::from(plan.total_parts) != row.total_parts {
        return Err(corrupt(id, "part count"));
    }
    let pending: PendingFileMetadata =
        serde_json::from_str(&row.metadata_json).map_err(|e| corrupt(id, &e.to_string()))?;

    Ok(UploadSession {
        id: UploadId::from(id),
        owner: UserId::from(row.owner_id),
        file_name: row.file_name,
        mime_type: row.mime_type,
        plan,
        retry: RetryPolicy {
            base_ms: u64::try_from(row.retry_base_ms).map_err(|_| corrupt(id, "retry"))?,
            max_ms: u64::try_from(row.retry_max_ms).map_err(|_| corrupt(id, "retry"))?,
            max_retries: u32::try_from(row.max_retries).map_err(|_| corrupt(id, "retry"))?,
        },
        pending,
        created_at: row.created_at,
        expires_at: row.expires_at,
    })
}
