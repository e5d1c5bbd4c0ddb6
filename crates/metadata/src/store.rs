//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    BootstrapRepo, FileRepo, FolderRepo, TagRepo, TokenRepo, UploadRepo, UserRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    UploadRepo
    + FileRepo
    + FolderRepo
    + TagRepo
    + TokenRepo
    + UserRepo
    + BootstrapRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        Self::connect(opts, query_timeout_secs).await
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(opts, None).await
    }

    async fn connect(
        opts: SqliteConnectOptions,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let pool = SqlitePoolOptions::new()
            // One connection serializes writers. Every conditional delete and
            // the finalize transaction rely on this for exactly-once outcomes.
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        if let Some(secs) = query_timeout_secs {
            tracing::debug!(
                query_timeout_secs = secs,
                "SQLite query timeout is advisory only; statements cannot be cancelled"
            );
        }

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn to_i64(value: u64, what: &str) -> MetadataResult<i64> {
    i64::try_from(value)
        .map_err(|_| MetadataError::Internal(format!("{what} out of range: {value}")))
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use sqlx::SqliteConnection;
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn insert_file(
        conn: &mut SqliteConnection,
        file: &FileRow,
        tag_ids: &[Uuid],
    ) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO files (
                file_id, owner_id, slug, name, original_name, mime_type, size,
                object_key, is_public, description, max_views, max_views_action,
                views, folder_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file.file_id)
        .bind(file.owner_id)
        .bind(&file.slug)
        .bind(&file.name)
        .bind(&file.original_name)
        .bind(&file.mime_type)
        .bind(file.size)
        .bind(&file.object_key)
        .bind(file.is_public)
        .bind(&file.description)
        .bind(file.max_views)
        .bind(&file.max_views_action)
        .bind(file.views)
        .bind(file.folder_id)
        .bind(file.created_at)
        .execute(&mut *conn)
        .await?;

        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO file_tags (file_id, tag_id) VALUES (?, ?)")
                .bind(file.file_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    async fn owner_bytes(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        since: Option<OffsetDateTime>,
    ) -> MetadataResult<u64> {
        let total: i64 = match since {
            Some(since) => {
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(size), 0) FROM files WHERE owner_id = ? AND created_at >= ?",
                )
                .bind(owner_id)
                .bind(since)
                .fetch_one(&mut *conn)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM files WHERE owner_id = ?")
                    .bind(owner_id)
                    .fetch_one(&mut *conn)
                    .await?
            }
        };
        Ok(total.max(0) as u64)
    }

    async fn check_limits(conn: &mut SqliteConnection, file: &NewFile) -> MetadataResult<()> {
        let owner_id = file.row.owner_id;
        let size = file.row.size.max(0) as u64;

        if let Some(limit) = file.limits.storage_bytes {
            let used = owner_bytes(conn, owner_id, None).await?;
            if used.saturating_add(size) > limit {
                return Err(MetadataError::QuotaExceeded(format!(
                    "storage quota of {limit} bytes would be exceeded ({used} bytes used)"
                )));
            }
        }

        if let Some((limit, since)) = file.limits.recent_bytes {
            let recent = owner_bytes(conn, owner_id, Some(since)).await?;
            if recent.saturating_add(size) > limit {
                return Err(MetadataError::QuotaExceeded(format!(
                    "upload limit of {limit} bytes since {since} would be exceeded ({recent} bytes uploaded)"
                )));
            }
        }

        Ok(())
    }

    async fn upsert_folder(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        name: &str,
    ) -> MetadataResult<FolderRow> {
        sqlx::query(
            r#"
            INSERT INTO folders (folder_id, owner_id, name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (owner_id, name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(name)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, FolderRow>("SELECT * FROM folders WHERE owner_id = ? AND name = ?")
            .bind(owner_id)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("folder '{name}'")))
    }

    async fn upsert_tag(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        name: &str,
    ) -> MetadataResult<TagRow> {
        sqlx::query(
            r#"
            INSERT INTO tags (tag_id, owner_id, name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (owner_id, name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(name)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, TagRow>("SELECT * FROM tags WHERE owner_id = ? AND name = ?")
            .bind(owner_id)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("tag '{name}'")))
    }

    /// Limit check, named folder and tags, then the row itself. Must run
    /// inside a transaction so a failure at any step leaves nothing behind.
    async fn insert_new_file(
        conn: &mut SqliteConnection,
        file: &NewFile,
    ) -> MetadataResult<FileRow> {
        check_limits(conn, file).await?;

        let mut row = file.row.clone();
        if let Some(name) = &file.folder_name {
            row.folder_id = Some(upsert_folder(conn, row.owner_id, name).await?.folder_id);
        }

        let mut tag_ids = file.tag_ids.clone();
        for name in &file.tag_names {
            tag_ids.push(upsert_tag(conn, row.owner_id, name).await?.tag_id);
        }

        insert_file(conn, &row, &tag_ids).await?;
        Ok(row)
    }

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO upload_sessions (
                    upload_id, owner_id, file_name, mime_type, size, chunk_size,
                    total_parts, retry_base_ms, retry_max_ms, max_retries,
                    metadata_json, created_at, expires_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session.upload_id)
            .bind(session.owner_id)
            .bind(&session.file_name)
            .bind(&session.mime_type)
            .bind(session.size)
            .bind(session.chunk_size)
            .bind(session.total_parts)
            .bind(session.retry_base_ms)
            .bind(session.retry_max_ms)
            .bind(session.max_retries)
            .bind(&session.metadata_json)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_session(&self, upload_id: Uuid) -> MetadataResult<Option<UploadSessionRow>> {
            let row = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions WHERE upload_id = ?",
            )
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn mark_part_received(
            &self,
            upload_id: Uuid,
            part_index: u32,
            size_bytes: u64,
            received_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            // The EXISTS guard and the upsert run as one statement, so a part
            // can never be recorded against a session that was just removed.
            let result = sqlx::query(
                r#"
                INSERT INTO upload_parts (upload_id, part_index, size_bytes, received_at)
                SELECT ?, ?, ?, ?
                WHERE EXISTS (SELECT 1 FROM upload_sessions WHERE upload_id = ?)
                ON CONFLICT (upload_id, part_index) DO UPDATE
                SET size_bytes = excluded.size_bytes, received_at = excluded.received_at
                "#,
            )
            .bind(upload_id)
            .bind(i64::from(part_index))
            .bind(to_i64(size_bytes, "part size")?)
            .bind(received_at)
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn get_received_parts(
            &self,
            upload_id: Uuid,
        ) -> MetadataResult<Vec<UploadPartRow>> {
            let rows = sqlx::query_as::<_, UploadPartRow>(
                "SELECT * FROM upload_parts WHERE upload_id = ? ORDER BY part_index",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_session(&self, upload_id: Uuid) -> MetadataResult<bool> {
            // Part rows go with the session through ON DELETE CASCADE.
            let result = sqlx::query("DELETE FROM upload_sessions WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn finalize_session(
            &self,
            upload_id: Uuid,
            file: &NewFile,
        ) -> MetadataResult<Option<FileRow>> {
            let mut tx = self.pool.begin().await?;

            let claimed = sqlx::query("DELETE FROM upload_sessions WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&mut *tx)
                .await?;

            if claimed.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(None);
            }

            // Dropping the transaction on error rolls the claim back.
            let stored = insert_new_file(&mut tx, file).await?;
            tx.commit().await?;
            Ok(Some(stored))
        }

        async fn get_expired_sessions(
            &self,
            now: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<UploadSessionRow>> {
            let rows = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions WHERE expires_at <= ? ORDER BY expires_at LIMIT ?",
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_active_sessions(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upload_sessions")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn create_file(&self, file: &NewFile) -> MetadataResult<FileRow> {
            let mut tx = self.pool.begin().await?;
            let stored = insert_new_file(&mut tx, file).await?;
            tx.commit().await?;
            Ok(stored)
        }

        async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_file_by_slug(&self, slug: &str) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn slug_exists(&self, slug: &str) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE slug = ?)")
                    .bind(slug)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn get_file_tags(&self, file_id: Uuid) -> MetadataResult<Vec<String>> {
            let rows: Vec<(String,)> = sqlx::query_as(
                r#"
                SELECT t.name FROM tags t
                JOIN file_tags ft ON ft.tag_id = t.tag_id
                WHERE ft.file_id = ?
                ORDER BY t.name
                "#,
            )
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|r| r.0).collect())
        }

        async fn list_files(&self, owner_id: Uuid) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE owner_id = ? ORDER BY created_at DESC",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn storage_used(&self, owner_id: Uuid) -> MetadataResult<u64> {
            let mut conn = self.pool.acquire().await?;
            owner_bytes(&mut conn, owner_id, None).await
        }

        async fn uploaded_since(
            &self,
            owner_id: Uuid,
            since: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let mut conn = self.pool.acquire().await?;
            owner_bytes(&mut conn, owner_id, Some(since)).await
        }
    }

    #[async_trait]
    impl FolderRepo for SqliteStore {
        async fn get_folder(&self, folder_id: Uuid) -> MetadataResult<Option<FolderRow>> {
            let row = sqlx::query_as::<_, FolderRow>("SELECT * FROM folders WHERE folder_id = ?")
                .bind(folder_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_or_create_folder(
            &self,
            owner_id: Uuid,
            name: &str,
        ) -> MetadataResult<FolderRow> {
            let mut conn = self.pool.acquire().await?;
            upsert_folder(&mut conn, owner_id, name).await
        }
    }

    #[async_trait]
    impl TagRepo for SqliteStore {
        async fn get_owned_tags(
            &self,
            owner_id: Uuid,
            tag_ids: &[Uuid],
        ) -> MetadataResult<Vec<TagRow>> {
            let mut tags = Vec::with_capacity(tag_ids.len());
            for tag_id in tag_ids {
                let row = sqlx::query_as::<_, TagRow>(
                    "SELECT * FROM tags WHERE tag_id = ? AND owner_id = ?",
                )
                .bind(tag_id)
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;
                tags.extend(row);
            }
            Ok(tags)
        }

        async fn get_or_create_tag(&self, owner_id: Uuid, name: &str) -> MetadataResult<TagRow> {
            let mut conn = self.pool.acquire().await?;
            upsert_tag(&mut conn, owner_id, name).await
        }
    }

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn upsert_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO users (user_id, role, created_at) VALUES (?, ?, ?)
                ON CONFLICT (user_id) DO UPDATE SET role = excluded.role
                "#,
            )
            .bind(user.user_id)
            .bind(&user.role)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, user_id, token_hash, scopes, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(&token.scopes)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("token {token_id}")));
            }
            Ok(())
        }

        async fn list_tokens(&self, user_id: Uuid) -> MetadataResult<Vec<TokenRow>> {
            let rows = sqlx::query_as::<_, TokenRow>(
                "SELECT * FROM tokens WHERE user_id = ? ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid bootstrap_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn clear_bootstrap_token_id(&self) -> MetadataResult<()> {
            sqlx::query("UPDATE bootstrap_state SET bootstrap_token_id = NULL WHERE id = 1")
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Users known to the auth provider; role drives quotas
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    role TEXT NOT NULL DEFAULT 'user',
    created_at TEXT NOT NULL
);

-- API tokens
CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL UNIQUE,
    scopes TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);

-- Bootstrap marker
CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);
INSERT OR IGNORE INTO bootstrap_state (id, bootstrap_token_id) VALUES (1, NULL);

-- Upload sessions
CREATE TABLE IF NOT EXISTS upload_sessions (
    upload_id BLOB PRIMARY KEY,
    owner_id BLOB NOT NULL,
    file_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL CHECK (size > 0),
    chunk_size INTEGER NOT NULL CHECK (chunk_size > 0),
    total_parts INTEGER NOT NULL CHECK (total_parts > 0),
    retry_base_ms INTEGER NOT NULL,
    retry_max_ms INTEGER NOT NULL,
    max_retries INTEGER NOT NULL,
    metadata_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_expires ON upload_sessions(expires_at);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_owner ON upload_sessions(owner_id);

-- Received parts, one row per index
CREATE TABLE IF NOT EXISTS upload_parts (
    upload_id BLOB NOT NULL REFERENCES upload_sessions(upload_id) ON DELETE CASCADE,
    part_index INTEGER NOT NULL CHECK (part_index >= 0),
    size_bytes INTEGER NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (upload_id, part_index)
);

-- Folders
CREATE TABLE IF NOT EXISTS folders (
    folder_id BLOB PRIMARY KEY,
    owner_id BLOB NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (owner_id, name)
);

-- Tags
CREATE TABLE IF NOT EXISTS tags (
    tag_id BLOB PRIMARY KEY,
    owner_id BLOB NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (owner_id, name)
);

-- Finalized files
CREATE TABLE IF NOT EXISTS files (
    file_id BLOB PRIMARY KEY,
    owner_id BLOB NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    original_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    object_key TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    max_views INTEGER,
    max_views_action TEXT NOT NULL DEFAULT 'hide',
    views INTEGER NOT NULL DEFAULT 0,
    folder_id BLOB REFERENCES folders(folder_id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner_id, created_at);

CREATE TABLE IF NOT EXISTS file_tags (
    file_id BLOB NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
    tag_id BLOB NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
    PRIMARY KEY (file_id, tag_id)
);
"#;
