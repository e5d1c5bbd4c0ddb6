//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;
use vault_core::config::{AppConfig, StorageConfig};
use vault_core::token::Role;
use vault_metadata::models::{TokenRow, UserRow};
use vault_metadata::{MetadataStore, SqliteStore};
use vault_server::{AppState, create_router};
use vault_storage::{MemoryBackend, ObjectStore};

use super::fixtures::sha256_hash;

/// Boundary used by [`multipart_body`].
pub const MULTIPART_BOUNDARY: &str = "vault-test-boundary";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// The storage behind `state.storage`, for timestamp manipulation.
    pub memory: Arc<MemoryBackend>,
    /// The metadata store behind `state.metadata`, for raw SQL.
    pub sqlite: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

/// A user with a raw bearer token.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct TestUser {
    pub user_id: Uuid,
    pub token: String,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with in-memory storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let memory = Arc::new(MemoryBackend::new());
        let storage: Arc<dyn ObjectStore> = memory.clone();

        let db_path = temp_dir.path().join("metadata.db");
        let sqlite = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );
        let metadata: Arc<dyn MetadataStore> = sqlite.clone();

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Memory;
        config.server.public_base_url = "https://vault.test".to_string();
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata).expect("Invalid test configuration");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            memory,
            sqlite,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying storage.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }

    /// Create a user with the given role and a token carrying `scopes`
    /// (a JSON array).
    pub async fn create_user(&self, role: Role, scopes: &str) -> TestUser {
        let user_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        self.metadata()
            .upsert_user(&UserRow {
                user_id,
                role: role.as_str().to_string(),
                created_at: now,
            })
            .await
            .expect("Failed to create user");

        let token = format!("test-token-{}", Uuid::new_v4());
        self.metadata()
            .create_token(&TokenRow {
                token_id: Uuid::new_v4(),
                user_id,
                token_hash: sha256_hash(token.as_bytes()),
                scopes: scopes.to_string(),
                expires_at: None,
                revoked_at: None,
                created_at: now,
                last_used_at: None,
                description: Some("Test Token".to_string()),
            })
            .await
            .expect("Failed to create token");

        TestUser { user_id, token }
    }

    /// A regular user allowed to upload.
    pub async fn uploader(&self) -> TestUser {
        self.create_user(Role::User, r#"["upload"]"#).await
    }

    /// Send a request and decode the JSON response body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a JSON request.
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// POST /upload?action=init, returning the response body.
    pub async fn init_upload(&self, user: &TestUser, body: Value) -> (StatusCode, Value) {
        self.json_request("POST", "/upload?action=init", Some(body), Some(&user.token))
            .await
    }

    /// PUT one part.
    pub async fn put_part(
        &self,
        user: &TestUser,
        upload_id: &str,
        index: u32,
        data: Bytes,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/upload?action=part&uploadId={upload_id}&part={index}"))
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(data))
            .unwrap();
        self.send(request).await
    }

    /// GET the status of a session.
    pub async fn status(&self, user: &TestUser, upload_id: &str) -> (StatusCode, Value) {
        self.json_request(
            "GET",
            &format!("/upload?action=status&uploadId={upload_id}"),
            None,
            Some(&user.token),
        )
        .await
    }

    /// POST /upload?action=complete.
    pub async fn complete(&self, user: &TestUser, upload_id: &str) -> (StatusCode, Value) {
        self.json_request(
            "POST",
            "/upload?action=complete",
            Some(serde_json::json!({ "uploadId": upload_id })),
            Some(&user.token),
        )
        .await
    }

    /// POST /upload?action=abort.
    pub async fn abort(&self, user: &TestUser, upload_id: &str) -> (StatusCode, Value) {
        self.json_request(
            "POST",
            "/upload?action=abort",
            Some(serde_json::json!({ "uploadId": upload_id })),
            Some(&user.token),
        )
        .await
    }

    /// Single-request multipart upload.
    pub async fn upload_multipart(
        &self,
        user: &TestUser,
        file_name: &str,
        data: &[u8],
        metadata: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(multipart_body(file_name, data, metadata)))
            .unwrap();
        self.send(request).await
    }

    /// Keys currently stored under a session's part namespace.
    pub async fn part_keys(&self, upload_id: &str) -> Vec<String> {
        self.storage()
            .list(&format!("uploads/{upload_id}/"))
            .await
            .unwrap()
    }

    /// Move a session's deadline into the past.
    pub async fn expire_session(&self, upload_id: &str) {
        let id = Uuid::parse_str(upload_id).unwrap();
        let past = OffsetDateTime::now_utc() - time::Duration::hours(1);
        sqlx::query("UPDATE upload_sessions SET expires_at = ? WHERE upload_id = ?")
            .bind(past)
            .bind(id)
            .execute(self.sqlite.pool())
            .await
            .unwrap();
    }
}

/// Build a multipart body with a `file` field and an optional `metadata`
/// JSON field.
#[allow(dead_code)]
pub fn multipart_body(file_name: &str, data: &[u8], metadata: Option<Value>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(metadata) = metadata {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"metadata\"\r\n\r\n{metadata}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}
