//! Tests for admin token provisioning.

mod common;

use axum::http::StatusCode;
use common::TestServer;
use common::fixtures::sha256_hash;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use vault_core::config::AdminConfig;
use vault_metadata::models::{TokenRow, UserRow};
use vault_server::bootstrap::ensure_admin_token;

const ADMIN_TOKEN: &str = "test-admin-token";

fn admin_config(raw: &str) -> AdminConfig {
    AdminConfig {
        token_hash: Some(sha256_hash(raw.as_bytes())),
        token_scopes: None,
        token_description: Some("bootstrap".to_string()),
    }
}

#[tokio::test]
async fn test_bootstrap_creates_admin_user_and_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_admin_token(metadata.as_ref(), &AdminConfig::for_testing())
        .await
        .unwrap();

    let token = metadata
        .get_token_by_hash(&sha256_hash(ADMIN_TOKEN.as_bytes()))
        .await
        .unwrap()
        .expect("admin token created");
    assert_eq!(token.scopes, r#"["admin"]"#);
    assert_eq!(
        metadata.get_bootstrap_token_id().await.unwrap(),
        Some(token.token_id)
    );

    let user = metadata.get_user(token.user_id).await.unwrap().unwrap();
    assert_eq!(user.role, "admin");

    // The token works end to end, including the admin sweep.
    let (status, _) = server
        .json_request("POST", "/admin/sweep", None, Some(ADMIN_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let config = admin_config("stable");

    ensure_admin_token(metadata.as_ref(), &config).await.unwrap();
    let first = metadata.get_bootstrap_token_id().await.unwrap();
    ensure_admin_token(metadata.as_ref(), &config).await.unwrap();
    let second = metadata.get_bootstrap_token_id().await.unwrap();

    assert_eq!(first, second);
    let token = metadata.get_token(first.unwrap()).await.unwrap().unwrap();
    assert_eq!(metadata.list_tokens(token.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bootstrap_rotation_revokes_previous() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_admin_token(metadata.as_ref(), &admin_config("old")).await.unwrap();
    let old_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();

    ensure_admin_token(metadata.as_ref(), &admin_config("new")).await.unwrap();
    let new_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();
    assert_ne!(old_id, new_id);

    let old = metadata.get_token(old_id).await.unwrap().unwrap();
    let new = metadata.get_token(new_id).await.unwrap().unwrap();
    assert!(old.revoked_at.is_some());
    assert!(new.revoked_at.is_none());
    assert_eq!(old.user_id, new.user_id);

    let (status, _) = server
        .json_request("GET", "/upload/config", None, Some("old"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = server
        .json_request("GET", "/upload/config", None, Some("new"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bootstrap_removed_hash_revokes_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_admin_token(metadata.as_ref(), &admin_config("gone")).await.unwrap();
    let token_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();

    ensure_admin_token(metadata.as_ref(), &AdminConfig::default())
        .await
        .unwrap();
    assert_eq!(metadata.get_bootstrap_token_id().await.unwrap(), None);
    let token = metadata.get_token(token_id).await.unwrap().unwrap();
    assert!(token.revoked_at.is_some());

    // Nothing configured and nothing to revoke is a no-op.
    ensure_admin_token(metadata.as_ref(), &AdminConfig::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bootstrap_normalizes_hash() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let hash = sha256_hash(b"shouty");

    let config = AdminConfig {
        token_hash: Some(format!("sha256:{}", hash.to_uppercase())),
        ..admin_config("unused")
    };
    ensure_admin_token(metadata.as_ref(), &config).await.unwrap();

    assert!(metadata.get_token_by_hash(&hash).await.unwrap().is_some());
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_config() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let short = AdminConfig {
        token_hash: Some("abc123".to_string()),
        ..AdminConfig::default()
    };
    assert!(ensure_admin_token(metadata.as_ref(), &short).await.is_err());

    let bad_scope = AdminConfig {
        token_scopes: Some(vec!["files:delete".to_string()]),
        ..admin_config("scoped")
    };
    assert!(ensure_admin_token(metadata.as_ref(), &bad_scope).await.is_err());
    assert_eq!(metadata.get_bootstrap_token_id().await.unwrap(), None);
}

#[tokio::test]
async fn test_bootstrap_rejects_revoked_or_expired_hash() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let now = OffsetDateTime::now_utc();

    let user_id = Uuid::new_v4();
    metadata
        .upsert_user(&UserRow {
            user_id,
            role: "admin".to_string(),
            created_at: now,
        })
        .await
        .unwrap();

    for (raw, expires_at, revoked_at) in [
        ("revoked", None, Some(now)),
        ("expired", Some(now - Duration::hours(1)), None),
    ] {
        metadata
            .create_token(&TokenRow {
                token_id: Uuid::new_v4(),
                user_id,
                token_hash: sha256_hash(raw.as_bytes()),
                scopes: r#"["admin"]"#.to_string(),
                expires_at,
                revoked_at,
                created_at: now,
                last_used_at: None,
                description: None,
            })
            .await
            .unwrap();

        let result = ensure_admin_token(metadata.as_ref(), &admin_config(raw)).await;
        assert!(result.is_err(), "{raw} hash accepted");
    }
}

#[tokio::test]
async fn test_bootstrap_survives_deleted_previous_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_admin_token(metadata.as_ref(), &admin_config("first")).await.unwrap();
    let token_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();
    sqlx::query("DELETE FROM tokens WHERE token_id = ?")
        .bind(token_id)
        .execute(server.sqlite.pool())
        .await
        .unwrap();

    ensure_admin_token(metadata.as_ref(), &admin_config("second")).await.unwrap();
    assert_ne!(metadata.get_bootstrap_token_id().await.unwrap(), Some(token_id));
}
