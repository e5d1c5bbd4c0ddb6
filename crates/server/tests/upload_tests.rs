//! Integration tests for the chunked and single-request upload protocol.

mod common;

use axum::http::StatusCode;
use bytes::Bytes;
use common::fixtures::{seeded_bytes, split_into_parts};
use common::{TestServer, TestUser};
use serde_json::{Value, json};

const CHUNK: usize = 64 * 1024;

/// Init a session for `size` bytes and return its ID.
async fn init(server: &TestServer, user: &TestUser, name: &str, size: usize) -> String {
    let (status, body) = server
        .init_upload(user, json!({ "fileName": name, "size": size, "mimeType": "text/plain" }))
        .await;
    assert_eq!(status, StatusCode::OK, "init failed: {body}");
    body["uploadId"].as_str().unwrap().to_string()
}

async fn stored_object(server: &TestServer, record: &Value) -> Bytes {
    let key = format!("files/{}", record["id"].as_str().unwrap());
    server.storage().get(&key).await.unwrap()
}

#[tokio::test]
async fn test_init_returns_plan_and_headers() {
    let server = TestServer::new().await;
    let user = server.uploader().await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/upload?action=init")
        .header("Authorization", format!("Bearer {}", user.token))
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from(
            json!({ "fileName": "video.mp4", "size": CHUNK * 2 + 10 }).to_string(),
        ))
        .unwrap();
    let response = tower::ServiceExt::oneshot(server.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["Upload-Chunk-Size"], CHUNK.to_string().as_str());
    assert_eq!(headers["Upload-Chunk-TTL"], "21600");
    assert_eq!(headers["Upload-Retry-Max-Retries"], "5");
    assert!(headers.contains_key("Upload-Retry-Base-Ms"));
    assert!(headers.contains_key("Upload-Retry-Max-Ms"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["totalParts"], 3);
    assert_eq!(body["chunkSize"], CHUNK);
    assert_eq!(body["retry"]["maxRetries"], 5);
}

#[tokio::test]
async fn test_init_validation_errors() {
    let server = TestServer::new().await;
    let user = server.uploader().await;

    for body in [
        json!({ "fileName": "empty.bin", "size": 0 }),
        json!({ "fileName": "", "size": 10 }),
        json!({ "fileName": "a.bin", "size": 10, "mimeType": "not a mime" }),
        json!({ "fileName": "a.bin", "size": 10, "slug": "bad slug!" }),
        json!({ "fileName": "a.bin", "size": 10, "folderId": uuid::Uuid::new_v4(), "folderName": "x" }),
    ] {
        let (status, response) = server.init_upload(&user, body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body} -> {response}");
        assert_eq!(response["code"], "validation_error");
    }
}

#[tokio::test]
async fn test_chunked_upload_roundtrip() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(7, CHUNK * 2 + 100);
    let upload_id = init(&server, &user, "report.txt", data.len()).await;

    for (index, part) in split_into_parts(&data, CHUNK).into_iter().enumerate() {
        let (status, receipt) = server.put_part(&user, &upload_id, index as u32, part.clone()).await;
        assert_eq!(status, StatusCode::OK, "{receipt}");
        assert_eq!(receipt["part"], index);
        assert_eq!(receipt["size"], part.len());
    }

    let (status, record) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CREATED, "{record}");
    assert_eq!(record["size"], data.len());
    assert_eq!(record["originalName"], "report.txt");
    assert_eq!(record["mimeType"], "text/plain");
    let slug = record["slug"].as_str().unwrap();
    assert_eq!(record["url"], format!("https://vault.test/f/{slug}"));

    assert_eq!(stored_object(&server, &record).await, data);
    assert!(server.part_keys(&upload_id).await.is_empty());

    // The session is consumed.
    let (status, _) = server.status(&user, &upload_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ten_megabyte_file_in_two_parts() {
    let server = TestServer::with_config(|config| config.upload.chunk_size = 5_000_000).await;
    let user = server.uploader().await;

    let (status, body) = server
        .init_upload(&user, json!({ "fileName": "zeros.bin", "size": 10_000_000 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalParts"], 2);
    let upload_id = body["uploadId"].as_str().unwrap().to_string();

    let zeros = Bytes::from(vec![0u8; 5_000_000]);
    for index in 0..2 {
        let (status, _) = server.put_part(&user, &upload_id, index, zeros.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, record) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CREATED, "{record}");
    assert_eq!(record["size"], 10_000_000);
    assert_eq!(record["mimeType"], "application/octet-stream");

    let object = stored_object(&server, &record).await;
    assert_eq!(object.len(), 10_000_000);
    assert!(object.iter().all(|b| *b == 0));
}

#[tokio::test]
async fn test_part_upload_is_idempotent() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(11, CHUNK + 5);
    let parts = split_into_parts(&data, CHUNK);
    let upload_id = init(&server, &user, "twice.bin", data.len()).await;

    for _ in 0..2 {
        let (status, _) = server.put_part(&user, &upload_id, 0, parts[0].clone()).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = server.status(&user, &upload_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["receivedParts"], json!([0]));
    assert_eq!(body["totalParts"], 2);

    server.put_part(&user, &upload_id, 1, parts[1].clone()).await;
    let (status, record) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored_object(&server, &record).await, data);
}

#[tokio::test]
async fn test_completion_is_order_independent() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(3, CHUNK * 3);
    let parts = split_into_parts(&data, CHUNK);

    let shuffled = init(&server, &user, "shuffled.bin", data.len()).await;
    for index in [2u32, 0, 1] {
        let (status, _) = server
            .put_part(&user, &shuffled, index, parts[index as usize].clone())
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, shuffled_record) = server.complete(&user, &shuffled).await;

    let ordered = init(&server, &user, "ordered.bin", data.len()).await;
    for (index, part) in parts.iter().enumerate() {
        server.put_part(&user, &ordered, index as u32, part.clone()).await;
    }
    let (_, ordered_record) = server.complete(&user, &ordered).await;

    let a = stored_object(&server, &shuffled_record).await;
    let b = stored_object(&server, &ordered_record).await;
    assert_eq!(a, b);
    assert_eq!(a, data);
}

#[tokio::test]
async fn test_complete_requires_every_part() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(5, CHUNK * 3);
    let parts = split_into_parts(&data, CHUNK);
    let upload_id = init(&server, &user, "gated.bin", data.len()).await;

    server.put_part(&user, &upload_id, 0, parts[0].clone()).await;
    server.put_part(&user, &upload_id, 1, parts[1].clone()).await;

    let (status, body) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "incomplete_upload");
    assert_eq!(body["missing"], json!([2]));

    // Nothing was thrown away.
    assert_eq!(server.part_keys(&upload_id).await.len(), 2);
    let (_, status_body) = server.status(&user, &upload_id).await;
    assert_eq!(status_body["receivedParts"], json!([0, 1]));

    server.put_part(&user, &upload_id, 2, parts[2].clone()).await;
    let (status, record) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored_object(&server, &record).await, data);
}

#[tokio::test]
async fn test_part_validation() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let upload_id = init(&server, &user, "strict.bin", CHUNK + 10).await;

    // Out of range.
    let (status, _) = server.put_part(&user, &upload_id, 2, Bytes::from(vec![1u8; 10])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong length for a full part.
    let (status, _) = server.put_part(&user, &upload_id, 0, Bytes::from(vec![1u8; 10])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong length for the final part.
    let (status, _) = server.put_part(&user, &upload_id, 1, Bytes::from(vec![1u8; 11])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Larger than any chunk.
    let (status, _) = server
        .put_part(&user, &upload_id, 0, Bytes::from(vec![1u8; CHUNK + 1]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Rejected parts mutate nothing.
    assert!(server.part_keys(&upload_id).await.is_empty());
    let (_, body) = server.status(&user, &upload_id).await;
    assert_eq!(body["receivedParts"], json!([]));
}

#[tokio::test]
async fn test_concurrent_complete_creates_one_file() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(9, CHUNK * 2);
    let upload_id = init(&server, &user, "race.bin", data.len()).await;
    for (index, part) in split_into_parts(&data, CHUNK).into_iter().enumerate() {
        server.put_part(&user, &upload_id, index as u32, part).await;
    }

    let (a, b) = tokio::join!(
        server.complete(&user, &upload_id),
        server.complete(&user, &upload_id)
    );

    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::NOT_FOUND]);

    let files = server
        .metadata()
        .list_files(user.user_id)
        .await
        .unwrap();
    assert_eq!(files.len(), 1);

    let objects = server.storage().list("files/").await.unwrap();
    assert_eq!(objects.len(), 1);
}

#[tokio::test]
async fn test_abort_cleans_up() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(2, CHUNK * 2);
    let parts = split_into_parts(&data, CHUNK);
    let upload_id = init(&server, &user, "abandon.bin", data.len()).await;
    server.put_part(&user, &upload_id, 0, parts[0].clone()).await;

    let (status, body) = server.abort(&user, &upload_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = server.status(&user, &upload_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(server.part_keys(&upload_id).await.is_empty());

    // Aborting twice is harmless; completing is not possible.
    let (status, _) = server.abort(&user, &upload_id).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A late part does not resurrect the session.
    let (status, _) = server.put_part(&user, &upload_id, 1, parts[1].clone()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(server.part_keys(&upload_id).await.is_empty());
}

#[tokio::test]
async fn test_sessions_are_isolated_between_users() {
    let server = TestServer::new().await;
    let alice = server.uploader().await;
    let bob = server.uploader().await;
    let data = seeded_bytes(4, CHUNK * 2);
    let parts = split_into_parts(&data, CHUNK);
    let upload_id = init(&server, &alice, "private.bin", data.len()).await;
    server.put_part(&alice, &upload_id, 0, parts[0].clone()).await;

    let (status, body) = server.status(&bob, &upload_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.get("receivedParts").is_none());

    let (status, _) = server.put_part(&bob, &upload_id, 1, parts[1].clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.complete(&bob, &upload_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.abort(&bob, &upload_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Alice's session is untouched.
    let (status, body) = server.status(&alice, &upload_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["receivedParts"], json!([0]));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let unknown = uuid::Uuid::new_v4().to_string();

    let (status, body) = server.status(&user, &unknown).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = server.status(&user, "not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expired_session_rejects_parts() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let upload_id = init(&server, &user, "late.bin", 10).await;
    server.expire_session(&upload_id).await;

    let (status, _) = server.put_part(&user, &upload_id, 0, Bytes::from(vec![0u8; 10])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_file_options_are_applied_at_complete() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(8, 100);

    let (status, body) = server
        .init_upload(
            &user,
            json!({
                "fileName": "notes.md",
                "size": data.len(),
                "mimeType": "text/markdown",
                "slug": "my-notes",
                "description": "weekly notes",
                "isPublic": true,
                "maxViews": 3,
                "folderName": "Docs",
                "newTags": ["work", "notes"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let upload_id = body["uploadId"].as_str().unwrap().to_string();

    server.put_part(&user, &upload_id, 0, data.clone()).await;
    let (status, record) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CREATED, "{record}");
    assert_eq!(record["slug"], "my-notes");
    assert_eq!(record["url"], "https://vault.test/f/my-notes");
    assert_eq!(record["description"], "weekly notes");
    assert_eq!(record["isPublic"], true);
    assert_eq!(record["maxViews"], 3);
    assert!(record["folderId"].is_string());
    let mut tags: Vec<String> = serde_json::from_value(record["tags"].clone()).unwrap();
    tags.sort();
    assert_eq!(tags, ["notes", "work"]);

    // The vanity slug is now taken.
    let (status, body) = server
        .init_upload(&user, json!({ "fileName": "b.md", "size": 1, "slug": "my-notes" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn test_foreign_folder_is_rejected() {
    let server = TestServer::new().await;
    let alice = server.uploader().await;
    let bob = server.uploader().await;

    let folder = server
        .metadata()
        .get_or_create_folder(alice.user_id, "Alice")
        .await
        .unwrap();
    let (status, _) = server
        .init_upload(
            &bob,
            json!({ "fileName": "x.bin", "size": 1, "folderId": folder.folder_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_quota_is_enforced_at_init() {
    let server = TestServer::with_config(|config| {
        config.quota.user.max_upload_bytes = Some(CHUNK as u64);
    })
    .await;
    let user = server.uploader().await;

    let (status, body) = server
        .init_upload(&user, json!({ "fileName": "big.bin", "size": CHUNK + 1 }))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "quota_exceeded");

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM upload_sessions")
        .fetch_one(server.sqlite.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);

    // Admins have their own limits.
    let admin = server
        .create_user(vault_core::token::Role::Admin, r#"["upload"]"#)
        .await;
    let (status, _) = server
        .init_upload(&admin, json!({ "fileName": "big.bin", "size": CHUNK + 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_storage_quota_rechecked_at_complete() {
    let server = TestServer::with_config(|config| {
        config.quota.user.storage_bytes = Some(150);
    })
    .await;
    let user = server.uploader().await;

    // Two sessions both fit on their own.
    let first = init(&server, &user, "a.bin", 100).await;
    let second = init(&server, &user, "b.bin", 100).await;
    server.put_part(&user, &first, 0, seeded_bytes(1, 100)).await;
    server.put_part(&user, &second, 0, seeded_bytes(2, 100)).await;

    let (status, _) = server.complete(&user, &first).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server.complete(&user, &second).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "quota_exceeded");

    // The session survives so the user can free space and retry.
    let (status, _) = server.status(&user, &second).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_completes_share_one_storage_quota() {
    let server = TestServer::with_config(|config| {
        config.quota.user.storage_bytes = Some(150);
    })
    .await;
    let user = server.uploader().await;

    let first = init(&server, &user, "a.bin", 100).await;
    let second = init(&server, &user, "b.bin", 100).await;
    server.put_part(&user, &first, 0, seeded_bytes(1, 100)).await;
    server.put_part(&user, &second, 0, seeded_bytes(2, 100)).await;

    let ((a, _), (b, _)) = tokio::join!(
        server.complete(&user, &first),
        server.complete(&user, &second)
    );
    let mut statuses = [a, b];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::PAYLOAD_TOO_LARGE]);

    let used = server.metadata().storage_used(user.user_id).await.unwrap();
    assert_eq!(used, 100);
    assert_eq!(server.storage().list("files/").await.unwrap().len(), 1);

    // The refused session is still there to retry.
    let refused = if a == StatusCode::CREATED { &second } else { &first };
    let (status, _) = server.status(&user, refused).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_failed_complete_leaves_no_new_folders_or_tags() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(4, 100);

    let (status, body) = server
        .init_upload(
            &user,
            json!({
                "fileName": "clash.txt",
                "size": data.len(),
                "slug": "clash",
                "folderName": "Fresh",
                "newTags": ["fresh-tag"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let upload_id = body["uploadId"].as_str().unwrap().to_string();
    server.put_part(&user, &upload_id, 0, data).await;

    // Someone takes the vanity slug before the session completes.
    let (status, _) = server
        .upload_multipart(&user, "other.txt", b"other", Some(json!({ "slug": "clash" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    for table in ["folders", "tags"] {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(server.sqlite.pool())
            .await
            .unwrap();
        assert_eq!(count, 0, "{table} should be empty");
    }
    assert_eq!(server.storage().list("files/").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_multipart_matches_chunked_record() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let data = seeded_bytes(21, 2048);
    let options = json!({ "description": "same", "isPublic": true, "newTags": ["x"] });

    let (status, single) = server
        .upload_multipart(&user, "same.txt", &data, Some(options.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{single}");

    let mut init_body = options.clone();
    init_body["fileName"] = json!("same.txt");
    init_body["size"] = json!(data.len());
    init_body["mimeType"] = json!("text/plain");
    let (_, body) = server.init_upload(&user, init_body).await;
    let upload_id = body["uploadId"].as_str().unwrap().to_string();
    server.put_part(&user, &upload_id, 0, data.clone()).await;
    let (status, chunked) = server.complete(&user, &upload_id).await;
    assert_eq!(status, StatusCode::CREATED);

    let keys = |v: &Value| {
        let mut keys: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    };
    assert_eq!(keys(&single), keys(&chunked));
    for field in ["name", "originalName", "mimeType", "size", "description", "isPublic", "tags"] {
        assert_eq!(single[field], chunked[field], "{field} differs");
    }
    assert_ne!(single["slug"], chunked["slug"]);
    assert_eq!(stored_object(&server, &single).await, data);
}

#[tokio::test]
async fn test_multipart_rejects_files_over_threshold() {
    let server = TestServer::with_config(|config| config.upload.chunk_threshold_mb = 1).await;
    let user = server.uploader().await;
    let data = seeded_bytes(1, 1024 * 1024 + 1);

    let (status, body) = server.upload_multipart(&user, "huge.bin", &data, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert!(server.storage().list("files/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_multipart_requires_file_field() {
    let server = TestServer::new().await;
    let user = server.uploader().await;

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"metadata\"\r\n\r\n{{}}\r\n--{b}--\r\n",
        b = common::MULTIPART_BOUNDARY
    );
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Authorization", format!("Bearer {}", user.token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", common::MULTIPART_BOUNDARY),
        )
        .body(axum::body::Body::from(body))
        .unwrap();
    let (status, _) = server.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_multipart_rejects_oversized_metadata_field() {
    let server = TestServer::new().await;
    let user = server.uploader().await;
    let metadata = json!({ "description": "x".repeat(128 * 1024) });

    let (status, body) = server
        .upload_multipart(&user, "small.txt", b"hello", Some(metadata))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert!(server.storage().list("files/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_config_endpoint() {
    let server = TestServer::new().await;
    let user = server.uploader().await;

    let (status, body) = server
        .json_request("GET", "/upload/config", None, Some(&user.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunkSize"], CHUNK);
    assert_eq!(body["chunkThresholdBytes"], 95 * 1024 * 1024);
    assert_eq!(body["maxConcurrency"], 3);
    assert_eq!(body["ttlSeconds"], 21600);
    assert_eq!(body["retry"]["baseMs"], 500);
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let server = TestServer::new().await;
    let user = server.uploader().await;

    let (status, _) = server
        .json_request("POST", "/upload?action=explode", Some(json!({})), Some(&user.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .json_request("GET", "/upload?action=init", None, Some(&user.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
