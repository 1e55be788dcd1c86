//! Integration tests for data object transfers (download/upload)
//!
//! Verifies end-to-end behavior of streamed downloads and chunked uploads
//! against a wiremock-based catalog API.

use stager_catalog::{transfer, HttpCatalog};
use stager_core::ports::{CatalogEntry, CatalogError, ICatalog};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

// ============================================================================
// Download tests
// ============================================================================

#[tokio::test]
async fn test_download_writes_file() {
    let (server, client) = common::setup_catalog_mock().await;
    let content = b"Hello, catalog! This is test content.";
    common::mount_download(&server, "/z/home/a.txt", content).await;

    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("a.txt");
    let written = transfer::download_to_file(&client, "/z/home/a.txt", &target)
        .await
        .expect("download failed");

    assert_eq!(written, content.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), content);
    assert!(!dir.path().join("a.txt.stager-part").exists());
}

#[tokio::test]
async fn test_download_large_file() {
    let (server, client) = common::setup_catalog_mock().await;
    let content: Vec<u8> = (0..1_048_576).map(|i| (i % 256) as u8).collect();
    common::mount_download(&server, "/z/home/large.bin", &content).await;

    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("large.bin");
    transfer::download_to_file(&client, "/z/home/large.bin", &target)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), content);
}

#[tokio::test]
async fn test_download_empty_object() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_download(&server, "/z/home/empty", &[]).await;

    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("empty");
    assert_eq!(
        transfer::download_to_file(&client, "/z/home/empty", &target).await.unwrap(),
        0
    );
    assert!(target.exists());
}

#[tokio::test]
async fn test_download_missing_object() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("GET"))
        .and(path("/data-objects"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("gone");
    let err = transfer::download_to_file(&client, "/z/home/gone", &target)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
    assert!(!target.exists());
}

#[tokio::test]
async fn test_download_replaces_existing_file() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_download(&server, "/z/home/a.txt", b"new").await;

    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("a.txt");
    std::fs::write(&target, b"old content that is longer").unwrap();

    transfer::download_to_file(&client, "/z/home/a.txt", &target).await.unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"new");
}

#[tokio::test]
async fn test_failed_rename_removes_partial_file() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_download(&server, "/z/home/a.txt", b"content").await;

    // A non-empty directory under the target name makes the final rename fail
    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("a.txt");
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("inner"), b"x").unwrap();

    let err = transfer::download_to_file(&client, "/z/home/a.txt", &target)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Io(_)), "{err:?}");
    assert!(!dir.path().join("a.txt.stager-part").exists());
    assert!(target.join("inner").exists());
}

// ============================================================================
// Upload tests
// ============================================================================

async fn write_requests(server: &wiremock::MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/data-objects")
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

#[tokio::test]
async fn test_upload_is_chunked() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_data_object_post(&server, serde_json::json!({})).await;

    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("digits");
    std::fs::write(&source, b"0123456789").unwrap();

    // chunk_size is 4 in the test options
    let sent = transfer::upload_from_file(&client, &source, "/z/home/digits")
        .await
        .unwrap();
    assert_eq!(sent, 10);

    let bodies = write_requests(&server).await;
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0].contains("0123"));
    assert!(bodies[1].contains("4567"));
    assert!(bodies[2].contains("89"));
    assert!(bodies.iter().all(|b| b.contains("/z/home/digits")));
}

#[tokio::test]
async fn test_upload_exact_chunk_multiple() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_data_object_post(&server, serde_json::json!({})).await;

    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("eight");
    std::fs::write(&source, b"abcdefgh").unwrap();

    transfer::upload_from_file(&client, &source, "/z/home/eight")
        .await
        .unwrap();
    assert_eq!(write_requests(&server).await.len(), 2);
}

#[tokio::test]
async fn test_upload_empty_file_sends_one_write() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_data_object_post(&server, serde_json::json!({})).await;

    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("empty");
    std::fs::write(&source, b"").unwrap();

    assert_eq!(
        transfer::upload_from_file(&client, &source, "/z/home/empty").await.unwrap(),
        0
    );
    assert_eq!(write_requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_upload_rejected_by_catalog() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("POST"))
        .and(path("/data-objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(
            -818000,
            serde_json::json!({}),
        )))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("f");
    std::fs::write(&source, b"data").unwrap();

    let err = transfer::upload_from_file(&client, &source, "/other/f")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_upload_invalidates_listing_cache() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_data_object_post(&server, serde_json::json!({})).await;

    let catalog = HttpCatalog::new(client);
    catalog
        .cache()
        .insert("/z/home", vec![CatalogEntry::collection("/z/home/sub")]);

    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("f");
    std::fs::write(&source, b"data").unwrap();
    catalog.upload(&source, "/z/home/f").await.unwrap();

    assert!(catalog.cache().get("/z/home").is_none());
}
