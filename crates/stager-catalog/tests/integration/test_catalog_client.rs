//! Integration tests for catalog metadata operations
//!
//! Verifies authentication, stat, paged listing, collection creation and
//! checksum calculation against a wiremock-based catalog API.

use stager_catalog::client::{
    CatalogClient, CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME, CAT_NO_ACCESS_PERMISSION,
    CAT_UNKNOWN_COLLECTION, USER_FILE_DOES_NOT_EXIST,
};
use stager_catalog::HttpCatalog;
use stager_core::credential::Credential;
use stager_core::domain::NodeKind;
use stager_core::ports::{CatalogError, ICatalog};
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, envelope, TEST_TOKEN};

const SHA_A: &str = "sha2:LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=";

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_authenticate_returns_token() {
    let (_server, client) = common::setup_catalog_mock().await;
    let token = client.authenticate().await.expect("authenticate failed");
    assert_eq!(token, TEST_TOKEN);
}

#[tokio::test]
async fn test_authenticate_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = CatalogClient::with_http_client(
        reqwest::Client::new(),
        server.uri(),
        Credential::new("rods", "wrong"),
        common::test_options(),
    );
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, CatalogError::Unauthorized(_)));
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("GET"))
        .and(path("/collections"))
        .and(bearer_token(TEST_TOKEN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(0, serde_json::json!({}))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let entry = client.stat_collection("/tempZone/home/rods").await.unwrap();
    assert_eq!(entry.unwrap().kind, NodeKind::Directory);
}

#[tokio::test]
async fn test_expired_token_is_renewed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TEST_TOKEN))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_collection_stat(&server, "/tempZone").await;

    let client = CatalogClient::with_http_client(
        reqwest::Client::new(),
        server.uri(),
        Credential::new(common::TEST_USER, common::TEST_PASSWORD),
        common::test_options(),
    );
    let entry = client.stat_collection("/tempZone").await.unwrap();
    assert!(entry.is_some());
}

// ============================================================================
// Stat
// ============================================================================

#[tokio::test]
async fn test_stat_data_object_with_checksum() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_object_stat(&server, "/z/home/a.txt", 5, Some(SHA_A)).await;

    let entry = client
        .stat_data_object("/z/home/a.txt")
        .await
        .unwrap()
        .expect("object should exist");
    assert_eq!(entry.kind, NodeKind::RegularFile);
    assert_eq!(entry.size, 5);
    assert_eq!(entry.checksum.unwrap().as_str(), SHA_A);
}

#[tokio::test]
async fn test_stat_data_object_without_checksum() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_object_stat(&server, "/z/home/b.txt", 9, None).await;

    let entry = client.stat_data_object("/z/home/b.txt").await.unwrap().unwrap();
    assert!(entry.checksum.is_none());
}

#[tokio::test]
async fn test_stat_missing_path_is_none() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_stat_not_found(&server, "/data-objects", USER_FILE_DOES_NOT_EXIST).await;
    common::mount_stat_not_found(&server, "/collections", CAT_UNKNOWN_COLLECTION).await;

    let catalog = HttpCatalog::new(client);
    assert!(catalog.stat("/z/home/missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stat_permission_denied() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_stat_not_found(&server, "/data-objects", CAT_NO_ACCESS_PERMISSION).await;

    let err = client.stat_data_object("/z/secret").await.unwrap_err();
    assert!(matches!(err, CatalogError::PermissionDenied(p) if p == "/z/secret"));
}

#[tokio::test]
async fn test_stat_falls_back_to_collection() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_stat_not_found(&server, "/data-objects", USER_FILE_DOES_NOT_EXIST).await;
    common::mount_collection_stat(&server, "/z/home").await;

    let catalog = HttpCatalog::new(client);
    let entry = catalog.stat("/z/home").await.unwrap().unwrap();
    assert!(entry.is_collection());
}

// ============================================================================
// Listing
// ============================================================================

const OBJECTS_QUERY: &str =
    "SELECT DATA_NAME, DATA_SIZE, DATA_CHECKSUM WHERE COLL_NAME = '/z/home'";
const COLLECTIONS_QUERY: &str = "SELECT COLL_NAME WHERE COLL_PARENT_NAME = '/z/home'";

async fn mount_home_listing(server: &MockServer) {
    // page_size is 2: a full first page forces a second request
    common::mount_query_page(
        server,
        OBJECTS_QUERY,
        0,
        serde_json::json!([["a.txt", "5", SHA_A], ["b.txt", "9", ""]]),
    )
    .await;
    // a second replica of a.txt
    common::mount_query_page(server, OBJECTS_QUERY, 2, serde_json::json!([["a.txt", "5", SHA_A]]))
        .await;
    common::mount_query_page(server, COLLECTIONS_QUERY, 0, serde_json::json!([["/z/home/sub"]]))
        .await;
}

#[tokio::test]
async fn test_list_collection_pages_and_dedupes_replicas() {
    let (server, client) = common::setup_catalog_mock().await;
    mount_home_listing(&server).await;

    let entries = client.list_collection("/z/home").await.unwrap();
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/z/home/a.txt", "/z/home/b.txt", "/z/home/sub"]);
    assert!(entries[0].checksum.is_some());
    assert!(entries[1].checksum.is_none());
    assert!(entries[2].is_collection());
}

#[tokio::test]
async fn test_list_collection_with_quote_in_name() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_query_page(
        &server,
        r"SELECT DATA_NAME, DATA_SIZE, DATA_CHECKSUM WHERE COLL_NAME = '/z/home/O\'Brien'",
        0,
        serde_json::json!([["notes.txt", "3", ""]]),
    )
    .await;
    common::mount_query_page(
        &server,
        r"SELECT COLL_NAME WHERE COLL_PARENT_NAME = '/z/home/O\'Brien'",
        0,
        serde_json::json!([["/z/home/O'Brien/raw"]]),
    )
    .await;

    let entries = client.list_collection("/z/home/O'Brien").await.unwrap();
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/z/home/O'Brien/notes.txt", "/z/home/O'Brien/raw"]);
}

#[tokio::test]
async fn test_list_collection_skips_row_with_invalid_size() {
    let (server, client) = common::setup_catalog_mock().await;
    common::mount_query_page(
        &server,
        OBJECTS_QUERY,
        0,
        serde_json::json!([["good.txt", "4", ""], ["bad.txt", "lots", ""]]),
    )
    .await;
    common::mount_query_page(&server, OBJECTS_QUERY, 2, serde_json::json!([])).await;
    common::mount_query_page(&server, COLLECTIONS_QUERY, 0, serde_json::json!([])).await;

    let entries = client.list_collection("/z/home").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "/z/home/good.txt");
    assert_eq!(entries[0].size, 4);
}

#[tokio::test]
async fn test_query_all_stops_when_offset_is_ignored() {
    let (server, client) = common::setup_catalog_mock().await;
    // Same full page regardless of offset
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("op", "execute_genquery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
            0,
            serde_json::json!({ "rows": [["/z/a"], ["/z/b"]] }),
        )))
        .mount(&server)
        .await;

    let err = client
        .query_all("SELECT COLL_NAME WHERE COLL_PARENT_NAME = '/z'")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Api { .. }));
    let pages = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/query")
        .count();
    assert_eq!(pages, 2);
}

#[tokio::test]
async fn test_stat_served_from_listing_cache() {
    let (server, client) = common::setup_catalog_mock().await;
    mount_home_listing(&server).await;

    let catalog = HttpCatalog::new(client);
    catalog.list("/z/home").await.unwrap();

    // No stat endpoints are mounted: both answers come from the cache
    let hit = catalog.stat("/z/home/b.txt").await.unwrap().unwrap();
    assert_eq!(hit.size, 9);
    assert!(catalog.stat("/z/home/nothing").await.unwrap().is_none());
}

// ============================================================================
// Mutations
// ============================================================================

#[tokio::test]
async fn test_create_collection_sends_intermediates() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("POST"))
        .and(path("/collections"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(0, serde_json::json!({}))),
        )
        .expect(1)
        .mount(&server)
        .await;

    client.create_collection("/z/home/new/deep").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.url.path() == "/collections")
        .unwrap();
    let body = String::from_utf8_lossy(&create.body);
    assert!(body.contains("op=create"));
    assert!(body.contains("create-intermediates=1"));
}

#[tokio::test]
async fn test_create_existing_collection_is_ok() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("POST"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
            CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME,
            serde_json::json!({}),
        )))
        .mount(&server)
        .await;

    assert!(client.create_collection("/z/home").await.is_ok());
}

#[tokio::test]
async fn test_create_collection_error_propagates() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("POST"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "irods_response": { "status_code": -818000, "status_message": "no access" }
        })))
        .mount(&server)
        .await;

    let err = client.create_collection("/other/zone").await.unwrap_err();
    assert!(matches!(err, CatalogError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_calculate_checksum() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("POST"))
        .and(path("/data-objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
            0,
            serde_json::json!({ "checksum": SHA_A }),
        )))
        .mount(&server)
        .await;

    let sum = client.calculate_checksum("/z/home/a.txt").await.unwrap();
    assert_eq!(sum.as_str(), SHA_A);
    assert_eq!(sum.algorithm(), "sha2");
}

#[tokio::test]
async fn test_query_param_missing_page_is_empty() {
    let (server, client) = common::setup_catalog_mock().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("op", "execute_genquery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(-808000, serde_json::json!({}))))
        .mount(&server)
        .await;

    let rows = client.query_all("SELECT COLL_NAME WHERE COLL_NAME = '/none'").await.unwrap();
    assert!(rows.is_empty());
}
