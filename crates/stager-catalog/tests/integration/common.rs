//! Shared test helpers for catalog API integration tests
//!
//! Provides wiremock-based mock server setup for the catalog endpoints.
//! Each helper mounts the necessary mock endpoints; `setup_catalog_mock`
//! returns a configured CatalogClient pointing at the mock server.

use std::time::Duration;

use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stager_catalog::client::{CatalogClient, ClientOptions};
use stager_core::credential::Credential;

pub const TEST_USER: &str = "rods";
pub const TEST_PASSWORD: &str = "rods-pass";
pub const TEST_TOKEN: &str = "test-token-001";

pub fn test_options() -> ClientOptions {
    ClientOptions {
        page_size: 2,
        chunk_size: 4,
        request_timeout: Duration::from_secs(5),
    }
}

/// Sets up a mock server accepting the test credential and returns
/// a (MockServer, CatalogClient) tuple.
///
/// Pre-configured endpoints:
/// - POST /authenticate → TEST_TOKEN
pub async fn setup_catalog_mock() -> (MockServer, CatalogClient) {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .and(basic_auth(TEST_USER, TEST_PASSWORD))
        .respond_with(ResponseTemplate::new(200).set_body_string(TEST_TOKEN))
        .mount(&server)
        .await;

    let client = CatalogClient::with_http_client(
        reqwest::Client::new(),
        server.uri(),
        Credential::new(TEST_USER, TEST_PASSWORD),
        test_options(),
    );

    (server, client)
}

/// A status envelope with the given code and extra top-level fields
pub fn envelope(code: i64, extra: serde_json::Value) -> serde_json::Value {
    let mut body = serde_json::json!({
        "irods_response": { "status_code": code }
    });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    body
}

/// Mounts `GET /data-objects?op=stat` for one data object
pub async fn mount_object_stat(
    server: &MockServer,
    lpath: &str,
    size: u64,
    checksum: Option<&str>,
) {
    Mock::given(method("GET"))
        .and(path("/data-objects"))
        .and(query_param("op", "stat"))
        .and(query_param("lpath", lpath))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
            0,
            serde_json::json!({ "size": size, "checksum": checksum.unwrap_or("") }),
        )))
        .mount(server)
        .await;
}

/// Mounts `GET /collections?op=stat` for one collection
pub async fn mount_collection_stat(server: &MockServer, lpath: &str) {
    Mock::given(method("GET"))
        .and(path("/collections"))
        .and(query_param("op", "stat"))
        .and(query_param("lpath", lpath))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(0, serde_json::json!({}))),
        )
        .mount(server)
        .await;
}

/// Mounts a stat endpoint answering "does not exist" for anything else
pub async fn mount_stat_not_found(server: &MockServer, endpoint: &str, code: i64) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param("op", "stat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(code, serde_json::json!({}))),
        )
        .mount(server)
        .await;
}

/// Mounts one page of a genquery result
pub async fn mount_query_page(server: &MockServer, query: &str, offset: u32, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("op", "execute_genquery"))
        .and(query_param("query", query))
        .and(query_param("offset", offset.to_string()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(0, serde_json::json!({ "rows": rows }))),
        )
        .mount(server)
        .await;
}

/// Mounts a data object read endpoint
pub async fn mount_download(server: &MockServer, lpath: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path("/data-objects"))
        .and(query_param("op", "read"))
        .and(query_param("lpath", lpath))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}

/// Mounts an accepting `POST /data-objects` (writes and checksums)
pub async fn mount_data_object_post(server: &MockServer, extra: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/data-objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(0, extra)))
        .mount(server)
        .await;
}
