//! Catalog HTTP API client
//!
//! Provides a typed HTTP client for the managed-repository catalog's REST
//! API. Handles token authentication, the JSON status envelope returned by
//! every endpoint, and endpoint construction.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stager_catalog::client::{CatalogClient, ClientOptions};
//! use stager_core::credential::Credential;
//!
//! # async fn example() -> Result<(), stager_core::ports::CatalogError> {
//! let client = CatalogClient::new(
//!     "https://irods.example.org/irods-http-api/0.2.0",
//!     Credential::new("alice", "secret"),
//!     ClientOptions::default(),
//! )?;
//! let entry = client.stat_data_object("/zone/home/alice/a.txt").await?;
//! println!("{entry:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! - The bearer token is obtained lazily on the first request and renewed
//!   once when the server answers 401, so constructing a client never
//!   touches the network.
//! - Every response body carries `irods_response.status_code`; a non-zero
//!   code is mapped onto [`CatalogError`] by [`classify_status`].

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use stager_core::config::CatalogConfig;
use stager_core::credential::Credential;
use stager_core::domain::Checksum;
use stager_core::ports::{CatalogEntry, CatalogError};

// ============================================================================
// Catalog status codes
// ============================================================================

/// No rows matched a catalog query
pub const CAT_NO_ROWS_FOUND: i64 = -808_000;
/// An item with the same name already exists
pub const CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME: i64 = -809_000;
pub const CAT_UNKNOWN_COLLECTION: i64 = -814_000;
pub const CAT_UNKNOWN_FILE: i64 = -817_000;
pub const CAT_NO_ACCESS_PERMISSION: i64 = -818_000;
pub const USER_FILE_DOES_NOT_EXIST: i64 = -310_000;

/// Map a non-zero catalog status code onto a [`CatalogError`]
pub fn classify_status(code: i64, message: Option<String>, path: &str) -> CatalogError {
    match code {
        CAT_NO_ROWS_FOUND | CAT_UNKNOWN_COLLECTION | CAT_UNKNOWN_FILE
        | USER_FILE_DOES_NOT_EXIST => CatalogError::NotFound(path.to_string()),
        CAT_NO_ACCESS_PERMISSION => CatalogError::PermissionDenied(path.to_string()),
        _ => CatalogError::Api {
            code,
            message: message.unwrap_or_else(|| format!("request on {path} failed")),
        },
    }
}

// ============================================================================
// Response types
// ============================================================================

/// Status block present in every response body
#[derive(Debug, Deserialize)]
struct StatusBlock {
    status_code: i64,
    #[serde(default)]
    status_message: Option<String>,
}

/// Response envelope: the status block plus endpoint-specific fields
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    irods_response: StatusBlock,
    #[serde(flatten)]
    body: T,
}

/// Body of endpoints that return nothing beyond the status block
#[derive(Debug, Deserialize)]
struct Empty {}

/// Body of `GET /data-objects?op=stat`
#[derive(Debug, Deserialize)]
struct DataObjectStat {
    size: u64,
    #[serde(default)]
    checksum: Option<String>,
}

/// Body of `GET /query?op=execute_genquery`
#[derive(Debug, Deserialize)]
struct QueryRows {
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

/// Body of `POST /data-objects op=calculate_checksum`
#[derive(Debug, Deserialize)]
struct ChecksumBody {
    checksum: String,
}

// ============================================================================
// ClientOptions
// ============================================================================

/// Tunables of a [`CatalogClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Rows per listing page
    pub page_size: u32,
    /// Bytes per upload request
    pub chunk_size: usize,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            page_size: 1024,
            chunk_size: 8 * 1024 * 1024,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&CatalogConfig> for ClientOptions {
    fn from(cfg: &CatalogConfig) -> Self {
        Self {
            page_size: cfg.page_size.max(1),
            chunk_size: usize::try_from(cfg.chunk_size_mb.max(1) * 1024 * 1024)
                .unwrap_or(usize::MAX),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs.max(1)),
        }
    }
}

// ============================================================================
// CatalogClient
// ============================================================================

/// HTTP client for the catalog API
///
/// Wraps `reqwest::Client` with token authentication and base URL
/// construction. Cheap operations (stat, query, create) live here; byte
/// transfers are in [`crate::transfer`].
pub struct CatalogClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without trailing slash
    base_url: String,
    /// Account the client authenticates as
    credential: Credential,
    /// Bearer token, fetched on demand
    token: RwLock<Option<String>>,
    options: ClientOptions,
}

impl CatalogClient {
    /// Creates a new client for `base_url`
    ///
    /// # Errors
    /// Returns [`CatalogError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credential: Credential,
        options: ClientOptions,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CatalogError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(client, base_url, credential, options))
    }

    /// Creates a client from the `catalog` configuration section
    pub fn from_config(cfg: &CatalogConfig, credential: Credential) -> Result<Self, CatalogError> {
        Self::new(cfg.base_url.clone(), credential, ClientOptions::from(cfg))
    }

    /// Creates a client around an existing `reqwest::Client` (useful for testing)
    pub fn with_http_client(
        client: Client,
        base_url: impl Into<String>,
        credential: Credential,
        options: ClientOptions,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            credential,
            token: RwLock::new(None),
            options,
        }
    }

    /// Account this client acts as
    pub fn user(&self) -> &str {
        self.credential.user()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // ------------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------------

    /// Exchanges the credential for a bearer token
    ///
    /// `POST /authenticate` with HTTP basic auth; the token is the plain-text body.
    pub async fn authenticate(&self) -> Result<String, CatalogError> {
        debug!(user = %self.credential.user(), "Authenticating with catalog");

        let response = self
            .client
            .post(format!("{}/authenticate", self.base_url))
            .basic_auth(self.credential.user(), Some(self.credential.password()))
            .send()
            .await
            .map_err(|e| CatalogError::Transport(format!("Failed to send authenticate: {e}")))?;

        if !response.status().is_success() {
            return Err(CatalogError::Unauthorized(format!(
                "{} rejected by catalog ({})",
                self.credential.user(),
                response.status()
            )));
        }

        let token = response
            .text()
            .await
            .map_err(|e| CatalogError::Transport(format!("Failed to read token: {e}")))?
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(CatalogError::Unauthorized("empty token".into()));
        }

        info!(user = %self.credential.user(), "Authenticated with catalog");
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn current_token(&self) -> Result<String, CatalogError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.authenticate().await
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path relative to base URL (e.g., "/collections")
    /// * `token` - Bearer token
    pub fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url).bearer_auth(token)
    }

    /// Sends a request, re-authenticating once on 401
    ///
    /// `build` is called again for the retry, so it must be able to rebuild
    /// the request body.
    pub async fn send<F>(&self, build: F) -> Result<Response, CatalogError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.current_token().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("Catalog token rejected, re-authenticating");
        *self.token.write().await = None;
        let token = self.authenticate().await?;
        build(&token)
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))
    }

    /// Sends a request and decodes the status envelope
    async fn call<T, F>(&self, path: &str, build: F) -> Result<T, CatalogError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        let response = check_http_status(self.send(build).await?, path).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| CatalogError::Transport(format!("Invalid response for {path}: {e}")))?;

        match envelope.irods_response.status_code {
            0 => Ok(envelope.body),
            code => Err(classify_status(
                code,
                envelope.irods_response.status_message,
                path,
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    /// Stats a collection; `Ok(None)` when there is none at `path`
    pub async fn stat_collection(&self, path: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let result: Result<Empty, _> = self
            .call(path, |token| {
                self.request(Method::GET, "/collections", token)
                    .query(&[("op", "stat"), ("lpath", path)])
            })
            .await;
        match result {
            Ok(_) => Ok(Some(CatalogEntry::collection(path))),
            Err(CatalogError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stats a data object; `Ok(None)` when there is none at `path`
    pub async fn stat_data_object(
        &self,
        path: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let result: Result<DataObjectStat, _> = self
            .call(path, |token| {
                self.request(Method::GET, "/data-objects", token)
                    .query(&[("op", "stat"), ("lpath", path)])
            })
            .await;
        match result {
            Ok(stat) => Ok(Some(CatalogEntry::data_object(
                path,
                stat.size,
                parse_checksum(stat.checksum),
            ))),
            Err(CatalogError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Runs a catalog query, fetching every page
    pub async fn query_all(&self, query: &str) -> Result<Vec<Vec<String>>, CatalogError> {
        let page_size = self.options.page_size.max(1) as usize;
        let count = page_size.to_string();
        let mut rows = Vec::new();
        let mut offset = 0usize;
        let mut previous: Option<Vec<Vec<String>>> = None;

        loop {
            let offset_param = offset.to_string();
            let page: Result<QueryRows, _> = self
                .call(query, |token| {
                    self.request(Method::GET, "/query", token).query(&[
                        ("op", "execute_genquery"),
                        ("query", query),
                        ("offset", offset_param.as_str()),
                        ("count", count.as_str()),
                    ])
                })
                .await;
            let page = match page {
                Ok(page) => page.rows,
                Err(CatalogError::NotFound(_)) => Vec::new(),
                Err(e) => return Err(e),
            };

            let received = page.len();
            if received < page_size {
                rows.extend(page);
                break;
            }
            if previous.as_ref() == Some(&page) {
                warn!(offset, "Catalog repeated a full query page, offset ignored");
                return Err(CatalogError::Api {
                    code: 0,
                    message: format!("query paging stalled at offset {offset}"),
                });
            }
            rows.extend(page.iter().cloned());
            previous = Some(page);
            offset += received;
        }

        Ok(rows)
    }

    /// Lists the direct children of a collection
    ///
    /// Data objects come first, then sub-collections. Replicas of the same
    /// data object are reported once.
    pub async fn list_collection(&self, collection: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let objects = self
            .query_all(&format!(
                "SELECT DATA_NAME, DATA_SIZE, DATA_CHECKSUM WHERE COLL_NAME = '{}'",
                quote_literal(collection)
            ))
            .await?;
        let collections = self
            .query_all(&format!(
                "SELECT COLL_NAME WHERE COLL_PARENT_NAME = '{}'",
                quote_literal(collection)
            ))
            .await?;

        let mut entries: Vec<CatalogEntry> = Vec::with_capacity(objects.len() + collections.len());
        for row in objects {
            let [name, size, checksum, ..] = row.as_slice() else {
                warn!(collection = %collection, ?row, "Skipping malformed listing row");
                continue;
            };
            let path = stager_core::domain::locator::join_path(collection, name);
            if entries.iter().any(|e| e.path == path) {
                continue;
            }
            let Ok(size) = size.parse::<u64>() else {
                warn!(
                    collection = %collection,
                    name = %name,
                    size = %size,
                    "Skipping listing row with invalid size"
                );
                continue;
            };
            entries.push(CatalogEntry::data_object(
                path,
                size,
                parse_checksum(Some(checksum.clone())),
            ));
        }
        for row in collections {
            if let Some(path) = row.first() {
                if path != collection {
                    entries.push(CatalogEntry::collection(path.clone()));
                }
            }
        }

        debug!(collection = %collection, entries = entries.len(), "Listed collection");
        Ok(entries)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Creates a collection with all missing parents; an existing one is fine
    pub async fn create_collection(&self, path: &str) -> Result<(), CatalogError> {
        let result: Result<Empty, _> = self
            .call(path, |token| {
                self.request(Method::POST, "/collections", token).form(&[
                    ("op", "create"),
                    ("lpath", path),
                    ("create-intermediates", "1"),
                ])
            })
            .await;
        match result {
            Ok(_) => {
                debug!(collection = %path, "Created collection");
                Ok(())
            }
            Err(CatalogError::Api { code, .. }) if code == CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Has the catalog (re)compute and register the digest of a data object
    pub async fn calculate_checksum(&self, path: &str) -> Result<Checksum, CatalogError> {
        let body: ChecksumBody = self
            .call(path, |token| {
                self.request(Method::POST, "/data-objects", token).form(&[
                    ("op", "calculate_checksum"),
                    ("lpath", path),
                    ("force", "1"),
                ])
            })
            .await?;
        Checksum::new(body.checksum).map_err(|e| CatalogError::Api {
            code: 0,
            message: e.to_string(),
        })
    }
}

/// Maps HTTP-level failures before the body is decoded
pub(crate) async fn check_http_status(
    response: Response,
    path: &str,
) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => CatalogError::NotFound(path.to_string()),
        StatusCode::UNAUTHORIZED => CatalogError::Unauthorized(body),
        StatusCode::FORBIDDEN => CatalogError::PermissionDenied(path.to_string()),
        other => {
            // Error bodies still carry the status envelope when the catalog produced them
            match serde_json::from_str::<Envelope<Empty>>(&body) {
                Ok(env) if env.irods_response.status_code != 0 => classify_status(
                    env.irods_response.status_code,
                    env.irods_response.status_message,
                    path,
                ),
                _ => CatalogError::Api {
                    code: i64::from(other.as_u16()),
                    message: format!("HTTP {other} on {path}"),
                },
            }
        }
    })
}

/// Escapes a value for use inside a single-quoted query literal
///
/// The query parser ends a literal at the first bare `'` and rejects a bare
/// backtick. Both get a backslash prefix, as does the backslash itself.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted
}

/// Catalogs report an empty string for objects that were never checksummed
fn parse_checksum(raw: Option<String>) -> Option<Checksum> {
    raw.filter(|s| !s.trim().is_empty())
        .and_then(|s| Checksum::new(s).ok())
}
