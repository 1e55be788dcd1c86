//! Stager Catalog - Remote catalog adapters
//!
//! Provides the implementations of the `ICatalog` port:
//! - Token-authenticated HTTP client for the catalog REST API
//! - Streamed downloads and chunked uploads of data objects
//! - A per-instance collection listing cache
//! - An in-memory catalog for tests and dry runs
//!
//! ## Modules
//!
//! - [`client`] - HTTP client, authentication and status envelope handling
//! - [`transfer`] - Data object download/upload
//! - [`listing`] - Collection listing cache
//! - [`provider`] - `ICatalog` implementation over the HTTP client
//! - [`memory`] - In-memory `ICatalog` implementation

pub mod client;
pub mod listing;
pub mod memory;
pub mod provider;
pub mod transfer;

pub use client::{CatalogClient, ClientOptions};
pub use listing::ListingCache;
pub use memory::{CatalogStats, MemoryCatalog};
pub use provider::HttpCatalog;
