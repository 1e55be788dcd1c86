//! HttpCatalog - ICatalog implementation over the catalog HTTP API
//!
//! Wraps the [`CatalogClient`] and a [`ListingCache`] to fulfil the
//! [`ICatalog`] port contract.
//!
//! ## Design Notes
//!
//! - `stat` answers from the cached listing of the parent collection when
//!   there is one; the scanner's listings and the materializer's cache
//!   priming make this the common case during a transfer.
//! - Any write into a collection drops that collection's cached listing, so
//!   a later `stat` sees the new object.

use std::path::Path;

use tracing::{debug, instrument};

use stager_core::domain::Checksum;
use stager_core::ports::{CatalogEntry, CatalogError, ICatalog};

use crate::client::CatalogClient;
use crate::listing::ListingCache;
use crate::transfer;

/// Catalog adapter backed by the HTTP API
pub struct HttpCatalog {
    client: CatalogClient,
    cache: ListingCache,
}

impl HttpCatalog {
    #[must_use]
    pub fn new(client: CatalogClient) -> Self {
        Self {
            client,
            cache: ListingCache::new(),
        }
    }

    pub fn client(&self) -> &CatalogClient {
        &self.client
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }
}

#[async_trait::async_trait]
impl ICatalog for HttpCatalog {
    #[instrument(skip(self))]
    async fn stat(&self, path: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        if let Some(cached) = self.cache.lookup(path) {
            debug!(hit = cached.is_some(), "stat answered from listing cache");
            return Ok(cached);
        }
        if let Some(entry) = self.client.stat_data_object(path).await? {
            return Ok(Some(entry));
        }
        self.client.stat_collection(path).await
    }

    #[instrument(skip(self))]
    async fn list(&self, collection: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let entries = self.client.list_collection(collection).await?;
        self.cache.insert(collection, entries.clone());
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn make_collection(&self, path: &str) -> Result<(), CatalogError> {
        self.client.create_collection(path).await?;
        self.cache.invalidate_parent_of(path);
        Ok(())
    }

    async fn download(&self, path: &str, local: &Path) -> Result<u64, CatalogError> {
        transfer::download_to_file(&self.client, path, local).await
    }

    async fn upload(&self, local: &Path, path: &str) -> Result<u64, CatalogError> {
        let result = transfer::upload_from_file(&self.client, local, path).await;
        self.cache.invalidate_parent_of(path);
        result
    }

    async fn compute_checksum(&self, path: &str) -> Result<Checksum, CatalogError> {
        self.client.calculate_checksum(path).await
    }

    async fn refresh_listing(&self, collection: &str) -> Result<(), CatalogError> {
        self.list(collection).await.map(|_| ())
    }
}
