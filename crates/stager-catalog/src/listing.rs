//! Collection listing cache
//!
//! Keeps the children of recently listed collections so that the many stat
//! calls a transfer makes against one collection resolve without a round
//! trip. The cache belongs to one [`crate::provider::HttpCatalog`], which is
//! created per job; there is no process-wide instance.

use std::sync::Arc;

use dashmap::DashMap;

use stager_core::domain::locator::parent_path;
use stager_core::ports::CatalogEntry;

/// Concurrent map from collection path to its listed children
#[derive(Debug, Default)]
pub struct ListingCache {
    listings: DashMap<String, Arc<Vec<CatalogEntry>>>,
}

impl ListingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached children of `collection`
    pub fn insert(&self, collection: &str, entries: Vec<CatalogEntry>) {
        self.listings
            .insert(collection.to_string(), Arc::new(entries));
    }

    /// Cached children of `collection`, if it was listed
    #[must_use]
    pub fn get(&self, collection: &str) -> Option<Arc<Vec<CatalogEntry>>> {
        self.listings.get(collection).map(|e| Arc::clone(e.value()))
    }

    /// Look `path` up in its parent's listing
    ///
    /// `None` means the parent is not cached; `Some(None)` means the parent
    /// is cached and has no child at `path`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Option<CatalogEntry>> {
        let listing = self.get(parent_path(path))?;
        Some(listing.iter().find(|e| e.path == path).cloned())
    }

    /// Forget the listing of `collection`
    pub fn invalidate(&self, collection: &str) {
        self.listings.remove(collection);
    }

    /// Forget the listing that contains `path`
    pub fn invalidate_parent_of(&self, path: &str) {
        self.invalidate(parent_path(path));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}
