//! In-memory catalog
//!
//! A complete [`ICatalog`] implementation that keeps collections and data
//! objects in process memory. It backs engine and orchestrator tests and
//! dry runs, and counts every byte it moves so callers can assert that a
//! re-run transferred nothing.
//!
//! Behaviour mirrors the real catalog where it matters to the engine:
//! uploads require an existing parent collection, writes clear the
//! registered checksum, and checksums are only known once computed.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use stager_core::domain::locator::parent_path;
use stager_core::domain::Checksum;
use stager_core::ports::{CatalogEntry, CatalogError, ICatalog};

/// Transfer counters of a [`MemoryCatalog`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub uploads: u64,
    pub downloads: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub collections_created: u64,
    pub listings: u64,
}

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    checksum: Option<Checksum>,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeSet<String>,
    objects: BTreeMap<String, MemoryObject>,
    stats: CatalogStats,
    failing: HashSet<String>,
    corrupt_checksums: bool,
    transfer_delay: Option<Duration>,
}

/// Catalog held entirely in memory
#[derive(Debug)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    /// An empty catalog containing only the root collection
    #[must_use]
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.collections.insert("/".to_string());
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test thread panicked; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create `path` and all of its parents
    pub fn add_collection(&self, path: &str) {
        let mut state = self.lock();
        insert_collection_tree(&mut state.collections, path);
    }

    /// Store a data object, creating parent collections as needed
    ///
    /// With `register_checksum` the object's SHA-256 is known to the catalog
    /// up front, as if it had been checksummed at ingest.
    pub fn add_object(&self, path: &str, data: &[u8], register_checksum: bool) {
        let mut state = self.lock();
        insert_collection_tree(&mut state.collections, parent_path(path));
        let checksum = register_checksum.then(|| Checksum::sha256_of(data));
        state.objects.insert(
            path.to_string(),
            MemoryObject {
                data: data.to_vec(),
                checksum,
            },
        );
    }

    /// Content of a data object
    #[must_use]
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).map(|o| o.data.clone())
    }

    #[must_use]
    pub fn has_collection(&self, path: &str) -> bool {
        self.lock().collections.contains(path)
    }

    /// Paths of all data objects, sorted
    #[must_use]
    pub fn object_paths(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    #[must_use]
    pub fn stats(&self) -> CatalogStats {
        self.lock().stats
    }

    /// Make every transfer touching `path` fail
    pub fn fail_path(&self, path: &str) {
        self.lock().failing.insert(path.to_string());
    }

    /// Have `compute_checksum` report a digest that matches nothing
    pub fn corrupt_checksums(&self, corrupt: bool) {
        self.lock().corrupt_checksums = corrupt;
    }

    /// Delay every download and upload by `delay`
    pub fn set_transfer_delay(&self, delay: Option<Duration>) {
        self.lock().transfer_delay = delay;
    }

    async fn before_transfer(&self, path: &str) -> Result<(), CatalogError> {
        let (delay, failing) = {
            let state = self.lock();
            (state.transfer_delay, state.failing.contains(path))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(CatalogError::Api {
                code: -1,
                message: format!("injected failure on {path}"),
            });
        }
        Ok(())
    }
}

fn insert_collection_tree(collections: &mut BTreeSet<String>, path: &str) {
    let mut current = path.to_string();
    loop {
        if !collections.insert(current.clone()) || current == "/" || current == "." {
            break;
        }
        current = parent_path(&current).to_string();
    }
}

#[async_trait::async_trait]
impl ICatalog for MemoryCatalog {
    async fn stat(&self, path: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let state = self.lock();
        if let Some(obj) = state.objects.get(path) {
            return Ok(Some(CatalogEntry::data_object(
                path,
                obj.data.len() as u64,
                obj.checksum.clone(),
            )));
        }
        if state.collections.contains(path) {
            return Ok(Some(CatalogEntry::collection(path)));
        }
        Ok(None)
    }

    async fn list(&self, collection: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut state = self.lock();
        if !state.collections.contains(collection) {
            return Err(CatalogError::NotFound(collection.to_string()));
        }
        state.stats.listings += 1;

        let mut entries: Vec<CatalogEntry> = state
            .objects
            .iter()
            .filter(|(p, _)| parent_path(p) == collection)
            .map(|(p, o)| CatalogEntry::data_object(p.clone(), o.data.len() as u64, o.checksum.clone()))
            .collect();
        entries.extend(
            state
                .collections
                .iter()
                .filter(|c| c.as_str() != collection && parent_path(c) == collection)
                .map(|c| CatalogEntry::collection(c.clone())),
        );
        Ok(entries)
    }

    async fn make_collection(&self, path: &str) -> Result<(), CatalogError> {
        let mut state = self.lock();
        if state.objects.contains_key(path) {
            return Err(CatalogError::Api {
                code: crate::client::CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME,
                message: format!("a data object exists at {path}"),
            });
        }
        if !state.collections.contains(path) {
            insert_collection_tree(&mut state.collections, path);
            state.stats.collections_created += 1;
        }
        Ok(())
    }

    async fn download(&self, path: &str, local: &Path) -> Result<u64, CatalogError> {
        self.before_transfer(path).await?;
        let data = self
            .lock()
            .objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))?;

        tokio::fs::write(local, &data).await?;

        let mut state = self.lock();
        state.stats.downloads += 1;
        state.stats.bytes_downloaded += data.len() as u64;
        Ok(data.len() as u64)
    }

    async fn upload(&self, local: &Path, path: &str) -> Result<u64, CatalogError> {
        self.before_transfer(path).await?;
        let data = tokio::fs::read(local).await?;

        let mut state = self.lock();
        if !state.collections.contains(parent_path(path)) {
            return Err(CatalogError::NotFound(parent_path(path).to_string()));
        }
        let len = data.len() as u64;
        state.objects.insert(
            path.to_string(),
            MemoryObject {
                data,
                checksum: None,
            },
        );
        state.stats.uploads += 1;
        state.stats.bytes_uploaded += len;
        Ok(len)
    }

    async fn compute_checksum(&self, path: &str) -> Result<Checksum, CatalogError> {
        let mut state = self.lock();
        let corrupt = state.corrupt_checksums;
        let obj = state
            .objects
            .get_mut(path)
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))?;
        let checksum = if corrupt {
            Checksum::sha256_of(b"corrupted")
        } else {
            Checksum::sha256_of(&obj.data)
        };
        obj.checksum = Some(checksum.clone());
        Ok(checksum)
    }
}
