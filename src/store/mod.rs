pub mod disk;
pub mod memory;

use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::{debug, warn};

/// A named bucket of raw key/value pairs.
pub trait KeyValueCollection: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&self, key: &[u8], value: &[u8]);
    fn remove(&self, key: &[u8]);
    fn clear(&self);
}

/// A thread-safe key-value store that can hold multiple collections.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    /// Opens a store persisted under `path`. Falls back to memory-only
    /// collections when the keyspace cannot be opened.
    pub fn open(path: &Path) -> Self {
        let keyspace = match fjall::Config::new(path).open() {
            Ok(ks) => Some(Arc::new(ks)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open cache keyspace");
                None
            }
        };

        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }

    /// Returns the collection called `name`, creating it on first use.
    pub fn collection(&self, name: &str, persist: bool) -> Arc<dyn KeyValueCollection> {
        if let Some(existing) = self
            .collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
        {
            return Arc::clone(existing);
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| self.create_collection(name, persist));
        Arc::clone(collection)
    }

    fn create_collection(&self, name: &str, persist: bool) -> Arc<dyn KeyValueCollection> {
        if persist && let Some(ks) = &self.keyspace {
            match ks.open_partition(name, PartitionCreateOptions::default()) {
                Ok(partition) => {
                    debug!(collection = name, "Opened persistent collection");
                    return Arc::new(DiskCollection::new(partition));
                }
                Err(e) => {
                    warn!(collection = name, error = %e, "Falling back to in-memory collection");
                }
            }
        }
        Arc::new(MemoryCollection::new())
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
