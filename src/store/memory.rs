use super::KeyValueCollection;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// In-memory collection, lost when the process exits.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, Vec<u8>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueCollection for MemoryCollection {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let value = self.lock().get(key).cloned();
        if value.is_some() {
            debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
        } else {
            debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
        }
        value
    }

    fn put(&self, key: &[u8], value: &[u8]) {
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        self.lock().insert(key.to_vec(), value.to_vec());
    }

    fn remove(&self, key: &[u8]) {
        debug!("Cache REMOVE for key: {}", String::from_utf8_lossy(key));
        self.lock().remove(key);
    }

    fn clear(&self) {
        debug!("Cache CLEAR");
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_get_put() {
        let cache = MemoryCollection::new();

        assert!(cache.get(b"key1").is_none());

        cache.put(b"key1", b"123");
        assert_eq!(cache.get(b"key1"), Some(b"123".to_vec()));

        assert!(cache.get(b"key2").is_none());
    }

    #[test]
    fn test_memory_remove_and_clear() {
        let cache = MemoryCollection::new();
        cache.put(b"key1", b"1");
        cache.put(b"key2", b"2");

        cache.remove(b"key1");
        assert!(cache.get(b"key1").is_none());
        assert_eq!(cache.get(b"key2"), Some(b"2".to_vec()));

        cache.clear();
        assert!(cache.get(b"key2").is_none());
    }
}
