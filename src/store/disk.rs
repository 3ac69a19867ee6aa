use super::KeyValueCollection;
use fjall::PartitionHandle;
use tracing::debug;

/// Collection persisted in a `fjall` partition.
pub struct DiskCollection {
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }
}

impl KeyValueCollection for DiskCollection {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.partition.get(key) {
            Ok(Some(value)) => {
                debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
                Some(value.to_vec())
            }
            Ok(None) => {
                debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
                None
            }
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) {
        match self.partition.insert(key, value) {
            Ok(()) => debug!("Cache PUT for key: {}", String::from_utf8_lossy(key)),
            Err(e) => debug!("DiskCollection put error: {}", e),
        }
    }

    fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }

    fn clear(&self) {
        let keys: Vec<_> = self.partition.keys().filter_map(Result::ok).collect();
        for key in keys {
            if let Err(e) = self.partition.remove(key) {
                debug!("DiskCollection clear error: {}", e);
            }
        }
        debug!("Cache CLEAR");
    }
}
