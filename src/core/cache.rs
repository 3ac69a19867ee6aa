//! Time-boxed caches owned by the fetch layer.

use crate::core::fund::{HistoryPeriod, HoldingEntry};
use crate::store::KeyValueCollection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub const DEFAULT_HOLDINGS_CACHE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct HoldingsCacheEntry {
    data: Vec<HoldingEntry>,
    timestamp: i64,
}

/// Parsed holdings per fund code, valid for a fixed duration.
///
/// An entry older than the duration is treated as absent and evicted on read.
pub struct HoldingsCache {
    collection: Arc<dyn KeyValueCollection>,
    clock: Arc<dyn Clock>,
    duration: Duration,
}

impl HoldingsCache {
    pub fn new(
        collection: Arc<dyn KeyValueCollection>,
        clock: Arc<dyn Clock>,
        duration: Duration,
    ) -> Self {
        Self {
            collection,
            clock,
            duration,
        }
    }

    pub fn get(&self, fund_code: &str) -> Option<Vec<HoldingEntry>> {
        let raw = self.collection.get(fund_code.as_bytes())?;
        let entry: HoldingsCacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(fund_code, error = %e, "Dropping unreadable holdings cache entry");
                self.collection.remove(fund_code.as_bytes());
                return None;
            }
        };

        let age = self.clock.now_millis() - entry.timestamp;
        if age > self.duration.as_millis() as i64 {
            debug!(fund_code, age_ms = age, "Holdings cache entry expired");
            self.collection.remove(fund_code.as_bytes());
            return None;
        }

        Some(entry.data)
    }

    pub fn put(&self, fund_code: &str, holdings: &[HoldingEntry]) {
        let entry = HoldingsCacheEntry {
            data: holdings.to_vec(),
            timestamp: self.clock.now_millis(),
        };
        match serde_json::to_vec(&entry) {
            Ok(bytes) => self.collection.put(fund_code.as_bytes(), &bytes),
            Err(e) => warn!(fund_code, error = %e, "Failed to serialize holdings cache entry"),
        }
    }

    /// Clears one fund's entry, or every entry when `fund_code` is `None`.
    pub fn clear(&self, fund_code: Option<&str>) {
        match fund_code {
            Some(code) => self.collection.remove(code.as_bytes()),
            None => self.collection.clear(),
        }
    }
}

/// Memo of successfully fetched history series keyed by code and period.
pub struct HistoryCache<V: Clone> {
    entries: Mutex<HashMap<(String, HistoryPeriod), (i64, Vec<V>)>>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl<V: Clone> HistoryCache<V> {
    pub fn new(clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            lifetime,
        }
    }

    pub fn get(&self, code: &str, period: HistoryPeriod) -> Option<Vec<V>> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (code.to_string(), period);
        let (stored_at, series) = entries.get(&key)?;
        if self.clock.now_millis() - stored_at > self.lifetime.as_millis() as i64 {
            debug!(code, %period, "History cache entry expired");
            entries.remove(&key);
            return None;
        }
        debug!(code, %period, "History cache HIT");
        Some(series.clone())
    }

    pub fn put(&self, code: &str, period: HistoryPeriod, series: Vec<V>) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            (code.to_string(), period),
            (self.clock.now_millis(), series),
        );
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
