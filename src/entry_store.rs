// Bounded, TTL-on-access, single-flight entry store (spec section 4.3).

use crate::error::CacheError;
use crate::loader::{LoadOutcome, Loader};
use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::trace;

struct StoredEntry {
    value: String,
    loaded_at_millis: u64,
    last_access: Instant,
    access_count: AtomicU64,
}

/// Point-in-time counters backing `stats::CacheStatistics`.
#[derive(Debug, Clone, Default)]
pub struct EntryStoreCounters {
    pub hit_count: u64,
    pub miss_count: u64,
    pub load_success_count: u64,
    pub load_exception_count: u64,
    pub eviction_count: u64,
    pub total_load_time_nanos: u64,
}

/// One cache's concurrent key/value map.
///
/// Size eviction is least-recently-accessed with ties broken by insertion
/// order (an ordinary FIFO-ish `VecDeque`, same shape as the teacher's
/// `QueryCache::lru_queue`). Single-flight coalescing is a
/// `DashMap<key, Arc<OnceCell<outcome>>>`: `OnceCell::get_or_init` already
/// gives "run exactly once, everyone else awaits the same result" for free.
pub struct EntryStore {
    max_size: u64,
    eviction: Option<Duration>,
    entries: DashMap<String, StoredEntry>,
    lru: Mutex<VecDeque<String>>,
    in_flight: DashMap<String, Arc<OnceCell<Result<LoadOutcome, CacheError>>>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    load_success_count: AtomicU64,
    load_exception_count: AtomicU64,
    eviction_count: AtomicU64,
    total_load_time_nanos: AtomicU64,
}

impl EntryStore {
    pub fn new(max_size: u64, eviction_minutes: u64) -> Self {
        Self {
            max_size,
            eviction: (eviction_minutes > 0)
                .then(|| Duration::from_secs(eviction_minutes * 60)),
            entries: DashMap::new(),
            lru: Mutex::new(VecDeque::new()),
            in_flight: DashMap::new(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            load_success_count: AtomicU64::new(0),
            load_exception_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            total_load_time_nanos: AtomicU64::new(0),
        }
    }

    /// Look up `key`, invoking `loader` on a miss. Concurrent misses for the
    /// same key share one loader invocation (single-flight).
    pub async fn get(&self, key: &str, loader: &Loader) -> Result<LoadOutcome, CacheError> {
        self.sweep_expired();

        if let Some(outcome) = self.record_hit_if_present(key) {
            return Ok(outcome);
        }

        let (cell, is_owner) = match self.in_flight.entry(key.to_string()) {
            DashEntry::Occupied(o) => (o.get().clone(), false),
            DashEntry::Vacant(v) => {
                let cell = Arc::new(OnceCell::new());
                v.insert(cell.clone());
                (cell, true)
            }
        };

        if is_owner {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        }

        let start = Instant::now();
        let result = cell
            .get_or_init(|| async { loader.load(key).await })
            .await
            .clone();

        self.in_flight
            .remove_if(key, |_, v| Arc::ptr_eq(v, &cell));

        if is_owner {
            match &result {
                Ok(LoadOutcome::Found(value)) => {
                    self.load_success_count.fetch_add(1, Ordering::Relaxed);
                    self.total_load_time_nanos
                        .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
                    self.insert(key, value.clone());
                }
                Ok(LoadOutcome::NotFound) => {
                    // No memoization on a miss; nothing to insert.
                }
                Err(_) => {
                    self.load_exception_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        } else if matches!(result, Ok(LoadOutcome::Found(_))) {
            // Joiners of a successful in-flight load are credited as hits,
            // matching the spec's single-flight scenario (S3): the load is
            // attributed to its one owner, everyone else just observed it.
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            self.touch(key);
        }

        result
    }

    fn record_hit_if_present(&self, key: &str) -> Option<LoadOutcome> {
        let entry = self.entries.get(key)?;
        let value = entry.value.clone();
        drop(entry);
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        self.touch(key);
        Some(LoadOutcome::Found(value))
    }

    fn touch(&self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            entry.access_count.fetch_add(1, Ordering::Relaxed);
        }
        // last_access needs &mut; take it separately to avoid holding two
        // guards on the same shard.
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.last_access = Instant::now();
        }
        self.touch_lru(key);
    }

    fn insert(&self, key: &str, value: String) {
        self.sweep_expired();

        while self.max_size > 0 && self.entries.len() as u64 >= self.max_size {
            if !self.evict_one() {
                break;
            }
        }

        let now_millis = now_epoch_millis();
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                loaded_at_millis: now_millis,
                last_access: Instant::now(),
                access_count: AtomicU64::new(0),
            },
        );
        self.add_to_lru(key);
    }

    fn sweep_expired(&self) {
        let Some(ttl) = self.eviction else { return };
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.last_access.elapsed() > ttl)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            if self.entries.remove(&key).is_some() {
                self.remove_from_lru(&key);
                self.eviction_count.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "evicted entry past TTL");
            }
        }
    }

    fn touch_lru(&self, key: &str) {
        let mut lru = self.lru.lock();
        if let Some(pos) = lru.iter().position(|k| k == key) {
            lru.remove(pos);
        }
        lru.push_back(key.to_string());
    }

    fn add_to_lru(&self, key: &str) {
        let mut lru = self.lru.lock();
        lru.push_back(key.to_string());
    }

    fn remove_from_lru(&self, key: &str) {
        let mut lru = self.lru.lock();
        if let Some(pos) = lru.iter().position(|k| k == key) {
            lru.remove(pos);
        }
    }

    /// Evict the single least-recently-accessed entry. Returns `false` when
    /// there is nothing left to evict.
    fn evict_one(&self) -> bool {
        let victim = {
            let mut lru = self.lru.lock();
            lru.pop_front()
        };
        match victim {
            Some(key) => {
                if self.entries.remove(&key).is_some() {
                    self.eviction_count.fetch_add(1, Ordering::Relaxed);
                    trace!(key = %key, "evicted entry for size bound");
                }
                true
            }
            None => false,
        }
    }

    pub fn invalidate(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.remove_from_lru(key);
        }
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
        self.lru.lock().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Defensive copy of `(key, value, loadedAtMillis, accessCount)`.
    pub fn entries_snapshot(&self) -> Vec<(String, String, u64, u64)> {
        self.entries
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    e.value.clone(),
                    e.loaded_at_millis,
                    e.access_count.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn counters(&self) -> EntryStoreCounters {
        EntryStoreCounters {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            load_success_count: self.load_success_count.load(Ordering::Relaxed),
            load_exception_count: self.load_exception_count.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            total_load_time_nanos: self.total_load_time_nanos.load(Ordering::Relaxed),
        }
    }
}

fn now_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
