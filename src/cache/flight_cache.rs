use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::types::{CacheStats, CachedFlight};
use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::storage::{CurrentState, StateFilter, Storage, StorageError};

/// In-memory materialized view of `current_state`.
pub struct FlightCache {
    storage: Arc<Storage>,
    clock: SharedClock,
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CachedFlight>>,
    hits: AtomicU64,
    misses: AtomicU64,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
}

impl FlightCache {
    pub fn new(storage: Arc<Storage>, config: &CacheConfig, clock: SharedClock) -> Self {
        Self {
            storage,
            clock,
            ttl: Duration::seconds(config.ttl_secs as i64),
            max_entries: config.max_entries,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            last_refresh: Mutex::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CachedFlight>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CachedFlight>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// A fresh entry, or `None`. Expired entries are dropped here.
    pub fn get(&self, object_id: &str) -> Option<CachedFlight> {
        let object_id = object_id.to_lowercase();
        let now = self.clock.now();

        let expired = match self.read().get(&object_id) {
            Some(entry) if now - entry.cached_at < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            let mut entries = self.write();
            // Re-checked: a refresh may have replaced it in between.
            if entries
                .get(&object_id)
                .is_some_and(|entry| now - entry.cached_at >= self.ttl)
            {
                entries.remove(&object_id);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Every entry, nearest first, unknown distances last. Not TTL-filtered:
    /// the map is replaced wholesale on refresh.
    pub fn get_all(&self) -> Vec<CachedFlight> {
        let mut flights: Vec<CachedFlight> = self.read().values().cloned().collect();
        flights.sort_by(|a, b| {
            let a = a.distance_km.unwrap_or(f64::INFINITY);
            let b = b.distance_km.unwrap_or(f64::INFINITY);
            a.total_cmp(&b)
        });
        flights
    }

    pub fn get_airborne(&self) -> Vec<CachedFlight> {
        self.get_all().into_iter().filter(|f| !f.on_ground).collect()
    }

    /// Rebuilds the whole map from storage and swaps it in.
    pub fn refresh_from_storage(&self) -> Result<usize, StorageError> {
        let states = self.storage.query_current_states(StateFilter::All)?;
        let now = self.clock.now();
        let fresh: HashMap<String, CachedFlight> = states
            .iter()
            .map(|state| (state.object_id.clone(), CachedFlight::from_state(state, now)))
            .collect();
        let count = fresh.len();

        *self.write() = fresh;
        *self.last_refresh.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);

        log::debug!("Cache refreshed with {} flights", count);
        Ok(count)
    }

    /// Inserts or replaces one entry. Over capacity, the oldest tenth
    /// (by cache time) is evicted.
    pub fn update(&self, state: &CurrentState) {
        let cached = CachedFlight::from_state(state, self.clock.now());
        let mut entries = self.write();
        entries.insert(cached.object_id.clone(), cached);

        if entries.len() > self.max_entries {
            let mut by_age: Vec<(String, DateTime<Utc>)> = entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.cached_at))
                .collect();
            by_age.sort_by_key(|(_, cached_at)| *cached_at);

            let evict = (by_age.len() / 10).max(1);
            for (id, _) in by_age.into_iter().take(evict) {
                entries.remove(&id);
            }
            log::debug!("Cache over capacity, evicted {} entries", evict);
        }
    }

    #[cfg(test)]
    pub fn invalidate(&self, object_id: &str) {
        self.write().remove(&object_id.to_lowercase());
    }

    /// Drops every entry. Reads see an empty cache until the next refresh.
    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            entries: self.len(),
            max_entries: self.max_entries,
            ttl_secs: self.ttl.num_seconds(),
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            last_refresh: *self.last_refresh.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}
