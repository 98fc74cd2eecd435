use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::clock::SharedClock;

struct Entry<V> {
    stored_at: DateTime<Utc>,
    value: V,
}

/// Short-lived per-key result cache. An entry is served while its age is
/// strictly below the TTL and dropped on the first read after that.
pub struct TtlCache<V> {
    ttl: Duration,
    clock: SharedClock,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = match entries.get(key) {
            Some(entry) => now - entry.stored_at < self.ttl,
            None => return None,
        };
        if fresh {
            entries.get(key).map(|e| e.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let entry = Entry {
            stored_at: self.clock.now(),
            value,
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), entry);
    }

    #[cfg(test)]
    pub fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
