use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use crate::core::types::KeyValue;

/// Read/hit counters and the touch order used by eviction.
///
/// Shared by concurrent queries through `&self`, so every field synchronizes on its own.
pub struct AccessTracker {
    read_count: AtomicU64,
    hit_count: AtomicU64,
    recent: Mutex<LruCache<KeyValue, ()>>,
    capacity: Option<NonZeroUsize>,
}

impl AccessTracker {
    /// `capacity == 0` disables eviction
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity);
        AccessTracker {
            read_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            recent: Mutex::new(LruCache::unbounded()),
            capacity,
        }
    }

    pub fn increment_read_count(&self) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_hit_count(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark an object as most recently used
    pub fn touch(&self, primary_key: &KeyValue) {
        self.recent.lock().put(primary_key.clone(), ());
    }

    pub fn touch_many<'a>(&self, keys: impl IntoIterator<Item = &'a KeyValue>) {
        let mut recent = self.recent.lock();
        for key in keys {
            recent.put(key.clone(), ());
        }
    }

    pub fn forget(&self, primary_key: &KeyValue) {
        self.recent.lock().pop(primary_key);
    }

    pub fn clear(&self) {
        self.recent.lock().clear();
    }

    /// Least recently used keys beyond capacity, removed from the tracker
    pub fn eviction_candidates(&self) -> Vec<KeyValue> {
        let Some(capacity) = self.capacity else {
            return Vec::new();
        };

        let mut recent = self.recent.lock();
        let mut victims = Vec::new();
        while recent.len() > capacity.get() {
            match recent.pop_lru() {
                Some((key, _)) => victims.push(key),
                None => break,
            }
        }
        victims
    }

    pub fn snapshot(&self) -> AccessStats {
        AccessStats {
            read_count: self.read_count.load(Ordering::Relaxed),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            tracked_objects: self.recent.lock().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessStats {
    pub read_count: u64,
    pub hit_count: u64,
    pub tracked_objects: usize,
}

impl AccessStats {
    pub fn hit_rate(&self) -> f64 {
        if self.read_count == 0 {
            0.0
        } else {
            self.hit_count as f64 / self.read_count as f64
        }
    }
}
