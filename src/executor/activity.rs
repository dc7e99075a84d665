use std::collections::VecDeque;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};

/// Reserved collection name under which the activity log is exposed; never logged itself
pub const ACTIVITY_COLLECTION: &str = "@ACTIVITY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub collection: String,
    pub query: String,
    pub plan: String,
    pub items: usize,
    pub elapsed_micros: u64,
}

/// Bounded in-memory record of the most recent queries
pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        ActivityLog {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append, dropping the oldest entry when full
    pub fn record(&self, entry: ActivityEntry) {
        if entry.collection == ACTIVITY_COLLECTION || self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Oldest first
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
