use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Serialize, Deserialize};
use crate::core::error::Result;

/// fsync policy of the durable transaction log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Immediate,  // fsync after every record
    Batch,      // fsync every megabyte
    None,       // Let OS handle it
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,

    // Planner
    pub index_pruning_factor: usize,   // drop 2nd index when count > factor * 1st
    pub parallel_or_branches: bool,
    pub pivot_shards: usize,

    // Transactions
    pub lock_timeout_ms: u64,
    pub client_decision_timeout_ms: u64,
    pub wal_sync_mode: SyncMode,
    pub wal_compression_threshold: usize,

    // Bookkeeping
    pub activity_log_capacity: usize,
    pub eviction_capacity: usize,      // 0 = unbounded
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),

            index_pruning_factor: 4,
            parallel_or_branches: true,
            pivot_shards: num_cpus::get().max(1),

            lock_timeout_ms: 4_000,
            client_decision_timeout_ms: 10_000,
            wal_sync_mode: SyncMode::Immediate,
            wal_compression_threshold: 4 * 1024,

            activity_log_capacity: 1_000,
            eviction_capacity: 0,
        }
    }
}

impl Config {
    /// Load a configuration file; missing fields fall back to defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config = serde_json::from_slice(&data)?;
        Ok(config)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn client_decision_timeout(&self) -> Duration {
        Duration::from_millis(self.client_decision_timeout_ms)
    }
}
