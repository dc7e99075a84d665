use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::Result;

/// Directory structure for data files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,  // Root directory
    pub wal_dir: PathBuf,   // Transaction log location
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let wal_dir = base_dir.join("wal");
        fs::create_dir_all(&wal_dir)?;

        Ok(StorageLayout { base_dir, wal_dir })
    }

    pub fn transaction_log_path(&self) -> PathBuf {
        self.wal_dir.join("transactions.log")
    }

    /// Where a log is moved once its transactions have been replayed
    pub fn archived_log_path(&self, sequence: u64) -> PathBuf {
        self.wal_dir.join(format!("transactions_{:08}.log", sequence))
    }

    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }
}
