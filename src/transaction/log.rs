use std::collections::HashSet;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::core::error::Result;
use crate::transaction::request::DurableTransaction;

/// One record of the durable transaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    Committed(DurableTransaction),   // single stage: applied right after logging
    Delayed(DurableTransaction),     // two stage: staged, waiting for the client decision
    Cancelled(Uuid),                 // voids the earlier record of that transaction
}

/// Durable staging of transactions, written before any in-memory change
pub trait TransactionLog: Send + Sync {
    fn new_transaction(&self, record: &DurableTransaction, two_stage: bool) -> Result<()>;

    /// Void a logged record that will not be applied: a rolled back two-stage record,
    /// or any record whose in-memory application failed
    fn cancel_delayed_transaction(&self, transaction_id: Uuid) -> Result<()>;
}

/// Records that must be re-applied after a restart, in log order
pub fn recoverable(entries: &[LogEntry]) -> Vec<DurableTransaction> {
    let cancelled: HashSet<Uuid> = entries
        .iter()
        .filter_map(|entry| match entry {
            LogEntry::Cancelled(id) => Some(*id),
            _ => None,
        })
        .collect();

    entries
        .iter()
        .filter_map(|entry| match entry {
            LogEntry::Committed(record) | LogEntry::Delayed(record) if !cancelled.contains(&record.transaction_id) => {
                Some(record.clone())
            }
            _ => None,
        })
        .collect()
}

/// Non-durable log kept in memory
#[derive(Default)]
pub struct InMemoryTransactionLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn recoverable_transactions(&self) -> Vec<DurableTransaction> {
        recoverable(&self.entries.lock())
    }
}

impl TransactionLog for InMemoryTransactionLog {
    fn new_transaction(&self, record: &DurableTransaction, two_stage: bool) -> Result<()> {
        let entry = if two_stage {
            LogEntry::Delayed(record.clone())
        } else {
            LogEntry::Committed(record.clone())
        };
        self.entries.lock().push(entry);
        Ok(())
    }

    fn cancel_delayed_transaction(&self, transaction_id: Uuid) -> Result<()> {
        self.entries.lock().push(LogEntry::Cancelled(transaction_id));
        Ok(())
    }
}
