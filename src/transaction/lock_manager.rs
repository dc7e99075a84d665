use std::collections::HashMap;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;
use crate::core::error::{Error, ErrorKind, Result};

#[derive(Default)]
struct LockTable {
    owners: HashMap<String, Uuid>,       // collection -> holding transaction
    sessions: HashMap<Uuid, Vec<String>>,
}

/// Cross-collection write locks, taken all at once by a transaction
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Notify,
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            table: Mutex::new(LockTable::default()),
            released: Notify::new(),
        }
    }

    /// All or nothing; a transaction may re-take collections it already holds
    fn try_lock(&self, transaction_id: Uuid, collections: &[String]) -> bool {
        let mut table = self.table.lock();
        let free = collections
            .iter()
            .all(|name| table.owners.get(name).is_none_or(|owner| *owner == transaction_id));
        if !free {
            return false;
        }

        for name in collections {
            if table.owners.insert(name.clone(), transaction_id).is_none() {
                table.sessions.entry(transaction_id).or_default().push(name.clone());
            }
        }
        true
    }

    /// Wait until every collection is free or the timeout elapses.
    ///
    /// The locks are held until the returned guard is dropped, which also happens when the
    /// future owning it is cancelled or unwinds.
    pub async fn try_acquire_write_lock(
        &self,
        transaction_id: Uuid,
        timeout: Duration,
        collections: &[String],
    ) -> Option<WriteLockGuard<'_>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Registered before checking so a release in between is not missed
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_lock(transaction_id, collections) {
                tracing::debug!(transaction = %transaction_id, ?collections, "write lock acquired");
                return Some(WriteLockGuard { locks: self, transaction_id });
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::warn!(transaction = %transaction_id, ?collections, "write lock timed out");
                return None;
            }
        }
    }

    /// Run `action` holding the write lock, releasing it whatever the outcome
    pub async fn do_with_write_lock<T>(
        &self,
        transaction_id: Uuid,
        timeout: Duration,
        collections: &[String],
        action: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let Some(_guard) = self.try_acquire_write_lock(transaction_id, timeout, collections).await else {
            return Err(Error::new(
                ErrorKind::FailedToAcquireLock,
                format!("Could not lock {:?} within {:?}", collections, timeout),
            ));
        };
        action()
    }

    /// Release every lock held by the transaction
    pub fn close_session(&self, transaction_id: Uuid) {
        let released = {
            let mut table = self.table.lock();
            let names = table.sessions.remove(&transaction_id).unwrap_or_default();
            for name in &names {
                table.owners.remove(name);
            }
            names.len()
        };
        if released > 0 {
            self.released.notify_waiters();
        }
    }

    pub fn is_locked(&self, collection: &str) -> bool {
        self.table.lock().owners.contains_key(collection)
    }

    pub fn holder(&self, collection: &str) -> Option<Uuid> {
        self.table.lock().owners.get(collection).copied()
    }
}

/// Write locks of one transaction; dropping it closes the session
#[must_use = "the locks are released as soon as the guard is dropped"]
pub struct WriteLockGuard<'a> {
    locks: &'a LockManager,
    transaction_id: Uuid,
}

impl WriteLockGuard<'_> {
    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }
}

impl Drop for WriteLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.close_session(self.transaction_id);
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn locks_are_all_or_nothing() {
        let locks = LockManager::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let held = locks.try_acquire_write_lock(a, Duration::from_millis(10), &names(&["orders"])).await;
        assert!(held.is_some());
        assert!(locks.try_acquire_write_lock(b, Duration::from_millis(10), &names(&["invoices", "orders"])).await.is_none());
        assert!(!locks.is_locked("invoices"));

        drop(held);
        let held = locks.try_acquire_write_lock(b, Duration::from_millis(10), &names(&["invoices", "orders"])).await;
        assert_eq!(held.map(|g| g.transaction_id()), Some(b));
        assert!(!locks.is_locked("orders"));
    }

    #[tokio::test]
    async fn waiter_wakes_up_on_release() {
        let locks = Arc::new(LockManager::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let held = locks.try_acquire_write_lock(a, Duration::from_millis(10), &names(&["orders"])).await;
        assert!(held.is_some());

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.try_acquire_write_lock(b, Duration::from_secs(5), &names(&["orders"])).await;
                guard.map(|g| g.transaction_id())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(waiter.await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn cancelled_holder_releases() {
        let locks = LockManager::new();
        let holder = async {
            let _guard = locks.try_acquire_write_lock(Uuid::new_v4(), Duration::from_millis(10), &names(&["orders"])).await;
            std::future::pending::<()>().await
        };
        assert!(tokio::time::timeout(Duration::from_millis(20), holder).await.is_err());
        assert!(!locks.is_locked("orders"));
    }

    #[tokio::test]
    async fn action_failure_still_releases() {
        let locks = LockManager::new();
        let tx = Uuid::new_v4();
        let result: Result<()> = locks
            .do_with_write_lock(tx, Duration::from_millis(10), &names(&["orders"]), || {
                Err(Error::new(ErrorKind::Internal, "boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(!locks.is_locked("orders"));
    }

    #[tokio::test]
    async fn panicking_action_still_releases() {
        let locks = Arc::new(LockManager::new());
        let task = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _: Result<()> = locks
                    .do_with_write_lock(Uuid::new_v4(), Duration::from_millis(10), &names(&["orders"]), || panic!("boom"))
                    .await;
            })
        };
        assert!(task.await.is_err());
        assert!(!locks.is_locked("orders"));
    }
}
