use std::sync::Arc;
use uuid::Uuid;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::store::registry::CollectionRegistry;
use crate::transaction::client::TransactionClient;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::log::TransactionLog;
use crate::transaction::request::{DurableTransaction, TransactionRequest};
use crate::transaction::staging::{replay, stage_transaction};
use crate::transaction::response::Response;

/// Where a transaction stands; the last three are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Received,
    LockRequested,
    LockAcquired,
    ConditionsChecked,
    DurablyStaged,
    AwaitingClientDecision,
    Committed,
    RolledBack,
    Failed(ErrorKind),
}

/// Coordinates locking, durable staging and in-memory application of transactions
pub struct TransactionManager {
    config: Config,
    registry: Arc<CollectionRegistry>,
    locks: Arc<LockManager>,
    log: Arc<dyn TransactionLog>,
}

impl TransactionManager {
    pub fn new(
        config: Config,
        registry: Arc<CollectionRegistry>,
        locks: Arc<LockManager>,
        log: Arc<dyn TransactionLog>,
    ) -> Self {
        TransactionManager { config, registry, locks, log }
    }

    /// Run a transaction to a terminal state; the client learns the outcome through responses
    pub async fn process_transaction_request<C: TransactionClient>(
        &self,
        request: &TransactionRequest,
        client: &C,
    ) -> TransactionState {
        let tx = request.transaction_id;
        transition(tx, TransactionState::Received);

        if let Err(err) = self.validate(request) {
            return fail(tx, client, err);
        }

        if request.is_single_stage {
            self.process_single_stage(request, client).await
        } else {
            self.process_two_stage(request, client).await
        }
    }

    fn validate(&self, request: &TransactionRequest) -> Result<()> {
        if !request.has_id() {
            return Err(Error::new(ErrorKind::InvalidArgument, "Transaction id is not set".to_string()));
        }
        for name in request.collections() {
            if !self.registry.contains(&name) {
                return Err(Error::unknown_collection(&name));
            }
        }
        Ok(())
    }

    async fn process_single_stage<C: TransactionClient>(&self, request: &TransactionRequest, client: &C) -> TransactionState {
        let tx = request.transaction_id;
        let collections = request.collections();
        transition(tx, TransactionState::LockRequested);

        let result = self
            .locks
            .do_with_write_lock(tx, self.config.lock_timeout(), &collections, || {
                let record = stage_transaction(&self.registry, &self.config, request)?;
                self.log.new_transaction(&record, false)?;
                self.execute_in_memory(&record).inspect_err(|err| {
                    tracing::error!(transaction = %tx, error = %err, "in-memory application failed after logging");
                    self.cancel(tx);
                })
            })
            .await;

        match result {
            Ok(()) => {
                client.send_response(Response::Null);
                transition(tx, TransactionState::Committed)
            }
            Err(err) => fail(tx, client, err),
        }
    }

    async fn process_two_stage<C: TransactionClient>(&self, request: &TransactionRequest, client: &C) -> TransactionState {
        let tx = request.transaction_id;
        let collections = request.collections();
        transition(tx, TransactionState::LockRequested);

        let Some(_lock) = self.locks.try_acquire_write_lock(tx, self.config.lock_timeout(), &collections).await else {
            let err = Error::new(
                ErrorKind::FailedToAcquireLock,
                format!("Could not lock {:?} within {:?}", collections, self.config.lock_timeout()),
            );
            return fail(tx, client, err);
        };
        self.process_two_stage_locked(request, client).await
    }

    async fn process_two_stage_locked<C: TransactionClient>(
        &self,
        request: &TransactionRequest,
        client: &C,
    ) -> TransactionState {
        let tx = request.transaction_id;
        transition(tx, TransactionState::LockAcquired);

        client.send_response(Response::Ready);
        if self.client_decision(client).await != Some(true) {
            tracing::warn!(transaction = %tx, "client did not confirm, nothing staged");
            return transition(tx, TransactionState::RolledBack);
        }

        let record = match stage_transaction(&self.registry, &self.config, request) {
            Ok(record) => record,
            Err(err) => return fail(tx, client, err),
        };
        transition(tx, TransactionState::ConditionsChecked);

        if let Err(err) = self.log.new_transaction(&record, true) {
            return fail(tx, client, err);
        }
        transition(tx, TransactionState::DurablyStaged);

        client.send_response(Response::Ready);
        transition(tx, TransactionState::AwaitingClientDecision);

        match self.client_decision(client).await {
            Some(true) => match self.execute_in_memory(&record) {
                Ok(()) => {
                    client.send_response(Response::Null);
                    transition(tx, TransactionState::Committed)
                }
                Err(err) => {
                    tracing::error!(transaction = %tx, error = %err, "in-memory application failed after staging");
                    self.cancel(tx);
                    client.send_response(err.clone().into());
                    TransactionState::Failed(err.kind)
                }
            },
            decision => {
                self.cancel(tx);
                tracing::warn!(transaction = %tx, timed_out = decision.is_none(), "transaction rolled back");
                if decision.is_none() {
                    client.send_response(
                        Error::new(ErrorKind::InvalidState, "No client decision, transaction rolled back".to_string()).into(),
                    );
                }
                transition(tx, TransactionState::RolledBack)
            }
        }
    }

    /// `None` when the client does not answer within the decision timeout
    async fn client_decision<C: TransactionClient>(&self, client: &C) -> Option<bool> {
        tokio::time::timeout(self.config.client_decision_timeout(), client.should_continue())
            .await
            .ok()
            .flatten()
    }

    /// Void the logged record so recovery does not apply it
    fn cancel(&self, tx: Uuid) {
        if let Err(err) = self.log.cancel_delayed_transaction(tx) {
            tracing::error!(transaction = %tx, error = %err, "could not cancel staged transaction");
        }
    }

    fn execute_in_memory(&self, record: &DurableTransaction) -> Result<()> {
        replay(record, &self.registry)
    }
}

fn transition(tx: Uuid, state: TransactionState) -> TransactionState {
    tracing::debug!(transaction = %tx, ?state, "transaction state");
    state
}

fn fail<C: TransactionClient>(tx: Uuid, client: &C, err: Error) -> TransactionState {
    tracing::warn!(transaction = %tx, error = %err, "transaction failed");
    let kind = err.kind;
    client.send_response(err.into());
    TransactionState::Failed(kind)
}
