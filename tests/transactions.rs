use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use packstore::core::config::Config;
use packstore::core::error::ErrorKind;
use packstore::core::types::{KeyValue, KeyValueKind, PackedObject};
use packstore::query::{AtomicQuery, OrQuery};
use packstore::schema::{CollectionSchema, PropertyDescription};
use packstore::storage::{StorageLayout, WalTransactionLog};
use packstore::store::CollectionRegistry;
use packstore::transaction::{
    channel, replay, InMemoryTransactionLog, LockManager, LogEntry, PutRequest, RemoveManyRequest, RemoveRequest,
    Response, TransactionLog, TransactionManager, TransactionRequest, TransactionState,
};

fn registry() -> Arc<CollectionRegistry> {
    let registry = CollectionRegistry::new(0);
    registry
        .register(
            CollectionSchema::new("orders", PropertyDescription::primary("Id", KeyValueKind::Int))
                .with_property(PropertyDescription::dictionary("ClientId", KeyValueKind::Int))
                .with_property(PropertyDescription::ordered("Amount", KeyValueKind::Int))
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            CollectionSchema::new("invoices", PropertyDescription::primary("Id", KeyValueKind::Int))
                .with_property(PropertyDescription::unique("Number", KeyValueKind::Text))
                .with_property(PropertyDescription::dictionary("Version", KeyValueKind::Int))
                .build()
                .unwrap(),
        )
        .unwrap();

    let orders = registry.require("orders").unwrap();
    let mut orders = orders.write();
    let objects = (1..=6)
        .map(|id| {
            orders
                .schema()
                .pack(KeyValue::int("Id", id))
                .set(KeyValue::int("ClientId", if id % 2 == 1 { 7 } else { 8 }))
                .set(KeyValue::int("Amount", id * 10))
                .build()
                .unwrap()
        })
        .collect();
    orders.internal_put_many(objects).unwrap();
    drop(orders);
    Arc::new(registry)
}

fn invoice(registry: &CollectionRegistry, id: i64, number: &str, version: i64) -> PackedObject {
    let invoices = registry.require("invoices").unwrap();
    let invoices = invoices.read();
    invoices
        .schema()
        .pack(KeyValue::int("Id", id))
        .set(KeyValue::text("Number", number))
        .set(KeyValue::int("Version", version))
        .build()
        .unwrap()
}

/// Put an invoice and remove the orders of client 7
fn invoice_client_seven(registry: &CollectionRegistry) -> TransactionRequest {
    let client_seven = OrQuery::single("orders", AtomicQuery::eq(KeyValue::int("ClientId", 7)));
    TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice(registry, 1, "INV-1", 1)]).into(),
        RemoveManyRequest::new(client_seven).into(),
    ])
}

/// Primary keys of invoices and orders, sorted
fn snapshot(registry: &CollectionRegistry) -> (Vec<i64>, Vec<i64>) {
    let ids = |name: &str| {
        let shared = registry.require(name).unwrap();
        let store = shared.read();
        let mut ids: Vec<i64> = store
            .all_handles()
            .iter()
            .filter_map(|h| store.get(h).and_then(|o| o.primary_key.as_i64()))
            .collect();
        ids.sort_unstable();
        ids
    };
    (ids("invoices"), ids("orders"))
}

fn order(registry: &CollectionRegistry, id: i64, client: i64) -> PackedObject {
    let orders = registry.require("orders").unwrap();
    let orders = orders.read();
    orders
        .schema()
        .pack(KeyValue::int("Id", id))
        .set(KeyValue::int("ClientId", client))
        .set(KeyValue::int("Amount", 0))
        .build()
        .unwrap()
}

fn counts(registry: &CollectionRegistry) -> (usize, usize) {
    (
        registry.require("invoices").unwrap().read().len(),
        registry.require("orders").unwrap().read().len(),
    )
}

struct Fixture {
    registry: Arc<CollectionRegistry>,
    locks: Arc<LockManager>,
    log: Arc<InMemoryTransactionLog>,
    manager: TransactionManager,
}

fn fixture(config: Config) -> Fixture {
    let registry = registry();
    let locks = Arc::new(LockManager::new());
    let log = Arc::new(InMemoryTransactionLog::new());
    let manager = TransactionManager::new(config, registry.clone(), locks.clone(), log.clone());
    Fixture { registry, locks, log, manager }
}

fn quick_config() -> Config {
    Config { lock_timeout_ms: 30, client_decision_timeout_ms: 50, ..Config::default() }
}

#[tokio::test]
async fn two_stage_commit_applies_everything() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();
    assert!(handle.decide(true).await);
    assert!(handle.decide(true).await);

    let request = invoice_client_seven(&f.registry);
    let state = f.manager.process_transaction_request(&request, &client).await;

    assert_eq!(state, TransactionState::Committed);
    assert_eq!(handle.drain(), vec![Response::Ready, Response::Ready, Response::Null]);
    assert_eq!(counts(&f.registry), (1, 3));
    assert!(!f.locks.is_locked("orders"));

    let entries = f.log.entries();
    let [LogEntry::Delayed(record)] = entries.as_slice() else {
        panic!("expected one staged record, got {:?}", entries);
    };
    assert_eq!(record.items_to_put.len(), 1);
    assert_eq!(record.items_to_delete.len(), 3);
}

#[tokio::test]
async fn client_abort_after_staging_rolls_back() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();
    assert!(handle.decide(true).await);
    assert!(handle.decide(false).await);

    let request = invoice_client_seven(&f.registry);
    let state = f.manager.process_transaction_request(&request, &client).await;

    assert_eq!(state, TransactionState::RolledBack);
    assert_eq!(handle.drain(), vec![Response::Ready, Response::Ready]);
    assert_eq!(counts(&f.registry), (0, 6));
    assert_eq!(f.log.entries().len(), 2);
    assert!(f.log.recoverable_transactions().is_empty());
}

#[tokio::test]
async fn missing_decision_times_out_to_rollback() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();
    assert!(handle.decide(true).await);

    let request = invoice_client_seven(&f.registry);
    let state = f.manager.process_transaction_request(&request, &client).await;

    assert_eq!(state, TransactionState::RolledBack);
    let responses = handle.drain();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[2].exception_kind(), Some(ErrorKind::InvalidState));
    assert_eq!(counts(&f.registry), (0, 6));
    assert!(matches!(f.log.entries().last(), Some(LogEntry::Cancelled(id)) if *id == request.transaction_id));
    assert!(!f.locks.is_locked("invoices"));
}

#[tokio::test]
async fn refusal_before_staging_writes_nothing() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();
    assert!(handle.decide(false).await);

    let state = f.manager.process_transaction_request(&invoice_client_seven(&f.registry), &client).await;
    assert_eq!(state, TransactionState::RolledBack);
    assert_eq!(handle.drain(), vec![Response::Ready]);
    assert!(f.log.entries().is_empty());
}

#[tokio::test]
async fn lock_timeout_fails_without_staging() {
    let f = fixture(quick_config());
    let other = Uuid::new_v4();
    let _held = f.locks.try_acquire_write_lock(other, Duration::from_millis(10), &["orders".to_string()]).await;
    assert!(_held.is_some());

    let (client, mut handle) = channel();
    let state = f.manager.process_transaction_request(&invoice_client_seven(&f.registry), &client).await;

    assert_eq!(state, TransactionState::Failed(ErrorKind::FailedToAcquireLock));
    let responses = handle.drain();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].exception_kind(), Some(ErrorKind::FailedToAcquireLock));
    assert!(f.log.entries().is_empty());
    assert_eq!(counts(&f.registry), (0, 6));
    assert_eq!(f.locks.holder("orders"), Some(other));
    assert!(!f.locks.is_locked("invoices"));
}

#[tokio::test]
async fn failed_condition_releases_the_lock() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();
    assert!(handle.decide(true).await);

    let guard = OrQuery::single("invoices", AtomicQuery::eq(KeyValue::int("Version", 1)));
    let request = TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice(&f.registry, 9, "INV-9", 2)]).when(guard).into(),
    ]);
    let state = f.manager.process_transaction_request(&request, &client).await;

    assert_eq!(state, TransactionState::Failed(ErrorKind::ConditionNotSatisfied));
    assert_eq!(handle.drain().last().and_then(|r| r.exception_kind()), Some(ErrorKind::ConditionNotSatisfied));
    assert!(f.log.entries().is_empty());
    assert!(!f.locks.is_locked("invoices"));
}

#[tokio::test]
async fn single_stage_needs_no_round_trip() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();

    let request = TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice(&f.registry, 1, "INV-1", 1)]).into(),
        RemoveRequest::new("orders", KeyValue::int("Id", 2)).into(),
    ])
    .single_stage();
    let state = f.manager.process_transaction_request(&request, &client).await;

    assert_eq!(state, TransactionState::Committed);
    assert_eq!(handle.drain(), vec![Response::Null]);
    assert_eq!(counts(&f.registry), (1, 5));
    assert!(matches!(f.log.entries().as_slice(), [LogEntry::Committed(_)]));
}

#[tokio::test]
async fn single_stage_constraint_violation_changes_nothing() {
    let f = fixture(quick_config());
    let (client, _handle) = channel();
    let first = TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice(&f.registry, 1, "INV-1", 1)]).into(),
    ])
    .single_stage();
    assert_eq!(f.manager.process_transaction_request(&first, &client).await, TransactionState::Committed);

    let duplicate = TransactionRequest::new(vec![
        RemoveRequest::new("orders", KeyValue::int("Id", 1)).into(),
        PutRequest::new("invoices", vec![invoice(&f.registry, 2, "INV-1", 1)]).into(),
    ])
    .single_stage();
    let state = f.manager.process_transaction_request(&duplicate, &client).await;

    assert_eq!(state, TransactionState::Failed(ErrorKind::InvalidArgument));
    assert_eq!(counts(&f.registry), (1, 6));
    assert_eq!(f.log.entries().len(), 1);
}

#[tokio::test]
async fn unique_collision_inside_one_transaction_changes_nothing() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();

    let same_put = TransactionRequest::new(vec![
        RemoveRequest::new("orders", KeyValue::int("Id", 1)).into(),
        PutRequest::new("invoices", vec![invoice(&f.registry, 1, "DUP", 1), invoice(&f.registry, 2, "DUP", 1)]).into(),
    ])
    .single_stage();
    let state = f.manager.process_transaction_request(&same_put, &client).await;
    assert_eq!(state, TransactionState::Failed(ErrorKind::InvalidArgument));

    let two_puts = TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice(&f.registry, 1, "DUP", 1)]).into(),
        RemoveRequest::new("orders", KeyValue::int("Id", 1)).into(),
        PutRequest::new("invoices", vec![invoice(&f.registry, 2, "DUP", 1)]).into(),
    ])
    .single_stage();
    let state = f.manager.process_transaction_request(&two_puts, &client).await;
    assert_eq!(state, TransactionState::Failed(ErrorKind::InvalidArgument));

    assert_eq!(counts(&f.registry), (0, 6));
    assert!(f.log.entries().is_empty());
    let responses = handle.drain();
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.exception_kind() == Some(ErrorKind::InvalidArgument)));
}

#[tokio::test]
async fn unique_value_freed_earlier_in_the_transaction_can_be_reused() {
    let f = fixture(quick_config());
    let (client, _handle) = channel();
    let first = TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice(&f.registry, 1, "INV-1", 1)]).into(),
    ])
    .single_stage();
    assert_eq!(f.manager.process_transaction_request(&first, &client).await, TransactionState::Committed);

    let renumber = TransactionRequest::new(vec![
        RemoveRequest::new("invoices", KeyValue::int("Id", 1)).into(),
        PutRequest::new("invoices", vec![invoice(&f.registry, 2, "INV-1", 1)]).into(),
    ])
    .single_stage();
    assert_eq!(f.manager.process_transaction_request(&renumber, &client).await, TransactionState::Committed);
    assert_eq!(snapshot(&f.registry).0, vec![2]);
}

#[tokio::test]
async fn put_then_remove_many_replays_to_the_same_state() {
    let f = fixture(quick_config());
    let (client, _handle) = channel();

    let request = TransactionRequest::new(vec![
        PutRequest::new("orders", vec![order(&f.registry, 100, 7), order(&f.registry, 101, 8)]).into(),
        RemoveManyRequest::new(OrQuery::single("orders", AtomicQuery::eq(KeyValue::int("ClientId", 7)))).into(),
        PutRequest::new("invoices", vec![invoice(&f.registry, 1, "INV-1", 1)]).into(),
    ])
    .single_stage();
    assert_eq!(f.manager.process_transaction_request(&request, &client).await, TransactionState::Committed);
    assert_eq!(snapshot(&f.registry), (vec![1], vec![2, 4, 6, 101]));

    let fresh = registry();
    for record in f.log.recoverable_transactions() {
        replay(&record, &fresh).unwrap();
    }
    assert_eq!(snapshot(&fresh), snapshot(&f.registry));
}

#[tokio::test]
async fn dropped_transaction_releases_its_locks() {
    let f = fixture(quick_config());
    let (client, _handle) = channel();
    let request = invoice_client_seven(&f.registry);

    let config = Config { client_decision_timeout_ms: 60_000, ..quick_config() };
    let manager = TransactionManager::new(config, f.registry.clone(), f.locks.clone(), f.log.clone());
    let pending = manager.process_transaction_request(&request, &client);
    assert!(tokio::time::timeout(Duration::from_millis(50), pending).await.is_err());

    assert!(!f.locks.is_locked("orders"));
    assert!(!f.locks.is_locked("invoices"));
    assert!(f.log.entries().is_empty());
}

#[tokio::test]
async fn malformed_requests_are_rejected_up_front() {
    let f = fixture(quick_config());
    let (client, mut handle) = channel();

    let mut no_id = invoice_client_seven(&f.registry);
    no_id.transaction_id = Uuid::nil();
    let state = f.manager.process_transaction_request(&no_id, &client).await;
    assert_eq!(state, TransactionState::Failed(ErrorKind::InvalidArgument));

    let unknown = TransactionRequest::new(vec![RemoveRequest::new("ledger", KeyValue::int("Id", 1)).into()]);
    let state = f.manager.process_transaction_request(&unknown, &client).await;
    assert_eq!(state, TransactionState::Failed(ErrorKind::UnknownCollection));

    assert_eq!(handle.drain().len(), 2);
    assert!(f.log.entries().is_empty());
}

#[tokio::test]
async fn disjoint_transactions_do_not_block_each_other() {
    let f = fixture(quick_config());
    let holder = Uuid::new_v4();
    let _held = f.locks.try_acquire_write_lock(holder, Duration::from_millis(10), &["orders".to_string()]).await;
    assert!(_held.is_some());

    let (client, _handle) = channel();
    let request = TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice(&f.registry, 1, "INV-1", 1)]).into(),
    ])
    .single_stage();
    assert_eq!(f.manager.process_transaction_request(&request, &client).await, TransactionState::Committed);
}

#[tokio::test]
async fn wal_records_replay_into_a_fresh_registry() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config { storage_path: dir.path().to_path_buf(), ..quick_config() };
    let layout = StorageLayout::new(config.storage_path.clone()).unwrap();

    let registry = registry();
    let wal = Arc::new(WalTransactionLog::open(&layout, &config).unwrap());
    let log: Arc<dyn TransactionLog> = wal.clone();
    let manager = TransactionManager::new(config.clone(), registry.clone(), Arc::new(LockManager::new()), log);

    let (client, handle) = channel();
    assert!(handle.decide(true).await);
    assert!(handle.decide(true).await);
    let committed = invoice_client_seven(&registry);
    assert_eq!(manager.process_transaction_request(&committed, &client).await, TransactionState::Committed);

    assert!(handle.decide(true).await);
    assert!(handle.decide(false).await);
    let aborted = TransactionRequest::new(vec![RemoveRequest::new("orders", KeyValue::int("Id", 2)).into()]);
    assert_eq!(manager.process_transaction_request(&aborted, &client).await, TransactionState::RolledBack);

    let reopened = WalTransactionLog::open(&layout, &config).unwrap();
    let records = reopened.recoverable_transactions().unwrap();
    assert_eq!(records.len(), 1);

    let fresh = self::registry();
    for record in &records {
        replay(record, &fresh).unwrap();
    }
    assert_eq!(counts(&fresh), counts(&registry));
    assert_eq!(counts(&fresh), (1, 3));
}
