/// Orders and invoices walkthrough
///
/// - register two collections
/// - load orders, query them through indexes and full text
/// - pivot the amounts by town
/// - invoice a client in one two-stage transaction

use std::sync::Arc;
use packstore::core::config::Config;
use packstore::core::types::{KeyValue, KeyValueKind};
use packstore::executor::{PivotRequest, QueryManager};
use packstore::query::{AtomicQuery, OrQuery};
use packstore::schema::{CollectionSchema, PropertyDescription};
use packstore::store::{CollectionRegistry, DataManager};
use packstore::transaction::{
    channel, InMemoryTransactionLog, LockManager, PutRequest, RemoveManyRequest, Response, TransactionManager,
    TransactionRequest,
};
use tracing_subscriber::EnvFilter;

const ORDERS: [(i64, i64, &str, i64, &str); 6] = [
    (1, 7, "Paris", 120, "urgent delivery to the metro station"),
    (2, 8, "Lyon", 40, "gift wrap"),
    (3, 7, "Paris", 75, "metro entrance, ring twice"),
    (4, 9, "Nantes", 300, "bulk order"),
    (5, 7, "Lyon", 15, "late pickup"),
    (6, 8, "Paris", 60, "fragile"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::default();
    let registry = Arc::new(CollectionRegistry::new(config.eviction_capacity));

    println!("Registering collections...");
    registry.register(
        CollectionSchema::new("orders", PropertyDescription::primary("Id", KeyValueKind::Int))
            .with_property(PropertyDescription::dictionary("ClientId", KeyValueKind::Int))
            .with_property(PropertyDescription::dictionary("Town", KeyValueKind::Text))
            .with_property(PropertyDescription::ordered("Amount", KeyValueKind::Int))
            .with_property(PropertyDescription::plain("Note", KeyValueKind::Text))
            .with_full_text("Note")
            .build()?,
    )?;
    registry.register(
        CollectionSchema::new("invoices", PropertyDescription::primary("Id", KeyValueKind::Int))
            .with_property(PropertyDescription::dictionary("ClientId", KeyValueKind::Int))
            .with_property(PropertyDescription::plain("Total", KeyValueKind::Int))
            .build()?,
    )?;

    // Load
    let orders = registry.require("orders")?;
    let objects = {
        let store = orders.read();
        ORDERS
            .iter()
            .map(|&(id, client, town, amount, note)| {
                store
                    .schema()
                    .pack(KeyValue::int("Id", id))
                    .set(KeyValue::int("ClientId", client))
                    .set(KeyValue::text("Town", town))
                    .set(KeyValue::int("Amount", amount))
                    .set(KeyValue::text("Note", note))
                    .build()
            })
            .collect::<packstore::Result<Vec<_>>>()?
    };
    let stored = DataManager::new(&registry, &config).process_put(&PutRequest::new("orders", objects))?;
    println!("  stored {} orders\n", stored);

    // Query
    {
        let store = orders.read();
        let manager = QueryManager::new(&store, &config);

        let query = OrQuery::single(
            "orders",
            AtomicQuery::between(KeyValue::int("Amount", 50), KeyValue::int("Amount", 200)),
        )
        .order_by("Amount", true);
        let (found, plan) = manager.process_query_with_plan(&query)?;
        println!("Amount between 50 and 200, largest first ({:?}):", plan.ordering);
        for object in &found {
            println!("  order {}", object.primary_key);
        }

        let query = OrQuery::single("orders", AtomicQuery::eq(KeyValue::text("Town", "Paris"))).full_text("metro");
        let found = manager.process_query(&query)?;
        println!("\nParis orders mentioning the metro: {}", found.len());

        let pivot = manager.pivot(&PivotRequest::new(OrQuery::new("orders"), &["Town"], &["Amount"]))?;
        println!("\nAmount by town:");
        for town in &pivot.children {
            let total = town.aggregate("Amount").map_or(0.0, |a| a.sum());
            if let Some(name) = &town.axis_value {
                println!("  {:<8} {:>3} orders  {:>6}", name, town.count, total);
            }
        }
    }

    // Invoice client 7 and drop their orders atomically
    println!("\nTwo-stage transaction...");
    let invoice = registry
        .require("invoices")?
        .read()
        .schema()
        .pack(KeyValue::int("Id", 1))
        .set(KeyValue::int("ClientId", 7))
        .set(KeyValue::int("Total", 210))
        .build()?;
    let request = TransactionRequest::new(vec![
        PutRequest::new("invoices", vec![invoice]).into(),
        RemoveManyRequest::new(OrQuery::single("orders", AtomicQuery::eq(KeyValue::int("ClientId", 7)))).into(),
    ]);

    let transactions = TransactionManager::new(
        config.clone(),
        registry.clone(),
        Arc::new(LockManager::new()),
        Arc::new(InMemoryTransactionLog::new()),
    );
    let (client, mut handle) = channel();
    let driver = async {
        while let Some(response) = handle.next_response().await {
            println!("  <- {:?}", response);
            if response != Response::Ready || !handle.decide(true).await {
                break;
            }
        }
    };
    let (state, ()) = tokio::join!(transactions.process_transaction_request(&request, &client), driver);

    println!("  state: {:?}", state);
    println!("  orders left: {}", orders.read().len());
    println!("  invoices: {}", registry.require("invoices")?.read().len());
    Ok(())
}
