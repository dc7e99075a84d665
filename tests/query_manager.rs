use std::collections::BTreeSet;
use std::sync::Arc;
use packstore::core::config::Config;
use packstore::core::error::ErrorKind;
use packstore::core::types::{KeyValue, KeyValueKind, PackedObject};
use packstore::executor::{ActivityLog, PivotRequest, QueryManager, QueryRequest, ACTIVITY_COLLECTION};
use packstore::query::{AndQuery, AtomicQuery, OrQuery, OrderingStrategy, Strategy};
use packstore::schema::{CollectionSchema, DomainDescription, IndexType, PropertyDescription};
use packstore::store::DataStore;
use packstore::transaction::{EvalResponse, Response};

struct Order<'a> {
    id: i64,
    amount: i64,
    town: &'a str,
    client: i64,
    region: i64,
    tags: &'a [&'a str],
    note: &'a str,
}

fn schema() -> CollectionSchema {
    CollectionSchema::new("orders", PropertyDescription::primary("Id", KeyValueKind::Int))
        .with_property(PropertyDescription::ordered("Amount", KeyValueKind::Int))
        .with_property(PropertyDescription::dictionary("Town", KeyValueKind::Text))
        .with_property(PropertyDescription::dictionary("ClientId", KeyValueKind::Int))
        .with_property(PropertyDescription::dictionary("Region", KeyValueKind::Int))
        .with_property(PropertyDescription::plain("Note", KeyValueKind::Text))
        .with_property(PropertyDescription::list("Tags", KeyValueKind::Text, Some(IndexType::Dictionary)))
        .with_full_text("Note")
        .build()
        .unwrap()
}

fn store(orders: &[Order]) -> DataStore {
    let mut store = DataStore::new(schema(), 0);
    let objects = orders
        .iter()
        .map(|o| {
            store
                .schema()
                .pack(KeyValue::int("Id", o.id))
                .set(KeyValue::int("Amount", o.amount))
                .set(KeyValue::text("Town", o.town))
                .set(KeyValue::int("ClientId", o.client))
                .set(KeyValue::int("Region", o.region))
                .set(KeyValue::text("Note", o.note))
                .set_list("Tags", o.tags.iter().map(|t| KeyValue::text("Tags", t)).collect())
                .build()
                .unwrap()
        })
        .collect();
    store.internal_put_many(objects).unwrap();
    store
}

fn order<'a>(id: i64, amount: i64, town: &'a str, note: &'a str) -> Order<'a> {
    Order { id, amount, town, client: id % 3, region: 0, tags: &[], note }
}

/// Amounts 5, 10, 25, 50, 60
fn five_orders() -> DataStore {
    store(&[
        order(1, 5, "Paris", "near the metro"),
        order(2, 10, "Paris", "metro metro metro"),
        order(3, 25, "Lyon", "metro metro"),
        order(4, 50, "Paris", "by bus"),
        order(5, 60, "Nice", "on foot"),
    ])
}

/// Forty orders: Town is Nice for 0 and 20, ClientId = i % 8, Region = i % 4
fn forty_orders() -> DataStore {
    let orders: Vec<Order> = (0..40)
        .map(|i| Order {
            id: i,
            amount: i * 3,
            town: if i % 20 == 0 { "Nice" } else { "Paris" },
            client: i % 8,
            region: i % 4,
            tags: if i % 2 == 0 { &["even"] } else { &["odd", "prime-ish"] },
            note: "",
        })
        .collect();
    store(&orders)
}

fn ids(objects: &[Arc<PackedObject>]) -> Vec<i64> {
    objects.iter().filter_map(|o| o.primary_key.as_i64()).collect()
}

fn id_set(objects: &[Arc<PackedObject>]) -> BTreeSet<i64> {
    ids(objects).into_iter().collect()
}

fn amount_range() -> AndQuery {
    AndQuery::new()
        .and(AtomicQuery::ge(KeyValue::int("Amount", 10)))
        .and(AtomicQuery::le(KeyValue::int("Amount", 50)))
}

#[test]
fn range_pair_becomes_one_index_lookup() {
    let store = five_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    let (objects, plan) = manager
        .process_query_with_plan(&OrQuery::new("orders").or(amount_range()))
        .unwrap();
    assert_eq!(id_set(&objects), BTreeSet::from([2, 3, 4]));
    assert_eq!(plan.strategy, Strategy::SingleIndex);
    assert_eq!(plan.indexes.len(), 1);
    assert_eq!(plan.indexes[0].predicate, "10 <= Amount <= 50");
    assert_eq!(plan.residual_predicates, 0);
}

#[test]
fn range_ordered_descending_with_take() {
    let store = five_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    let query = OrQuery::new("orders").or(amount_range()).order_by("Amount", true).take(2);
    let objects = manager.process_query(&query).unwrap();
    let amounts: Vec<i64> = objects.iter().filter_map(|o| o.value(0).and_then(|v| v.as_i64())).collect();
    assert_eq!(amounts, vec![50, 25]);
}

#[test]
fn mixed_query_keeps_full_text_rank_and_ignores_order_by() {
    let store = five_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    let query = OrQuery::single("orders", AtomicQuery::eq(KeyValue::text("Town", "Paris")))
        .full_text("metro")
        .order_by("Amount", false);
    let (objects, plan) = manager.process_query_with_plan(&query).unwrap();

    // 3 mentions metro but lives in Lyon; 4 is in Paris without metro
    assert_eq!(ids(&objects), vec![2, 1]);
    assert_eq!(plan.strategy, Strategy::Mixed);
    assert_eq!(plan.ordering, OrderingStrategy::None);
}

#[test]
fn most_selective_index_goes_first() {
    let store = forty_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    // Town = Nice matches 2, ClientId = 0 matches 5: within 4x, both are used
    let query = OrQuery::new("orders").or(AndQuery::new()
        .and(AtomicQuery::eq(KeyValue::int("ClientId", 0)))
        .and(AtomicQuery::eq(KeyValue::text("Town", "Nice"))));
    let (objects, plan) = manager.process_query_with_plan(&query).unwrap();
    assert_eq!(ids(&objects), vec![0]);
    assert_eq!(plan.strategy, Strategy::Intersection);
    let used: Vec<(&str, usize)> = plan.indexes.iter().map(|i| (i.property.as_str(), i.count)).collect();
    assert_eq!(used, vec![("Town", 2), ("ClientId", 5)]);

    // Region = 0 matches 10, more than 4x: only Town is used, Region is matched
    let query = OrQuery::new("orders").or(AndQuery::new()
        .and(AtomicQuery::eq(KeyValue::int("Region", 0)))
        .and(AtomicQuery::eq(KeyValue::text("Town", "Nice"))));
    let (objects, plan) = manager.process_query_with_plan(&query).unwrap();
    assert_eq!(id_set(&objects), BTreeSet::from([0, 20]));
    assert_eq!(plan.strategy, Strategy::SingleIndex);
    assert_eq!(plan.indexes[0].property, "Town");
    assert_eq!(plan.residual_predicates, 1);
}

#[test]
fn pruning_factor_is_tunable() {
    let store = forty_orders();
    let config = Config { index_pruning_factor: 5, ..Config::default() };
    let manager = QueryManager::new(&store, &config);

    let query = OrQuery::new("orders").or(AndQuery::new()
        .and(AtomicQuery::eq(KeyValue::int("Region", 0)))
        .and(AtomicQuery::eq(KeyValue::text("Town", "Nice"))));
    let (objects, plan) = manager.process_query_with_plan(&query).unwrap();
    assert_eq!(id_set(&objects), BTreeSet::from([0, 20]));
    assert_eq!(plan.strategy, Strategy::Intersection);
}

#[test]
fn or_branches_union_without_duplicates() {
    let store = forty_orders();
    let low = AndQuery::new().and(AtomicQuery::lt(KeyValue::int("Amount", 30)));
    let nice = AndQuery::new().and(AtomicQuery::eq(KeyValue::text("Town", "Nice")));
    let odd = AndQuery::new().and(AtomicQuery::contains(KeyValue::text("Tags", "odd")));

    for parallel in [true, false] {
        let config = Config { parallel_or_branches: parallel, ..Config::default() };
        let manager = QueryManager::new(&store, &config);

        let mut expected = BTreeSet::new();
        for branch in [&low, &nice, &odd] {
            let objects = manager.process_query(&OrQuery::new("orders").or(branch.clone())).unwrap();
            expected.extend(ids(&objects));
        }

        let query = OrQuery::new("orders").or(low.clone()).or(nice.clone()).or(odd.clone());
        let (objects, plan) = manager.process_query_with_plan(&query).unwrap();
        assert_eq!(objects.len(), expected.len());
        assert_eq!(id_set(&objects), expected);
        assert_eq!(plan.strategy, Strategy::Union);
        assert_eq!(plan.branches.len(), 3);
    }
}

#[test]
fn union_is_ordered_after_merging() {
    let store = forty_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    let query = OrQuery::new("orders")
        .or(AndQuery::new().and(AtomicQuery::eq(KeyValue::int("Id", 7))))
        .or(AndQuery::new().and(AtomicQuery::eq(KeyValue::text("Town", "Nice"))))
        .order_by("Amount", true);
    let (objects, plan) = manager.process_query_with_plan(&query).unwrap();
    assert_eq!(ids(&objects), vec![20, 7, 0]);
    assert_eq!(plan.ordering, OrderingStrategy::InMemorySort);
}

#[test]
fn distinct_then_skip_then_take() {
    let store = forty_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    let query = OrQuery::single("orders", AtomicQuery::lt(KeyValue::int("Amount", 60)))
        .order_by("Amount", false)
        .distinct(&["Region"]);
    let objects = manager.process_query(&query).unwrap();
    assert_eq!(ids(&objects), vec![0, 1, 2, 3]);

    let objects = manager.process_query(&query.clone().skip(1).take(2)).unwrap();
    assert_eq!(ids(&objects), vec![1, 2]);
}

#[test]
fn only_if_complete_needs_a_covering_domain() {
    let mut store = five_orders();
    let config = Config::default();
    let inside = OrQuery::single("orders", AtomicQuery::ge(KeyValue::int("Amount", 20))).only_if_complete();
    let outside = OrQuery::single("orders", AtomicQuery::eq(KeyValue::text("Town", "Paris"))).only_if_complete();

    let err = QueryManager::new(&store, &config).process_query(&inside).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DomainNotComplete);

    store.set_domain(DomainDescription::partial(OrQuery::single(
        "orders",
        AtomicQuery::ge(KeyValue::int("Amount", 10)),
    )));
    let manager = QueryManager::new(&store, &config);
    assert_eq!(id_set(&manager.process_query(&inside).unwrap()), BTreeSet::from([3, 4, 5]));
    assert_eq!(manager.process_query(&outside).unwrap_err().kind, ErrorKind::DomainNotComplete);

    store.set_domain(DomainDescription::complete("orders"));
    let manager = QueryManager::new(&store, &config);
    assert_eq!(manager.process_query(&outside).unwrap().len(), 3);
}

#[test]
fn planner_errors_surface_as_exceptions() {
    let store = five_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    let by_town = OrQuery::new("orders").order_by("Town", false);
    assert_eq!(manager.handle(&QueryRequest::Get(by_town)).exception_kind(), Some(ErrorKind::InvalidOrderBy));

    let two_equalities = OrQuery::new("orders").or(AndQuery::new()
        .and(AtomicQuery::eq(KeyValue::int("Amount", 10)))
        .and(AtomicQuery::eq(KeyValue::int("Amount", 25))));
    let response = manager.handle(&QueryRequest::Get(two_equalities));
    assert_eq!(response.exception_kind(), Some(ErrorKind::InconsistentQuery));
}

#[test]
fn list_properties_are_searchable() {
    let store = forty_orders();
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);

    let query = OrQuery::single("orders", AtomicQuery::contains(KeyValue::text("Tags", "even")));
    let (objects, plan) = manager.process_query_with_plan(&query).unwrap();
    assert_eq!(objects.len(), 20);
    assert_eq!(plan.strategy, Strategy::SingleIndex);

    let query = OrQuery::single(
        "orders",
        AtomicQuery::set("Tags", vec![KeyValue::text("Tags", "even")], packstore::query::QueryOperator::NotIn).unwrap(),
    );
    assert!(manager.process_query(&query).unwrap().iter().all(|o| o.primary_key.as_i64().is_some_and(|id| id % 2 == 1)));
}

#[test]
fn eval_and_count_requests() {
    let mut store = five_orders();
    store.set_domain(DomainDescription::complete("orders"));
    let config = Config::default();
    let manager = QueryManager::new(&store, &config);
    let paris = OrQuery::single("orders", AtomicQuery::eq(KeyValue::text("Town", "Paris")));

    assert_eq!(
        manager.handle(&QueryRequest::Eval(paris.clone())),
        Response::Eval(EvalResponse { count: 3, complete: true })
    );
    assert_eq!(manager.handle(&QueryRequest::Get(paris.count_only())), Response::ItemsCount(3));
}

#[test]
fn pivot_groups_and_sums() {
    let store = five_orders();
    let config = Config { pivot_shards: 3, ..Config::default() };
    let manager = QueryManager::new(&store, &config);

    let request = PivotRequest::new(OrQuery::new("orders"), &["Town"], &["Amount"]);
    let Response::Pivot(root) = manager.handle(&QueryRequest::Pivot(request)) else {
        panic!("expected a pivot response");
    };
    root.check_pivot().unwrap();
    assert_eq!(root.count, 5);
    assert_eq!(root.aggregate("Amount").unwrap().sum(), 150.0);

    let paris = root.child(&KeyValue::text("Town", "Paris")).unwrap();
    assert_eq!(paris.count, 3);
    assert_eq!(paris.aggregate("Amount").unwrap().sum(), 65.0);

    let bad = PivotRequest::new(OrQuery::new("orders"), &["Colour"], &["Amount"]);
    assert!(manager.handle(&QueryRequest::Pivot(bad)).is_exception());
}

#[test]
fn activity_log_and_access_counters() {
    let store = five_orders();
    let config = Config::default();
    let activity = ActivityLog::new(10);
    let manager = QueryManager::new(&store, &config).with_activity_log(&activity);

    manager.process_query(&OrQuery::single("orders", AtomicQuery::eq(KeyValue::int("Id", 3)))).unwrap();
    manager.process_query(&OrQuery::single("orders", AtomicQuery::eq(KeyValue::int("Id", 99)))).unwrap();

    let entries = activity.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].query, "orders: Id = 3");
    assert!(entries[0].plan.starts_with("PrimaryKey"));
    assert!(entries.iter().all(|e| e.collection != ACTIVITY_COLLECTION));

    let stats = store.access_stats();
    assert_eq!(stats.read_count, 2);
    assert_eq!(stats.hit_count, 1);
}
