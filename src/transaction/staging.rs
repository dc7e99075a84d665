use std::collections::HashMap;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::{KeyValue, PackedObject};
use crate::executor::query_manager::QueryManager;
use crate::query::matcher::ObjectMatcher;
use crate::store::data_manager::check_put_condition_with;
use crate::store::datastore::DataStore;
use crate::store::registry::CollectionRegistry;
use crate::transaction::request::{DataRequest, DurableTransaction, PutRequest, RemoveManyRequest, TransactionRequest};

/// Writes of one collection not applied yet: the last version of each primary key, `None` once removed
#[derive(Default)]
struct PendingWrites {
    order: Vec<KeyValue>,
    latest: HashMap<KeyValue, Option<PackedObject>>,
}

impl PendingWrites {
    fn write(&mut self, primary_key: KeyValue, object: Option<PackedObject>) {
        if !self.latest.contains_key(&primary_key) {
            self.order.push(primary_key.clone());
        }
        self.latest.insert(primary_key, object);
    }

    fn current<'s>(&'s self, store: &'s DataStore, primary_key: &KeyValue) -> Option<&'s PackedObject> {
        match self.latest.get(primary_key) {
            Some(pending) => pending.as_ref(),
            None => store.get_by_primary_key(primary_key).map(|o| o.as_ref()),
        }
    }

    fn put(&mut self, store: &DataStore, request: &PutRequest) -> Result<()> {
        check_put_condition_with(store.schema(), request, |pk| self.current(store, pk))?;
        let items: Vec<PackedObject> = request
            .items
            .iter()
            .filter(|item| !request.only_if_new || self.current(store, &item.primary_key).is_none())
            .cloned()
            .collect();
        for item in items {
            self.write(item.primary_key.clone(), Some(item));
        }
        Ok(())
    }

    /// Stored matches the batch has not rewritten, plus pending versions that match
    fn remove_many(&mut self, store: &DataStore, config: &Config, request: &RemoveManyRequest) -> Result<()> {
        let stored = QueryManager::new(store, config).process_query(&request.query)?;
        let matcher = ObjectMatcher::new(store.schema());

        let mut removed: Vec<KeyValue> = stored
            .iter()
            .map(|o| &o.primary_key)
            .filter(|pk| !self.latest.contains_key(*pk))
            .cloned()
            .collect();
        removed.extend(self.latest.iter().filter_map(|(pk, pending)| {
            pending
                .as_ref()
                .filter(|object| matcher.matches(object, &request.query))
                .map(|_| pk.clone())
        }));

        for pk in removed {
            self.write(pk, None);
        }
        Ok(())
    }

    /// Net effect on the store, checked against the state it leaves behind
    fn settle(self, store: &DataStore, record: &mut DurableTransaction) -> Result<()> {
        let mut puts = Vec::new();
        let mut removed = Vec::new();
        let mut latest = self.latest;
        for pk in self.order {
            match latest.remove(&pk).flatten() {
                Some(object) => puts.push(object),
                None => {
                    if let Some(stored) = store.get_by_primary_key(&pk) {
                        record.items_to_delete.push(stored.as_ref().clone());
                        removed.push(pk);
                    }
                }
            }
        }

        store.validate_changes(&puts, &removed)?;
        record.items_to_put.extend(puts);
        Ok(())
    }
}

/// Run the children of `request` in order against pending state and return what the
/// transaction does to the stores: every object to delete and every final version to put.
///
/// Conditions, `only_if_new` and unique constraints are all decided here, so applying the
/// returned record cannot fail on them. Callers hold the write lock on every collection involved.
pub fn stage_transaction(
    registry: &CollectionRegistry,
    config: &Config,
    request: &TransactionRequest,
) -> Result<DurableTransaction> {
    let mut pending: Vec<(String, PendingWrites)> = Vec::new();

    for child in &request.child_requests {
        let name = child.collection();
        let shared = registry.require(name)?;
        let store = shared.read();

        let slot = match pending.iter().position(|(n, _)| n == name) {
            Some(slot) => slot,
            None => {
                pending.push((name.to_string(), PendingWrites::default()));
                pending.len() - 1
            }
        };
        let writes = &mut pending[slot].1;

        match child {
            DataRequest::Put(put) => writes.put(&store, put)?,
            DataRequest::Remove(remove) => writes.write(remove.primary_key.clone(), None),
            DataRequest::RemoveMany(remove) => writes.remove_many(&store, config, remove)?,
        }
    }

    let mut record = DurableTransaction::new(request.transaction_id);
    for (name, writes) in pending {
        let shared = registry.require(&name)?;
        let store = shared.read();
        writes.settle(&store, &mut record)?;
    }
    Ok(record)
}

/// Apply a staged record to the stores: deletions first, then puts.
///
/// Used both to commit a transaction in memory and to re-apply logged records after a restart,
/// so the two always reach the same state.
pub fn replay(record: &DurableTransaction, registry: &CollectionRegistry) -> Result<()> {
    for object in &record.items_to_delete {
        let shared = registry.require(&object.collection)?;
        shared.write().remove_by_primary_key(&object.primary_key);
    }

    let mut collections: Vec<&str> = record.items_to_put.iter().map(|o| o.collection.as_str()).collect();
    collections.sort_unstable();
    collections.dedup();
    for collection in collections {
        let items = record
            .items_to_put
            .iter()
            .filter(|o| o.collection == collection)
            .cloned()
            .collect();
        let shared = registry.require(collection)?;
        let mut store = shared.write();
        store.internal_put_many(items)?;
        store.process_eviction();
    }
    tracing::debug!(
        transaction = %record.transaction_id,
        puts = record.items_to_put.len(),
        deletes = record.items_to_delete.len(),
        "transaction applied"
    );
    Ok(())
}
