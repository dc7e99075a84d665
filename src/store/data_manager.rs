use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{KeyValue, PackedObject};
use crate::executor::query_manager::QueryManager;
use crate::query::matcher::ObjectMatcher;
use crate::schema::schema::CollectionSchema;
use crate::store::datastore::DataStore;
use crate::store::registry::CollectionRegistry;
use crate::transaction::request::{DataRequest, PutRequest, RemoveManyRequest, RemoveRequest};
use crate::transaction::response::Response;

/// Fail unless every item of a conditional put is stored and its stored version matches the predicate
pub fn check_put_condition(store: &DataStore, request: &PutRequest) -> Result<()> {
    check_put_condition_with(store.schema(), request, |pk| store.get_by_primary_key(pk).map(|o| o.as_ref()))
}

/// Same check, with `current` giving the version each primary key holds at this point
pub fn check_put_condition_with<'s>(
    schema: &CollectionSchema,
    request: &PutRequest,
    current: impl Fn(&KeyValue) -> Option<&'s PackedObject>,
) -> Result<()> {
    let Some(predicate) = &request.predicate else {
        return Ok(());
    };

    let matcher = ObjectMatcher::new(schema);
    for item in &request.items {
        let Some(stored) = current(&item.primary_key) else {
            return Err(Error::condition_not_satisfied(format!(
                "Conditional put: {} not found in '{}'",
                item.primary_key, request.collection
            )));
        };
        if !matcher.matches(stored, predicate) {
            return Err(Error::condition_not_satisfied(format!(
                "Conditional put: {} does not satisfy {}",
                item.primary_key, predicate
            )));
        }
    }
    Ok(())
}

/// Items a put will actually write: `only_if_new` skips the ones already stored
pub fn items_to_store(store: &DataStore, request: &PutRequest) -> Vec<PackedObject> {
    request
        .items
        .iter()
        .filter(|item| !request.only_if_new || store.handle_of(&item.primary_key).is_none())
        .cloned()
        .collect()
}

/// Put and delete managers over the registered collections
pub struct DataManager<'a> {
    registry: &'a CollectionRegistry,
    config: &'a Config,
}

impl<'a> DataManager<'a> {
    pub fn new(registry: &'a CollectionRegistry, config: &'a Config) -> Self {
        DataManager { registry, config }
    }

    /// Returns how many objects were written
    pub fn process_put(&self, request: &PutRequest) -> Result<usize> {
        let shared = self.registry.require(&request.collection)?;
        let mut store = shared.write();
        check_put_condition(&store, request)?;
        self.put(&mut store, request)
    }

    /// Returns whether the object existed
    pub fn process_remove(&self, request: &RemoveRequest) -> Result<bool> {
        let shared = self.registry.require(&request.collection)?;
        let removed = shared.write().remove_by_primary_key(&request.primary_key).is_some();
        tracing::debug!(collection = %request.collection, key = %request.primary_key, removed, "remove");
        Ok(removed)
    }

    /// Returns how many objects were removed
    pub fn process_remove_many(&self, request: &RemoveManyRequest) -> Result<usize> {
        let shared = self.registry.require(&request.query.collection)?;
        let mut store = shared.write();
        let handles = QueryManager::new(&store, self.config).select_handles(&request.query)?;
        let removed = store.remove_many(&handles);
        tracing::debug!(collection = %request.query.collection, removed, "remove many");
        Ok(removed)
    }

    /// Request boundary for non-transactional writes
    pub fn handle(&self, request: &DataRequest) -> Response {
        let response = match request {
            DataRequest::Put(put) => self.process_put(put).map(Response::ItemsCount),
            DataRequest::Remove(remove) => self.process_remove(remove).map(|_| Response::Null),
            DataRequest::RemoveMany(remove) => self.process_remove_many(remove).map(Response::ItemsCount),
        };
        response.unwrap_or_else(|err| {
            tracing::warn!(collection = %request.collection(), error = %err, "write failed");
            Response::from(err)
        })
    }

    fn put(&self, store: &mut DataStore, request: &PutRequest) -> Result<usize> {
        let items = items_to_store(store, request);
        let skipped = request.items.len() - items.len();
        let stored = store.internal_put_many(items)?;

        let evicted = store.process_eviction().len();
        tracing::debug!(collection = %request.collection, stored, skipped, evicted, "put");
        Ok(stored)
    }
}
