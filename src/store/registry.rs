use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::error::{Error, ErrorKind, Result};
use crate::schema::schema::CollectionSchema;
use crate::store::datastore::DataStore;

pub type SharedStore = Arc<RwLock<DataStore>>;

/// Every registered collection, by name
pub struct CollectionRegistry {
    collections: RwLock<HashMap<String, SharedStore>>,
    eviction_capacity: usize,
}

impl CollectionRegistry {
    pub fn new(eviction_capacity: usize) -> Self {
        CollectionRegistry {
            collections: RwLock::new(HashMap::new()),
            eviction_capacity,
        }
    }

    pub fn register(&self, schema: CollectionSchema) -> Result<SharedStore> {
        let mut collections = self.collections.write();
        if collections.contains_key(&schema.name) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Collection '{}' is already registered", schema.name),
            ));
        }

        let name = schema.name.clone();
        let store = Arc::new(RwLock::new(DataStore::new(schema, self.eviction_capacity)));
        collections.insert(name.clone(), store.clone());
        tracing::info!(collection = %name, "collection registered");
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<SharedStore> {
        self.collections.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<SharedStore> {
        self.get(name).ok_or_else(|| Error::unknown_collection(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}
