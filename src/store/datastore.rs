use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use roaring::RoaringBitmap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{AccessStats, AccessTracker};
use crate::core::types::{Handle, KeyValue, PackedObject};
use crate::index::{create_index, Index, UniqueIndex};
use crate::query::ast::QueryOperator;
use crate::schema::domain::DomainDescription;
use crate::schema::schema::{CollectionSchema, IndexType, Slot};
use crate::search::FullTextIndex;

/// Every value `object` carries for `property`: one for a scalar, all elements for a list
pub fn property_values(schema: &CollectionSchema, object: &PackedObject, property: &str) -> Vec<KeyValue> {
    match schema.slot(property) {
        Some(Slot::PrimaryKey) => vec![object.primary_key.clone()],
        Some(Slot::Scalar(i)) => vec![object.value(i).cloned().unwrap_or_else(|| KeyValue::null(property))],
        Some(Slot::List(i)) => object.list(i).map(|l| l.to_vec()).unwrap_or_default(),
        None => Vec::new(),
    }
}

/// One collection held in memory: the object arena and every structure indexing it
pub struct DataStore {
    schema: CollectionSchema,
    objects: Vec<Option<Arc<PackedObject>>>,
    free: Vec<Handle>,
    live: RoaringBitmap,
    primary: UniqueIndex,
    indexes: HashMap<String, Box<dyn Index>>,
    full_text: FullTextIndex,
    domain: Option<DomainDescription>,
    access: AccessTracker,
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("schema", &self.schema.name)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl DataStore {
    pub fn new(schema: CollectionSchema, eviction_capacity: usize) -> Self {
        let indexes = schema
            .indexed_properties()
            .filter_map(|p| p.index.map(|t| (p.name.clone(), create_index(&p.name, t))))
            .collect();

        DataStore {
            primary: UniqueIndex::new(&schema.primary_key.name, IndexType::Primary),
            schema,
            objects: Vec::new(),
            free: Vec::new(),
            live: RoaringBitmap::new(),
            indexes,
            full_text: FullTextIndex::new(),
            domain: None,
            access: AccessTracker::new(eviction_capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.live.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Handles of every stored object
    pub fn all_handles(&self) -> &RoaringBitmap {
        &self.live
    }

    pub fn get(&self, handle: Handle) -> Option<&Arc<PackedObject>> {
        self.objects.get(handle as usize).and_then(|slot| slot.as_ref())
    }

    pub fn handle_of(&self, primary_key: &KeyValue) -> Option<Handle> {
        self.primary.get(primary_key)
    }

    pub fn get_by_primary_key(&self, primary_key: &KeyValue) -> Option<&Arc<PackedObject>> {
        self.handle_of(primary_key).and_then(|h| self.get(h))
    }

    pub fn primary_index(&self) -> &dyn Index {
        &self.primary
    }

    pub fn try_get_index(&self, property: &str) -> Option<&dyn Index> {
        if property == self.schema.primary_key.name {
            return Some(&self.primary);
        }
        self.indexes.get(property).map(|index| index.as_ref())
    }

    pub fn full_text(&self) -> &FullTextIndex {
        &self.full_text
    }

    pub fn domain(&self) -> Option<&DomainDescription> {
        self.domain.as_ref()
    }

    pub fn set_domain(&mut self, domain: DomainDescription) {
        self.domain = Some(domain);
    }

    pub fn touch(&self, object: &PackedObject) {
        self.access.touch(&object.primary_key);
    }

    pub fn touch_many<'a>(&self, objects: impl IntoIterator<Item = &'a Arc<PackedObject>>) {
        self.access.touch_many(objects.into_iter().map(|o| &o.primary_key));
    }

    pub fn increment_read_count(&self) {
        self.access.increment_read_count();
    }

    pub fn increment_hit_count(&self) {
        self.access.increment_hit_count();
    }

    pub fn access_stats(&self) -> AccessStats {
        self.access.snapshot()
    }

    fn validate_layout(&self, object: &PackedObject) -> Result<()> {
        if object.collection != self.schema.name {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Object of '{}' put into '{}'", object.collection, self.schema.name),
            ));
        }
        if object.values.len() != self.schema.scalar_properties().count()
            || object.collection_values.len() != self.schema.list_properties().count()
        {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Object {} does not match the layout of '{}'", object.primary_key, self.schema.name),
            ));
        }
        if object.primary_key.is_null() {
            return Err(Error::new(ErrorKind::InvalidArgument, "Null primary key".to_string()));
        }
        Ok(())
    }

    fn unique_indexes(&self) -> impl Iterator<Item = (&String, &dyn Index)> {
        self.indexes
            .iter()
            .filter(|(_, index)| index.index_type() == IndexType::Unique)
            .map(|(name, index)| (name, index.as_ref()))
    }

    fn validate(&self, object: &PackedObject, handle: Option<Handle>) -> Result<()> {
        self.validate_layout(object)?;
        for (name, index) in self.unique_indexes() {
            for value in property_values(&self.schema, object, name).iter().filter(|v| !v.is_null()) {
                let owners = index.get_many(&[value], QueryOperator::Eq);
                if owners.iter().any(|owner| Some(owner) != handle) {
                    return Err(unique_violation(name, value));
                }
            }
        }
        Ok(())
    }

    fn index_object(&mut self, handle: Handle, object: &PackedObject) {
        self.primary.put(handle, std::slice::from_ref(&object.primary_key));
        for (name, index) in self.indexes.iter_mut() {
            index.put(handle, &property_values(&self.schema, object, name));
        }
        if !object.full_text.is_empty() {
            self.full_text.put(handle, &object.full_text);
        }
        self.live.insert(handle);
    }

    fn unindex_object(&mut self, handle: Handle, object: &PackedObject) {
        self.primary.remove(handle, std::slice::from_ref(&object.primary_key));
        for (name, index) in self.indexes.iter_mut() {
            index.remove(handle, &property_values(&self.schema, object, name));
        }
        self.full_text.remove(handle);
        self.live.remove(handle);
    }

    fn allocate(&mut self) -> Handle {
        match self.free.pop() {
            Some(handle) => handle,
            None => {
                self.objects.push(None);
                (self.objects.len() - 1) as Handle
            }
        }
    }

    /// Insert an object whose primary key is not stored yet
    pub fn internal_add_new(&mut self, object: PackedObject) -> Result<Handle> {
        if self.handle_of(&object.primary_key).is_some() {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("Object {} already exists in '{}'", object.primary_key, self.schema.name),
            ));
        }
        self.validate(&object, None)?;

        let handle = self.allocate();
        self.index_object(handle, &object);
        self.access.touch(&object.primary_key);
        self.objects[handle as usize] = Some(Arc::new(object));
        Ok(handle)
    }

    /// Replace a stored object, keeping its handle
    pub fn internal_update(&mut self, object: PackedObject) -> Result<Handle> {
        let Some(handle) = self.handle_of(&object.primary_key) else {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("Object {} not found in '{}'", object.primary_key, self.schema.name),
            ));
        };
        self.validate(&object, Some(handle))?;

        if let Some(previous) = self.objects[handle as usize].take() {
            self.unindex_object(handle, &previous);
        }
        self.index_object(handle, &object);
        self.access.touch(&object.primary_key);
        self.objects[handle as usize] = Some(Arc::new(object));
        Ok(handle)
    }

    /// Check a batch against the layout and the unique constraints without storing anything
    pub fn validate_many(&self, objects: &[PackedObject]) -> Result<()> {
        self.validate_changes(objects, &[])
    }

    /// Check the state left once `removed` are deleted and `puts` stored.
    ///
    /// A unique value may be held by a stored object only if the batch replaces or removes it,
    /// and by one primary key of the batch. For a key put twice the last version counts.
    pub fn validate_changes(&self, puts: &[PackedObject], removed: &[KeyValue]) -> Result<()> {
        for object in puts {
            self.validate_layout(object)?;
        }

        let released: HashSet<Handle> = puts
            .iter()
            .map(|o| &o.primary_key)
            .chain(removed)
            .filter_map(|pk| self.handle_of(pk))
            .collect();
        let mut claimed: HashMap<(&str, KeyValue), &KeyValue> = HashMap::new();

        for object in final_versions(puts) {
            for (name, index) in self.unique_indexes() {
                for value in property_values(&self.schema, object, name).into_iter().filter(|v| !v.is_null()) {
                    let owners = index.get_many(&[&value], QueryOperator::Eq);
                    if owners.iter().any(|owner| !released.contains(&owner)) {
                        return Err(unique_violation(name, &value));
                    }
                    if let Some(other) = claimed.insert((name.as_str(), value.clone()), &object.primary_key) {
                        if *other != object.primary_key {
                            return Err(unique_violation(name, &value));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Insert or replace every object; returns how many were stored.
    ///
    /// The batch is validated as a whole, then every replaced version is unindexed before
    /// any new version is indexed, so values may move between objects of one batch.
    pub fn internal_put_many(&mut self, objects: Vec<PackedObject>) -> Result<usize> {
        self.validate_many(&objects)?;
        let count = objects.len();

        let mut latest: HashMap<KeyValue, PackedObject> = HashMap::new();
        let mut order = Vec::new();
        for object in objects {
            if !latest.contains_key(&object.primary_key) {
                order.push(object.primary_key.clone());
            }
            latest.insert(object.primary_key.clone(), object);
        }

        let mut slots = Vec::with_capacity(order.len());
        for pk in &order {
            let handle = self.handle_of(pk);
            if let Some(h) = handle {
                if let Some(previous) = self.objects[h as usize].take() {
                    self.unindex_object(h, &previous);
                }
            }
            slots.push(handle);
        }

        for (pk, handle) in order.into_iter().zip(slots) {
            let Some(object) = latest.remove(&pk) else {
                continue;
            };
            let handle = handle.unwrap_or_else(|| self.allocate());
            self.index_object(handle, &object);
            self.access.touch(&object.primary_key);
            self.objects[handle as usize] = Some(Arc::new(object));
        }
        Ok(count)
    }

    pub fn remove_by_primary_key(&mut self, primary_key: &KeyValue) -> Option<Arc<PackedObject>> {
        let handle = self.handle_of(primary_key)?;
        self.remove_handle(handle)
    }

    fn remove_handle(&mut self, handle: Handle) -> Option<Arc<PackedObject>> {
        let object = self.objects.get_mut(handle as usize)?.take()?;
        self.unindex_object(handle, &object);
        self.access.forget(&object.primary_key);
        self.free.push(handle);
        Some(object)
    }

    /// Remove every object in `handles`; returns how many existed
    pub fn remove_many(&mut self, handles: &RoaringBitmap) -> usize {
        handles.iter().filter(|h| self.remove_handle(*h).is_some()).count()
    }

    pub fn truncate(&mut self) -> usize {
        let removed = self.len();
        self.objects.clear();
        self.free.clear();
        self.live.clear();
        self.primary.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
        self.full_text.clear();
        self.access.clear();
        removed
    }

    /// Drop the least recently used objects beyond the eviction capacity.
    ///
    /// Eviction invalidates any declared domain: the collection no longer holds all of it.
    pub fn process_eviction(&mut self) -> Vec<KeyValue> {
        let victims: Vec<KeyValue> = self
            .access
            .eviction_candidates()
            .into_iter()
            .filter(|pk| self.remove_by_primary_key(pk).is_some())
            .collect();

        if !victims.is_empty() {
            self.domain = None;
            tracing::debug!(collection = %self.schema.name, evicted = victims.len(), "eviction");
        }
        victims
    }
}

fn unique_violation(property: &str, value: &KeyValue) -> Error {
    Error::new(
        ErrorKind::InvalidArgument,
        format!("Unique constraint on '{}' violated by {}", property, value),
    )
}

/// The last version of every primary key in `objects`
fn final_versions(objects: &[PackedObject]) -> Vec<&PackedObject> {
    let mut seen = HashSet::new();
    let mut finals: Vec<&PackedObject> = objects.iter().rev().filter(|o| seen.insert(&o.primary_key)).collect();
    finals.reverse();
    finals
}
