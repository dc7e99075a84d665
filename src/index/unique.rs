use std::collections::HashMap;
use roaring::RoaringBitmap;
use crate::core::types::{Handle, KeyValue};
use crate::index::Index;
use crate::query::ast::QueryOperator;
use crate::schema::schema::IndexType;

/// One handle per value. Serves both the primary key and unique properties.
///
/// Null values are not indexed, so any number of objects may leave a unique property unset.
pub struct UniqueIndex {
    name: String,
    index_type: IndexType,
    entries: HashMap<KeyValue, Handle>,
}

impl UniqueIndex {
    pub fn new(name: &str, index_type: IndexType) -> Self {
        UniqueIndex {
            name: name.to_string(),
            index_type,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, value: &KeyValue) -> Option<Handle> {
        self.entries.get(value).copied()
    }

    /// Handle already owning `value`, if it is not `handle`
    pub fn conflict(&self, value: &KeyValue, handle: Option<Handle>) -> Option<Handle> {
        self.get(value).filter(|owner| Some(*owner) != handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Index for UniqueIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_type(&self) -> IndexType {
        self.index_type
    }

    fn supports(&self, operator: QueryOperator) -> bool {
        matches!(operator, QueryOperator::Eq | QueryOperator::In)
    }

    fn count(&self, values: &[&KeyValue], operator: QueryOperator) -> usize {
        if !self.supports(operator) {
            return 0;
        }
        values.iter().filter(|v| self.entries.contains_key(**v)).count()
    }

    fn get_many(&self, values: &[&KeyValue], operator: QueryOperator) -> RoaringBitmap {
        if !self.supports(operator) {
            return RoaringBitmap::new();
        }
        values.iter().filter_map(|v| self.get(v)).collect()
    }

    fn get_all(&self, _descending: bool) -> Vec<Handle> {
        self.entries.values().copied().collect()
    }

    fn put(&mut self, handle: Handle, values: &[KeyValue]) {
        for value in values.iter().filter(|v| !v.is_null()) {
            self.entries.insert(value.clone(), handle);
        }
    }

    fn remove(&mut self, handle: Handle, values: &[KeyValue]) {
        for value in values {
            if self.entries.get(value) == Some(&handle) {
                self.entries.remove(value);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
