use std::collections::HashMap;
use roaring::RoaringBitmap;
use crate::core::types::{Handle, KeyValue};
use crate::index::Index;
use crate::query::ast::QueryOperator;
use crate::schema::schema::IndexType;

/// Hash index from value to the set of objects carrying it. Works for list properties.
pub struct DictionaryIndex {
    name: String,
    entries: HashMap<KeyValue, RoaringBitmap>,
    indexed: RoaringBitmap,
}

impl DictionaryIndex {
    pub fn new(name: &str) -> Self {
        DictionaryIndex {
            name: name.to_string(),
            entries: HashMap::new(),
            indexed: RoaringBitmap::new(),
        }
    }

    /// Number of distinct values
    pub fn cardinality(&self) -> usize {
        self.entries.len()
    }
}

impl Index for DictionaryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_type(&self) -> IndexType {
        IndexType::Dictionary
    }

    fn supports(&self, operator: QueryOperator) -> bool {
        operator.is_equality_like()
    }

    fn count(&self, values: &[&KeyValue], operator: QueryOperator) -> usize {
        match (operator, values) {
            (QueryOperator::Eq | QueryOperator::Contains, [value]) => {
                self.entries.get(*value).map_or(0, |set| set.len() as usize)
            }
            (QueryOperator::In, _) => self.get_many(values, operator).len() as usize,
            _ => 0,
        }
    }

    fn get_many(&self, values: &[&KeyValue], operator: QueryOperator) -> RoaringBitmap {
        if !self.supports(operator) {
            return RoaringBitmap::new();
        }
        let mut result = RoaringBitmap::new();
        for value in values {
            if let Some(set) = self.entries.get(*value) {
                result |= set;
            }
        }
        result
    }

    fn get_all(&self, _descending: bool) -> Vec<Handle> {
        self.indexed.iter().collect()
    }

    fn put(&mut self, handle: Handle, values: &[KeyValue]) {
        for value in values {
            self.entries.entry(value.clone()).or_default().insert(handle);
        }
        self.indexed.insert(handle);
    }

    fn remove(&mut self, handle: Handle, values: &[KeyValue]) {
        for value in values {
            if let Some(set) = self.entries.get_mut(value) {
                set.remove(handle);
                if set.is_empty() {
                    self.entries.remove(value);
                }
            }
        }
        self.indexed.remove(handle);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.indexed.clear();
    }
}
