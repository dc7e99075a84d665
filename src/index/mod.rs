pub mod unique;
pub mod dictionary;
pub mod ordered;
pub mod inverted;
pub mod posting;

use roaring::RoaringBitmap;
use crate::core::types::{Handle, KeyValue};
use crate::query::ast::QueryOperator;
use crate::schema::schema::IndexType;

pub use dictionary::DictionaryIndex;
pub use ordered::OrderedIndex;
pub use unique::UniqueIndex;

/// Secondary structure mapping the values of one property to object handles.
///
/// `put`/`remove` receive every value the object carries for the property: one for a scalar,
/// any number for a list property.
pub trait Index: Send + Sync {
    /// Property the index covers
    fn name(&self) -> &str;

    fn index_type(&self) -> IndexType;

    /// Whether the index can answer the operator exactly
    fn supports(&self, operator: QueryOperator) -> bool;

    /// Number of handles `get_many` would return
    fn count(&self, values: &[&KeyValue], operator: QueryOperator) -> usize;

    fn get_many(&self, values: &[&KeyValue], operator: QueryOperator) -> RoaringBitmap;

    /// Every indexed handle; in value order for ordered indexes
    fn get_all(&self, descending: bool) -> Vec<Handle>;

    fn put(&mut self, handle: Handle, values: &[KeyValue]);

    fn remove(&mut self, handle: Handle, values: &[KeyValue]);

    fn clear(&mut self);
}

/// Build the index matching a property declaration
pub fn create_index(name: &str, index_type: IndexType) -> Box<dyn Index> {
    match index_type {
        IndexType::Primary | IndexType::Unique => Box::new(UniqueIndex::new(name, index_type)),
        IndexType::Dictionary => Box::new(DictionaryIndex::new(name)),
        IndexType::Ordered => Box::new(OrderedIndex::new(name)),
    }
}
