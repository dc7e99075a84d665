pub mod schema;
pub mod domain;

pub use domain::DomainDescription;
pub use schema::{CollectionSchema, IndexType, ObjectBuilder, PropertyDescription, Slot};
