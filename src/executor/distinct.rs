use std::collections::HashMap;
use std::sync::Arc;
use crate::core::types::{KeyValue, PackedObject};
use crate::schema::schema::CollectionSchema;
use crate::store::datastore::property_values;

/// Projected values of one object plus an order-independent hash of them
struct Projection {
    values: Vec<KeyValue>,
    hash: u64,
}

impl Projection {
    fn of(schema: &CollectionSchema, object: &PackedObject, properties: &[String]) -> Self {
        let values: Vec<KeyValue> = properties
            .iter()
            .flat_map(|p| {
                let mut values = property_values(schema, object, p);
                if values.is_empty() {
                    values.push(KeyValue::null(p));
                }
                values
            })
            .collect();
        let hash = values.iter().fold(0u64, |acc, v| acc ^ v.hash_code());
        Projection { values, hash }
    }
}

/// Keep the first object of every distinct projection over `properties`, preserving order.
///
/// With no selected properties every object is its own projection (identity is the primary key).
pub fn distinct_by_projection(
    schema: &CollectionSchema,
    objects: Vec<Arc<PackedObject>>,
    properties: &[String],
) -> Vec<Arc<PackedObject>> {
    if properties.is_empty() {
        return objects;
    }

    let mut seen: HashMap<u64, Vec<Vec<KeyValue>>> = HashMap::new();
    let mut result = Vec::with_capacity(objects.len());
    for object in objects {
        let projection = Projection::of(schema, &object, properties);
        let bucket = seen.entry(projection.hash).or_default();
        if bucket.iter().any(|values| *values == projection.values) {
            continue;
        }
        bucket.push(projection.values);
        result.push(object);
    }
    result
}
