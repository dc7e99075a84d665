use std::sync::Arc;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{KeyValue, KeyValueKind, PackedObject, FLOAT_SCALE};
use crate::query::ast::OrQuery;
use crate::schema::schema::CollectionSchema;
use crate::store::datastore::property_values;

/// Aggregate the objects matching `query` along `axis`, summing the `values` properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRequest {
    pub query: OrQuery,
    pub axis: Vec<String>,
    pub values: Vec<String>,
}

impl PivotRequest {
    pub fn new(query: OrQuery, axis: &[&str], values: &[&str]) -> Self {
        PivotRequest {
            query,
            axis: axis.iter().map(|a| a.to_string()).collect(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Exact sum of one numeric property, kept on the raw scaled integers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedValue {
    pub property: String,
    pub kind: KeyValueKind,
    pub sum: i128,
    pub count: u64,
}

impl AggregatedValue {
    fn new(property: &str) -> Self {
        AggregatedValue {
            property: property.to_string(),
            kind: KeyValueKind::Null,
            sum: 0,
            count: 0,
        }
    }

    fn add(&mut self, value: &KeyValue) {
        if let Some(v) = value.as_i64() {
            if self.kind == KeyValueKind::Null {
                self.kind = value.kind;
            }
            self.sum += v as i128;
            self.count += 1;
        }
    }

    fn merge(&mut self, other: &AggregatedValue) {
        if self.kind == KeyValueKind::Null {
            self.kind = other.kind;
        }
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Sum with the kind's scaling undone
    pub fn sum(&self) -> f64 {
        match self.kind {
            KeyValueKind::Float => self.sum as f64 / FLOAT_SCALE,
            _ => self.sum as f64,
        }
    }
}

/// Node of a pivot tree. The root has no axis value; every child level groups the objects
/// of its parent by the value of the next axis property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotLevel {
    pub axis_value: Option<KeyValue>,
    pub count: u64,
    pub aggregates: Vec<AggregatedValue>,
    pub children: Vec<PivotLevel>,   // sorted by axis value
}

impl PivotLevel {
    pub fn root(values: &[String]) -> Self {
        Self::level(None, values)
    }

    fn level(axis_value: Option<KeyValue>, values: &[String]) -> Self {
        PivotLevel {
            axis_value,
            count: 0,
            aggregates: values.iter().map(|v| AggregatedValue::new(v)).collect(),
            children: Vec::new(),
        }
    }

    pub fn child(&self, axis_value: &KeyValue) -> Option<&PivotLevel> {
        self.find(axis_value).ok().map(|pos| &self.children[pos])
    }

    pub fn aggregate(&self, property: &str) -> Option<&AggregatedValue> {
        self.aggregates.iter().find(|a| a.property == property)
    }

    fn find(&self, axis_value: &KeyValue) -> std::result::Result<usize, usize> {
        self.children
            .binary_search_by(|c| c.axis_value.as_ref().map_or(std::cmp::Ordering::Less, |v| v.cmp(axis_value)))
    }

    fn child_mut(&mut self, axis_value: &KeyValue, values: &[String]) -> &mut PivotLevel {
        let pos = match self.find(axis_value) {
            Ok(pos) => pos,
            Err(pos) => {
                self.children.insert(pos, Self::level(Some(axis_value.clone()), values));
                pos
            }
        };
        &mut self.children[pos]
    }

    fn add_values(&mut self, object_values: &[KeyValue]) {
        self.count += 1;
        for (aggregate, value) in self.aggregates.iter_mut().zip(object_values) {
            aggregate.add(value);
        }
    }

    /// Account one object: `axis_values[i]` selects the level at depth `i + 1`
    pub fn add_object(&mut self, axis_values: &[KeyValue], object_values: &[KeyValue], values: &[String]) {
        self.add_values(object_values);
        if let Some((first, rest)) = axis_values.split_first() {
            self.child_mut(first, values).add_object(rest, object_values, values);
        }
    }

    /// Fold a tree built over a disjoint set of objects into this one
    pub fn merge_with(&mut self, other: &PivotLevel) -> Result<()> {
        if self.axis_value != other.axis_value {
            return Err(Error::new(
                ErrorKind::Internal,
                format!("Pivot merge between different axis values {:?} and {:?}", self.axis_value, other.axis_value),
            ));
        }
        if self.aggregates.len() != other.aggregates.len() {
            return Err(Error::new(ErrorKind::Internal, "Pivot merge between different value sets".to_string()));
        }

        self.count += other.count;
        for (mine, theirs) in self.aggregates.iter_mut().zip(&other.aggregates) {
            mine.merge(theirs);
        }
        for child in &other.children {
            let Some(axis_value) = child.axis_value.as_ref() else {
                return Err(Error::new(ErrorKind::Internal, "Pivot child without axis value".to_string()));
            };
            match self.find(axis_value) {
                Ok(pos) => self.children[pos].merge_with(child)?,
                Err(pos) => self.children.insert(pos, child.clone()),
            }
        }
        Ok(())
    }

    /// Every level with children must aggregate exactly what its children aggregate
    pub fn check_pivot(&self) -> Result<()> {
        if self.children.is_empty() {
            return Ok(());
        }

        let count: u64 = self.children.iter().map(|c| c.count).sum();
        if count != self.count {
            return Err(Error::new(
                ErrorKind::Internal,
                format!("Pivot level {:?} counts {} but its children {}", self.axis_value, self.count, count),
            ));
        }
        for (i, aggregate) in self.aggregates.iter().enumerate() {
            let sum: i128 = self.children.iter().filter_map(|c| c.aggregates.get(i)).map(|a| a.sum).sum();
            let count: u64 = self.children.iter().filter_map(|c| c.aggregates.get(i)).map(|a| a.count).sum();
            if sum != aggregate.sum || count != aggregate.count {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("Pivot aggregate '{}' differs from its children", aggregate.property),
                ));
            }
        }
        self.children.iter().try_for_each(|c| c.check_pivot())
    }
}

fn first_value(schema: &CollectionSchema, object: &PackedObject, property: &str) -> KeyValue {
    property_values(schema, object, property)
        .into_iter()
        .next()
        .unwrap_or_else(|| KeyValue::null(property))
}

/// Build a pivot tree over `objects`
pub fn build_pivot(schema: &CollectionSchema, objects: &[&Arc<PackedObject>], axis: &[String], values: &[String]) -> PivotLevel {
    let mut root = PivotLevel::root(values);
    for object in objects {
        let axis_values: Vec<KeyValue> = axis.iter().map(|a| first_value(schema, object, a)).collect();
        let object_values: Vec<KeyValue> = values.iter().map(|v| first_value(schema, object, v)).collect();
        root.add_object(&axis_values, &object_values, values);
    }
    root
}

/// Shard the objects by primary key hash, build one tree per shard in parallel and merge
/// them into a single root
pub fn compute_pivot(
    schema: &CollectionSchema,
    objects: &[Arc<PackedObject>],
    request: &PivotRequest,
    shards: usize,
) -> Result<PivotLevel> {
    for property in request.axis.iter().chain(&request.values) {
        if schema.slot(property).is_none() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Unknown pivot property '{}' in '{}'", property, schema.name),
            ));
        }
    }

    let shards = shards.max(1);
    let mut partitions: Vec<Vec<&Arc<PackedObject>>> = vec![Vec::new(); shards];
    for object in objects {
        let shard = (object.primary_key.hash_code() % shards as u64) as usize;
        partitions[shard].push(object);
    }

    let root = Mutex::new(PivotLevel::root(&request.values));
    partitions.par_iter().try_for_each(|partition| {
        let level = build_pivot(schema, partition, &request.axis, &request.values);
        root.lock().merge_with(&level)
    })?;

    let root = root.into_inner();
    root.check_pivot()?;
    Ok(root)
}
