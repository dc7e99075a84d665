use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// Position of a stored object inside its collection arena
pub type Handle = u32;

/// Fixed-point scale applied to floating point values
pub const FLOAT_SCALE: f64 = 10_000.0;

/// Semantic type of a key value. Every kind except `Text` and `Null` is stored as an i64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValueKind {
    Null,
    Int,
    Float,  // scaled by FLOAT_SCALE
    Date,   // microsecond ticks since the Unix epoch
    Bool,
    Enum,   // ordinal
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyData {
    Null,
    Int(i64),
    Text(String),
}

/// A typed value bound to a named property.
///
/// Equality, hashing and ordering only look at `data`: values of one property share a kind,
/// so the property name and kind are metadata carried along for projections and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValue {
    pub property: String,
    pub kind: KeyValueKind,
    pub data: KeyData,
}

impl KeyValue {
    pub fn null(property: &str) -> Self {
        Self::with(property, KeyValueKind::Null, KeyData::Null)
    }

    pub fn int(property: &str, value: i64) -> Self {
        Self::with(property, KeyValueKind::Int, KeyData::Int(value))
    }

    pub fn float(property: &str, value: f64) -> Self {
        let scaled = (value * FLOAT_SCALE).round() as i64;
        Self::with(property, KeyValueKind::Float, KeyData::Int(scaled))
    }

    pub fn date(property: &str, value: DateTime<Utc>) -> Self {
        Self::with(property, KeyValueKind::Date, KeyData::Int(value.timestamp_micros()))
    }

    pub fn boolean(property: &str, value: bool) -> Self {
        Self::with(property, KeyValueKind::Bool, KeyData::Int(value as i64))
    }

    pub fn enumeration(property: &str, ordinal: i64) -> Self {
        Self::with(property, KeyValueKind::Enum, KeyData::Int(ordinal))
    }

    pub fn text(property: &str, value: &str) -> Self {
        Self::with(property, KeyValueKind::Text, KeyData::Text(value.to_string()))
    }

    fn with(property: &str, kind: KeyValueKind, data: KeyData) -> Self {
        KeyValue {
            property: property.to_string(),
            kind,
            data,
        }
    }

    /// Same value rebound to another property name
    pub fn renamed(&self, property: &str) -> Self {
        Self::with(property, self.kind, self.data.clone())
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, KeyData::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.data {
            KeyData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            KeyData::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric value with the kind's scaling undone
    pub fn to_f64(&self) -> Option<f64> {
        match (self.kind, &self.data) {
            (KeyValueKind::Float, KeyData::Int(v)) => Some(*v as f64 / FLOAT_SCALE),
            (_, KeyData::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    /// Stable hash of the data, used for pivot sharding and distinct projections
    pub fn hash_code(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.data.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.data.cmp(&other.data)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.data, self.kind) {
            (KeyData::Null, _) => write!(f, "null"),
            (KeyData::Text(s), _) => write!(f, "'{}'", s),
            (KeyData::Int(v), KeyValueKind::Float) => write!(f, "{}", *v as f64 / FLOAT_SCALE),
            (KeyData::Int(v), KeyValueKind::Bool) => write!(f, "{}", *v != 0),
            (KeyData::Int(v), KeyValueKind::Date) => match DateTime::<Utc>::from_timestamp_micros(*v) {
                Some(date) => write!(f, "{}", date.to_rfc3339()),
                None => write!(f, "{}", v),
            },
            (KeyData::Int(v), _) => write!(f, "{}", v),
        }
    }
}

/// One stored record as seen by the server: primary key plus the indexed/queryable values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedObject {
    pub collection: String,
    pub primary_key: KeyValue,
    pub values: Vec<KeyValue>,                // aligned with the schema's scalar properties
    pub collection_values: Vec<Vec<KeyValue>>,// aligned with the schema's list properties
    pub full_text: Vec<String>,
    pub payload: Vec<u8>,                     // opaque client data (JSON)
}

impl PackedObject {
    pub fn value(&self, slot: usize) -> Option<&KeyValue> {
        self.values.get(slot)
    }

    pub fn list(&self, slot: usize) -> Option<&[KeyValue]> {
        self.collection_values.get(slot).map(|v| v.as_slice())
    }

    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}
