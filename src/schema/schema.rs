use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{KeyValue, KeyValueKind, PackedObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Primary,
    Unique,
    Ordered,
    Dictionary,
}

/// Server-visible property of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescription {
    pub name: String,
    pub kind: KeyValueKind,
    pub index: Option<IndexType>,
    pub is_collection: bool,   // list property (Contains / NotContains)
}

impl PropertyDescription {
    pub fn primary(name: &str, kind: KeyValueKind) -> Self {
        Self::with(name, kind, Some(IndexType::Primary), false)
    }

    pub fn unique(name: &str, kind: KeyValueKind) -> Self {
        Self::with(name, kind, Some(IndexType::Unique), false)
    }

    pub fn ordered(name: &str, kind: KeyValueKind) -> Self {
        Self::with(name, kind, Some(IndexType::Ordered), false)
    }

    pub fn dictionary(name: &str, kind: KeyValueKind) -> Self {
        Self::with(name, kind, Some(IndexType::Dictionary), false)
    }

    /// Stored and queryable (by scan) but not indexed
    pub fn plain(name: &str, kind: KeyValueKind) -> Self {
        Self::with(name, kind, None, false)
    }

    pub fn list(name: &str, kind: KeyValueKind, index: Option<IndexType>) -> Self {
        Self::with(name, kind, index, true)
    }

    fn with(name: &str, kind: KeyValueKind, index: Option<IndexType>, is_collection: bool) -> Self {
        PropertyDescription {
            name: name.to_string(),
            kind,
            index,
            is_collection,
        }
    }
}

/// Where a property's value lives inside a `PackedObject`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    PrimaryKey,
    Scalar(usize),
    List(usize),
}

/// Validated description of one collection, built once at registration time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub primary_key: PropertyDescription,
    pub properties: Vec<PropertyDescription>,
    pub full_text: Vec<String>,   // text properties fed to the full-text index
    slots: HashMap<String, Slot>,
}

impl CollectionSchema {
    pub fn new(name: &str, primary_key: PropertyDescription) -> Self {
        CollectionSchema {
            name: name.to_string(),
            primary_key,
            properties: Vec::new(),
            full_text: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn with_property(mut self, property: PropertyDescription) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_full_text(mut self, property: &str) -> Self {
        self.full_text.push(property.to_string());
        self
    }

    /// Validate and compute the positional slots
    pub fn build(mut self) -> Result<Self> {
        if self.primary_key.index != Some(IndexType::Primary) || self.primary_key.is_collection {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Primary key '{}' must carry a primary index", self.primary_key.name),
            ));
        }

        let mut slots = HashMap::new();
        slots.insert(self.primary_key.name.clone(), Slot::PrimaryKey);

        let mut scalar = 0;
        let mut list = 0;
        for property in &self.properties {
            let slot = if property.is_collection {
                if matches!(property.index, Some(IndexType::Ordered) | Some(IndexType::Unique)) {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        format!("List property '{}' only supports a dictionary index", property.name),
                    ));
                }
                list += 1;
                Slot::List(list - 1)
            } else {
                scalar += 1;
                Slot::Scalar(scalar - 1)
            };

            if property.index == Some(IndexType::Primary) {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("Only the primary key can carry a primary index ('{}')", property.name),
                ));
            }
            if slots.insert(property.name.clone(), slot).is_some() {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("Duplicate property '{}' in collection '{}'", property.name, self.name),
                ));
            }
        }

        for name in &self.full_text {
            match self.property(name) {
                Some(p) if p.kind == KeyValueKind::Text => {}
                _ => {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        format!("Full-text property '{}' must be a text property", name),
                    ))
                }
            }
        }

        self.slots = slots;
        Ok(self)
    }

    pub fn slot(&self, property: &str) -> Option<Slot> {
        self.slots.get(property).copied()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescription> {
        if self.primary_key.name == name {
            return Some(&self.primary_key);
        }
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn scalar_properties(&self) -> impl Iterator<Item = &PropertyDescription> {
        self.properties.iter().filter(|p| !p.is_collection)
    }

    pub fn list_properties(&self) -> impl Iterator<Item = &PropertyDescription> {
        self.properties.iter().filter(|p| p.is_collection)
    }

    pub fn indexed_properties(&self) -> impl Iterator<Item = &PropertyDescription> {
        self.properties.iter().filter(|p| p.index.is_some())
    }

    pub fn has_full_text(&self) -> bool {
        !self.full_text.is_empty()
    }

    /// Start packing an object of this collection
    pub fn pack(&self, primary_key: KeyValue) -> ObjectBuilder<'_> {
        let values = self.scalar_properties().map(|p| KeyValue::null(&p.name)).collect();
        let lists = self.list_properties().map(|_| Vec::new()).collect();

        ObjectBuilder {
            schema: self,
            primary_key: primary_key.renamed(&self.primary_key.name),
            values,
            lists,
            full_text: Vec::new(),
            payload: Vec::new(),
            error: None,
        }
    }
}

/// Places named values into their positional slots
pub struct ObjectBuilder<'a> {
    schema: &'a CollectionSchema,
    primary_key: KeyValue,
    values: Vec<KeyValue>,
    lists: Vec<Vec<KeyValue>>,
    full_text: Vec<String>,
    payload: Vec<u8>,
    error: Option<Error>,
}

impl<'a> ObjectBuilder<'a> {
    pub fn set(mut self, value: KeyValue) -> Self {
        match self.schema.slot(&value.property) {
            Some(Slot::Scalar(i)) => {
                if self.schema.full_text.contains(&value.property) {
                    if let Some(text) = value.as_text() {
                        self.full_text.push(text.to_string());
                    }
                }
                self.values[i] = value;
            }
            Some(Slot::List(_)) | Some(Slot::PrimaryKey) | None => self.fail(&value.property),
        }
        self
    }

    pub fn set_list(mut self, property: &str, values: Vec<KeyValue>) -> Self {
        match self.schema.slot(property) {
            Some(Slot::List(i)) => {
                self.lists[i] = values.into_iter().map(|v| v.renamed(property)).collect();
            }
            _ => self.fail(property),
        }
        self
    }

    /// Extra text fed to the full-text index
    pub fn full_text(mut self, text: &str) -> Self {
        self.full_text.push(text.to_string());
        self
    }

    pub fn payload(mut self, json: &serde_json::Value) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => self.payload = bytes,
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    fn fail(&mut self, property: &str) {
        if self.error.is_none() {
            self.error = Some(Error::new(
                ErrorKind::InvalidArgument,
                format!("'{}' is not a settable property of '{}'", property, self.schema.name),
            ));
        }
    }

    pub fn build(self) -> Result<PackedObject> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(PackedObject {
            collection: self.schema.name.clone(),
            primary_key: self.primary_key,
            values: self.values,
            collection_values: self.lists,
            full_text: self.full_text,
            payload: self.payload,
        })
    }
}
