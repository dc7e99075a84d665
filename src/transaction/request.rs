use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::core::types::{KeyValue, PackedObject};
use crate::query::ast::OrQuery;

/// Insert or replace objects of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    pub collection: String,
    pub items: Vec<PackedObject>,
    pub only_if_new: bool,           // skip objects whose primary key is already stored
    pub predicate: Option<OrQuery>,  // stored version must match before it is replaced
}

impl PutRequest {
    pub fn new(collection: &str, items: Vec<PackedObject>) -> Self {
        PutRequest {
            collection: collection.to_string(),
            items,
            only_if_new: false,
            predicate: None,
        }
    }

    pub fn only_if_new(mut self) -> Self {
        self.only_if_new = true;
        self
    }

    /// Conditional update: every item must already exist and match `predicate`
    pub fn when(mut self, predicate: OrQuery) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.predicate.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub collection: String,
    pub primary_key: KeyValue,
}

impl RemoveRequest {
    pub fn new(collection: &str, primary_key: KeyValue) -> Self {
        RemoveRequest { collection: collection.to_string(), primary_key }
    }
}

/// Remove every object matching a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveManyRequest {
    pub query: OrQuery,
}

impl RemoveManyRequest {
    pub fn new(query: OrQuery) -> Self {
        RemoveManyRequest { query }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataRequest {
    Put(PutRequest),
    Remove(RemoveRequest),
    RemoveMany(RemoveManyRequest),
}

impl DataRequest {
    pub fn collection(&self) -> &str {
        match self {
            DataRequest::Put(r) => &r.collection,
            DataRequest::Remove(r) => &r.collection,
            DataRequest::RemoveMany(r) => &r.query.collection,
        }
    }
}

impl From<PutRequest> for DataRequest {
    fn from(request: PutRequest) -> Self {
        DataRequest::Put(request)
    }
}

impl From<RemoveRequest> for DataRequest {
    fn from(request: RemoveRequest) -> Self {
        DataRequest::Remove(request)
    }
}

impl From<RemoveManyRequest> for DataRequest {
    fn from(request: RemoveManyRequest) -> Self {
        DataRequest::RemoveMany(request)
    }
}

/// Atomic batch of writes, possibly spanning several collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub transaction_id: Uuid,   // nil = unset
    pub is_single_stage: bool,
    pub child_requests: Vec<DataRequest>,
}

impl TransactionRequest {
    pub fn new(child_requests: Vec<DataRequest>) -> Self {
        TransactionRequest {
            transaction_id: Uuid::new_v4(),
            is_single_stage: false,
            child_requests,
        }
    }

    pub fn single_stage(mut self) -> Self {
        self.is_single_stage = true;
        self
    }

    pub fn has_id(&self) -> bool {
        !self.transaction_id.is_nil()
    }

    /// Distinct collections touched, sorted
    pub fn collections(&self) -> Vec<String> {
        self.child_requests
            .iter()
            .map(|r| r.collection().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn conditional_puts(&self) -> impl Iterator<Item = &PutRequest> {
        self.child_requests.iter().filter_map(|r| match r {
            DataRequest::Put(put) if put.is_conditional() => Some(put),
            _ => None,
        })
    }
}

/// What is written to the transaction log before any in-memory change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableTransaction {
    pub transaction_id: Uuid,
    pub items_to_put: Vec<PackedObject>,
    pub items_to_delete: Vec<PackedObject>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DurableTransaction {
    pub fn new(transaction_id: Uuid) -> Self {
        DurableTransaction {
            transaction_id,
            items_to_put: Vec::new(),
            items_to_delete: Vec::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items_to_put.is_empty() && self.items_to_delete.is_empty()
    }
}
