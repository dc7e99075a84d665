use serde::{Serialize, Deserialize};
use crate::query::ast::OrQuery;

/// Declares which subset of a collection is known to be held in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainDescription {
    pub query: OrQuery,
    pub is_fully_loaded: bool,
    pub description: Option<String>,
}

impl DomainDescription {
    /// Every object of the collection is loaded
    pub fn complete(collection: &str) -> Self {
        DomainDescription {
            query: OrQuery::new(collection),
            is_fully_loaded: true,
            description: None,
        }
    }

    /// Only objects matching `query` are loaded
    pub fn partial(query: OrQuery) -> Self {
        DomainDescription {
            query,
            is_fully_loaded: false,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Whether answering `query` from memory gives the complete result
    pub fn covers(&self, query: &OrQuery) -> bool {
        self.is_fully_loaded || query.is_subset_of(&self.query)
    }
}
