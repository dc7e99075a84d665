use crate::index::Index;
use crate::query::ast::{AndQuery, AtomicQuery};
use crate::schema::schema::IndexType;
use crate::store::DataStore;

/// A predicate an index can answer, with the index's estimate of its result size
pub struct IndexCandidate<'a> {
    pub query: &'a AtomicQuery,
    pub index: &'a dyn Index,
    pub count: usize,
}

impl IndexCandidate<'_> {
    pub fn is_primary(&self) -> bool {
        self.index.index_type() == IndexType::Primary
    }
}

/// Ranks the indexes usable for an AND branch by selectivity
pub struct QueryPlanner<'a> {
    store: &'a DataStore,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(store: &'a DataStore) -> Self {
        QueryPlanner { store }
    }

    /// Candidates sorted by ascending count; ties keep predicate order.
    ///
    /// Equality-like predicates may use any index that serves them, range predicates need an
    /// ordered index. A primary-key equality short-circuits to that single candidate.
    /// Predicates left out are residual and must be checked by matching.
    pub fn get_indexes_for_query(&self, query: &'a AndQuery) -> Vec<IndexCandidate<'a>> {
        let mut candidates = Vec::new();

        for atomic in &query.elements {
            let Some(index) = self.store.try_get_index(&atomic.property) else {
                continue;
            };
            let eligible = if atomic.operator.is_equality_like() {
                index.supports(atomic.operator)
            } else if atomic.operator.is_range() {
                index.index_type() == IndexType::Ordered
            } else {
                false
            };
            if !eligible {
                continue;
            }

            let count = index.count(&atomic.values(), atomic.operator);
            let candidate = IndexCandidate { query: atomic, index, count };
            if candidate.is_primary() {
                return vec![candidate];
            }
            candidates.push(candidate);
        }

        candidates.sort_by_key(|c| c.count);
        candidates
    }
}
