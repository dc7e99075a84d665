use std::collections::BTreeMap;
use std::ops::Bound;
use roaring::RoaringBitmap;
use crate::core::types::{Handle, KeyValue};
use crate::index::Index;
use crate::query::ast::QueryOperator;
use crate::schema::schema::IndexType;

/// Sorted index answering equality and range predicates; also drives ORDER BY scans.
///
/// Null sorts before every other value and is excluded from range answers.
pub struct OrderedIndex {
    name: String,
    entries: BTreeMap<KeyValue, RoaringBitmap>,
}

impl OrderedIndex {
    pub fn new(name: &str) -> Self {
        OrderedIndex {
            name: name.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Bounds of the range operator, `None` when the range is empty
    fn bounds<'v>(values: &[&'v KeyValue], operator: QueryOperator) -> Option<(Bound<&'v KeyValue>, Bound<&'v KeyValue>)> {
        use Bound::{Excluded, Included, Unbounded};

        let (lower, upper) = match (operator, values) {
            (QueryOperator::Lt, [x]) => (Unbounded, Excluded(*x)),
            (QueryOperator::Le, [x]) => (Unbounded, Included(*x)),
            (QueryOperator::Gt, [x]) => (Excluded(*x), Unbounded),
            (QueryOperator::Ge, [x]) => (Included(*x), Unbounded),
            (QueryOperator::Btw | QueryOperator::GeLe, [lo, hi]) => (Included(*lo), Included(*hi)),
            (QueryOperator::GtLe, [lo, hi]) => (Excluded(*lo), Included(*hi)),
            (QueryOperator::GtLt, [lo, hi]) => (Excluded(*lo), Excluded(*hi)),
            (QueryOperator::GeLt, [lo, hi]) => (Included(*lo), Excluded(*hi)),
            _ => return None,
        };

        // BTreeMap::range panics on inverted or empty-exclusive bounds
        if let (Included(lo) | Excluded(lo), Included(hi) | Excluded(hi)) = (lower, upper) {
            let both_inclusive = matches!((lower, upper), (Included(_), Included(_)));
            if lo > hi || (lo == hi && !both_inclusive) {
                return None;
            }
        }
        if let Included(hi) | Excluded(hi) = upper {
            if hi.is_null() {
                return None;
            }
        }
        Some((lower, upper))
    }

    fn range<'a>(
        &'a self,
        values: &[&'a KeyValue],
        operator: QueryOperator,
    ) -> impl Iterator<Item = &'a RoaringBitmap> + 'a {
        Self::bounds(values, operator)
            .into_iter()
            .flat_map(move |bounds| self.entries.range::<KeyValue, _>(bounds))
            .filter(|(key, _)| !key.is_null())
            .map(|(_, set)| set)
    }

    /// Handles grouped by value, in value order
    pub fn groups(&self, descending: bool) -> Box<dyn Iterator<Item = (&KeyValue, &RoaringBitmap)> + '_> {
        if descending {
            Box::new(self.entries.iter().rev())
        } else {
            Box::new(self.entries.iter())
        }
    }
}

impl Index for OrderedIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_type(&self) -> IndexType {
        IndexType::Ordered
    }

    fn supports(&self, operator: QueryOperator) -> bool {
        matches!(operator, QueryOperator::Eq | QueryOperator::In) || operator.is_range()
    }

    fn count(&self, values: &[&KeyValue], operator: QueryOperator) -> usize {
        match operator {
            QueryOperator::Eq | QueryOperator::In => values
                .iter()
                .filter_map(|v| self.entries.get(*v))
                .map(|set| set.len() as usize)
                .sum(),
            op if op.is_range() => self.range(values, op).map(|set| set.len() as usize).sum(),
            _ => 0,
        }
    }

    fn get_many(&self, values: &[&KeyValue], operator: QueryOperator) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        match operator {
            QueryOperator::Eq | QueryOperator::In => {
                for set in values.iter().filter_map(|v| self.entries.get(*v)) {
                    result |= set;
                }
            }
            op if op.is_range() => {
                for set in self.range(values, op) {
                    result |= set;
                }
            }
            _ => {}
        }
        result
    }

    fn get_all(&self, descending: bool) -> Vec<Handle> {
        self.groups(descending).flat_map(|(_, set)| set.iter()).collect()
    }

    fn put(&mut self, handle: Handle, values: &[KeyValue]) {
        for value in values {
            self.entries.entry(value.clone()).or_default().insert(handle);
        }
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
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
