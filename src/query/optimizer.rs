use std::cmp::Ordering;
use crate::core::error::{Error, Result};
use crate::query::ast::{AndQuery, AtomicQuery, OrQuery, QueryOperator};

/// Trait for query rewrite rules applied to every AND branch
pub trait OptimizationRule: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite in place; returns whether the branch changed
    fn optimize(&self, query: &mut AndQuery) -> Result<bool>;
}

/// Rule: merge a lower and an upper bound on the same property into one range predicate.
///
/// Only pairs are merged. Three or more comparisons on one property are left untouched.
pub struct RangeMergeRule;

impl RangeMergeRule {
    fn composite(lower: QueryOperator, upper: QueryOperator) -> Option<QueryOperator> {
        match (lower, upper) {
            (QueryOperator::Ge, QueryOperator::Le) => Some(QueryOperator::GeLe),
            (QueryOperator::Gt, QueryOperator::Le) => Some(QueryOperator::GtLe),
            (QueryOperator::Gt, QueryOperator::Lt) => Some(QueryOperator::GtLt),
            (QueryOperator::Ge, QueryOperator::Lt) => Some(QueryOperator::GeLt),
            _ => None,
        }
    }

    fn is_lower_bound(op: QueryOperator) -> bool {
        matches!(op, QueryOperator::Gt | QueryOperator::Ge)
    }

    /// Order two predicates by value; on equal values the lower-bound operator comes first
    fn by_value<'q>(q1: &'q AtomicQuery, q2: &'q AtomicQuery) -> (&'q AtomicQuery, &'q AtomicQuery) {
        match q1.value().cmp(&q2.value()) {
            Ordering::Less => (q1, q2),
            Ordering::Greater => (q2, q1),
            Ordering::Equal if Self::is_lower_bound(q2.operator) => (q2, q1),
            Ordering::Equal => (q1, q2),
        }
    }

    fn merge(q1: &AtomicQuery, q2: &AtomicQuery) -> Result<Option<AtomicQuery>> {
        if q1.operator == QueryOperator::Eq || q2.operator == QueryOperator::Eq {
            return Err(Error::inconsistent_query(&q1.property));
        }

        let (lo, hi) = Self::by_value(q1, q2);
        let Some(operator) = Self::composite(lo.operator, hi.operator) else {
            return Ok(None);
        };

        match (lo.value(), hi.value()) {
            (Some(low), Some(high)) => {
                AtomicQuery::range(low.clone(), high.renamed(&low.property), operator).map(Some)
            }
            _ => Ok(None),
        }
    }
}

impl OptimizationRule for RangeMergeRule {
    fn name(&self) -> &str {
        "range_merge"
    }

    fn optimize(&self, query: &mut AndQuery) -> Result<bool> {
        // property -> positions of its single-valued comparisons, in first-seen order
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (i, q) in query.elements.iter().enumerate() {
            if !q.operator.is_comparison() || q.value().is_none() {
                continue;
            }
            match groups.iter_mut().find(|(p, _)| *p == q.property) {
                Some((_, positions)) => positions.push(i),
                None => groups.push((q.property.clone(), vec![i])),
            }
        }

        let mut merged: Vec<(usize, usize, AtomicQuery)> = Vec::new();
        for (_, positions) in groups.iter().filter(|(_, p)| p.len() == 2) {
            let (first, second) = (positions[0], positions[1]);
            if let Some(range) = Self::merge(&query.elements[first], &query.elements[second])? {
                merged.push((first, second, range));
            }
        }

        if merged.is_empty() {
            return Ok(false);
        }

        let mut elements: Vec<Option<AtomicQuery>> = query.elements.drain(..).map(Some).collect();
        for (first, second, range) in merged {
            elements[first] = Some(range);
            elements[second] = None;
        }
        query.elements = elements.into_iter().flatten().collect();

        Ok(true)
    }
}

/// Query optimizer
pub struct QueryOptimizer {
    pub rules: Vec<Box<dyn OptimizationRule>>,
}

impl QueryOptimizer {
    pub fn new() -> Self {
        QueryOptimizer {
            rules: vec![Box::new(RangeMergeRule)],
        }
    }

    /// Rewrite every AND branch of the query in place
    pub fn optimize(&self, query: &mut OrQuery) -> Result<()> {
        for and_query in &mut query.elements {
            for rule in &self.rules {
                if rule.optimize(and_query)? {
                    tracing::trace!(rule = rule.name(), query = %and_query, "optimization applied");
                }
            }
        }
        Ok(())
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience entry point using the default rule set
pub fn optimize_query(query: &mut OrQuery) -> Result<()> {
    QueryOptimizer::new().optimize(query)
}
