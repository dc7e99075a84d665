use std::cmp::Ordering;
use crate::core::types::KeyValue;
use crate::query::ast::{AndQuery, AtomicQuery, Operand, OrQuery, QueryOperator};

/// One side of an interval: the bounding value and whether it is included
type Bound<'q> = Option<(&'q KeyValue, bool)>;

/// Value interval described by a range-like predicate
struct Interval<'q> {
    lower: Bound<'q>,
    upper: Bound<'q>,
}

impl<'q> Interval<'q> {
    fn of(query: &'q AtomicQuery) -> Option<Self> {
        let interval = match (&query.operand, query.operator) {
            (Operand::Single(x), QueryOperator::Eq) => Interval { lower: Some((x, true)), upper: Some((x, true)) },
            (Operand::Single(x), QueryOperator::Lt) => Interval { lower: None, upper: Some((x, false)) },
            (Operand::Single(x), QueryOperator::Le) => Interval { lower: None, upper: Some((x, true)) },
            (Operand::Single(x), QueryOperator::Gt) => Interval { lower: Some((x, false)), upper: None },
            (Operand::Single(x), QueryOperator::Ge) => Interval { lower: Some((x, true)), upper: None },
            (Operand::Range(lo, hi), op) => {
                let (lo_in, hi_in) = match op {
                    QueryOperator::Btw | QueryOperator::GeLe => (true, true),
                    QueryOperator::GtLe => (false, true),
                    QueryOperator::GtLt => (false, false),
                    QueryOperator::GeLt => (true, false),
                    _ => return None,
                };
                Interval { lower: Some((lo, lo_in)), upper: Some((hi, hi_in)) }
            }
            _ => return None,
        };
        Some(interval)
    }

    fn within(&self, outer: &Interval) -> bool {
        let lower_ok = match (self.lower, outer.lower) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some((a, a_in)), Some((b, b_in))) => match a.cmp(b) {
                Ordering::Greater => true,
                Ordering::Equal => b_in || !a_in,
                Ordering::Less => false,
            },
        };
        let upper_ok = match (self.upper, outer.upper) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some((a, a_in)), Some((b, b_in))) => match a.cmp(b) {
                Ordering::Less => true,
                Ordering::Equal => b_in || !a_in,
                Ordering::Greater => false,
            },
        };
        lower_ok && upper_ok
    }
}

/// Operators whose match on a list property means "no element hits"
fn is_exclusive(op: QueryOperator) -> bool {
    matches!(op, QueryOperator::NotIn | QueryOperator::NotContains)
}

impl AtomicQuery {
    /// `true` only if every object matching `self` also matches `other`.
    ///
    /// The answer is conservative: `false` may be returned for some true inclusions.
    pub fn is_subset_of(&self, other: &AtomicQuery) -> bool {
        if self.property != other.property {
            return false;
        }
        if self == other {
            return true;
        }

        match (&self.operand, self.operator) {
            (Operand::Single(x), QueryOperator::Eq) => {
                !is_exclusive(other.operator) && other.matches_value(x)
            }
            (Operand::Set(values), QueryOperator::In) => {
                !is_exclusive(other.operator) && values.iter().all(|v| other.matches_value(v))
            }
            (Operand::Single(x), QueryOperator::Contains) => {
                matches!(other.operator, QueryOperator::Contains | QueryOperator::Eq) && other.matches_value(x)
            }
            _ if self.operator.is_range() => match (Interval::of(self), Interval::of(other)) {
                (Some(inner), Some(outer)) => inner.within(&outer),
                _ => false,
            },
            _ => false,
        }
    }
}

impl AndQuery {
    /// Every predicate of `other` must be implied by some predicate of `self`
    pub fn is_subset_of(&self, other: &AndQuery) -> bool {
        other
            .elements
            .iter()
            .all(|outer| self.elements.iter().any(|inner| inner.is_subset_of(outer)))
    }
}

impl OrQuery {
    /// Every branch of `self` must be contained in some branch of `other`.
    ///
    /// An empty query matches everything: anything is a subset of it, and it is a subset of
    /// nothing but another empty query.
    pub fn is_subset_of(&self, other: &OrQuery) -> bool {
        if self.collection != other.collection {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        self.elements
            .iter()
            .all(|inner| other.elements.iter().any(|outer| inner.is_subset_of(outer)))
    }
}
