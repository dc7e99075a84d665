use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::KeyValue;

/// Predicate operators. The composite range operators are only produced by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOperator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Btw,            // closed interval
    In,
    NotIn,
    Contains,       // list property contains value
    NotContains,
    StrStartsWith,
    StrEndsWith,
    StrContains,
    GeLe,           // [lo, hi]
    GtLe,           // (lo, hi]
    GtLt,           // (lo, hi)
    GeLt,           // [lo, hi)
}

impl QueryOperator {
    /// Single-bound comparisons, the ones the optimizer groups per property
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub fn is_composite(self) -> bool {
        matches!(self, Self::GeLe | Self::GtLe | Self::GtLt | Self::GeLt)
    }

    /// Operators that can only be served by an ordered index
    pub fn is_range(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Btw) || self.is_composite()
    }

    /// Operators any index type can serve
    pub fn is_equality_like(self) -> bool {
        matches!(self, Self::Eq | Self::In | Self::Contains)
    }

    pub fn takes_pair(self) -> bool {
        self == Self::Btw || self.is_composite()
    }

    pub fn takes_set(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Btw => "between",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Contains => "contains",
            Self::NotContains => "not contains",
            Self::StrStartsWith => "starts with",
            Self::StrEndsWith => "ends with",
            Self::StrContains => "like",
            Self::GeLe => "[]",
            Self::GtLe => "(]",
            Self::GtLt => "()",
            Self::GeLt => "[)",
        }
    }
}

/// Exactly one shape of operand, matching the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Single(KeyValue),
    Range(KeyValue, KeyValue),
    Set(Vec<KeyValue>),
}

/// Single-property predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicQuery {
    pub(crate) property: String,
    pub(crate) operator: QueryOperator,
    pub(crate) operand: Operand,
}

impl AtomicQuery {
    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn operator(&self) -> QueryOperator {
        self.operator
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Single-valued predicate; rejects operators that need a pair or a set
    pub fn new(value: KeyValue, operator: QueryOperator) -> Result<Self> {
        if operator.takes_pair() || operator.takes_set() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Operator '{}' does not take a single value", operator.symbol()),
            ));
        }
        Ok(Self::single(value, operator))
    }

    /// Two-valued predicate (`Btw` or a composite range)
    pub fn range(low: KeyValue, high: KeyValue, operator: QueryOperator) -> Result<Self> {
        if !operator.takes_pair() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Operator '{}' does not take a value pair", operator.symbol()),
            ));
        }
        if low.property != high.property {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Range bounds target '{}' and '{}'", low.property, high.property),
            ));
        }
        Ok(AtomicQuery {
            property: low.property.clone(),
            operator,
            operand: Operand::Range(low, high),
        })
    }

    /// Set predicate (`In` / `NotIn`)
    pub fn set(property: &str, values: Vec<KeyValue>, operator: QueryOperator) -> Result<Self> {
        if !operator.takes_set() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Operator '{}' does not take a value set", operator.symbol()),
            ));
        }
        let mut values: Vec<KeyValue> = values.into_iter().map(|v| v.renamed(property)).collect();
        values.sort();
        values.dedup();
        Ok(AtomicQuery {
            property: property.to_string(),
            operator,
            operand: Operand::Set(values),
        })
    }

    fn single(value: KeyValue, operator: QueryOperator) -> Self {
        AtomicQuery {
            property: value.property.clone(),
            operator,
            operand: Operand::Single(value),
        }
    }

    pub fn eq(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::Eq)
    }

    pub fn neq(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::Neq)
    }

    pub fn gt(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::Gt)
    }

    pub fn ge(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::Ge)
    }

    pub fn lt(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::Lt)
    }

    pub fn le(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::Le)
    }

    pub fn contains(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::Contains)
    }

    pub fn starts_with(value: KeyValue) -> Self {
        Self::single(value, QueryOperator::StrStartsWith)
    }

    pub fn between(low: KeyValue, high: KeyValue) -> Self {
        let property = low.property.clone();
        let (lo, hi) = if high < low { (high, low) } else { (low, high) };
        AtomicQuery {
            operator: QueryOperator::Btw,
            operand: Operand::Range(lo.renamed(&property), hi.renamed(&property)),
            property,
        }
    }

    pub fn is_in(property: &str, values: Vec<KeyValue>) -> Self {
        let mut values: Vec<KeyValue> = values.into_iter().map(|v| v.renamed(property)).collect();
        values.sort();
        values.dedup();
        AtomicQuery {
            property: property.to_string(),
            operator: QueryOperator::In,
            operand: Operand::Set(values),
        }
    }

    pub fn value(&self) -> Option<&KeyValue> {
        match &self.operand {
            Operand::Single(v) => Some(v),
            _ => None,
        }
    }

    pub fn bounds(&self) -> Option<(&KeyValue, &KeyValue)> {
        match &self.operand {
            Operand::Range(lo, hi) => Some((lo, hi)),
            _ => None,
        }
    }

    /// Every value of the operand, whatever its shape
    pub fn values(&self) -> Vec<&KeyValue> {
        match &self.operand {
            Operand::Single(v) => vec![v],
            Operand::Range(lo, hi) => vec![lo, hi],
            Operand::Set(values) => values.iter().collect(),
        }
    }
}

/// Conjunction of atomic predicates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AndQuery {
    pub elements: Vec<AtomicQuery>,
}

impl AndQuery {
    pub fn new() -> Self {
        AndQuery { elements: Vec::new() }
    }

    pub fn from_elements(elements: Vec<AtomicQuery>) -> Self {
        AndQuery { elements }
    }

    pub fn and(mut self, query: AtomicQuery) -> Self {
        self.elements.push(query);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Disjunction of conjunctions plus the result shaping options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrQuery {
    pub collection: String,
    pub elements: Vec<AndQuery>,   // empty = everything in the collection
    pub skip: usize,
    pub take: Option<usize>,
    pub order_by: Option<String>,
    pub order_descending: bool,
    pub distinct: bool,
    pub selected_properties: Vec<String>,   // empty = full object
    pub full_text_query: Option<String>,
    pub only_if_complete: bool,
    pub count_only: bool,
}

impl OrQuery {
    pub fn new(collection: &str) -> Self {
        OrQuery {
            collection: collection.to_string(),
            ..Default::default()
        }
    }

    /// One-predicate query
    pub fn single(collection: &str, query: AtomicQuery) -> Self {
        Self::new(collection).or(AndQuery::new().and(query))
    }

    pub fn or(mut self, query: AndQuery) -> Self {
        self.elements.push(query);
        self
    }

    pub fn order_by(mut self, property: &str, descending: bool) -> Self {
        self.order_by = Some(property.to_string());
        self.order_descending = descending;
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn distinct(mut self, properties: &[&str]) -> Self {
        self.distinct = true;
        self.selected_properties = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn select(mut self, properties: &[&str]) -> Self {
        self.selected_properties = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn full_text(mut self, text: &str) -> Self {
        self.full_text_query = Some(text.to_string());
        self
    }

    pub fn only_if_complete(mut self) -> Self {
        self.only_if_complete = true;
        self
    }

    pub fn count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    /// No structured predicate (matches the whole collection)
    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(|and| and.is_empty())
    }

    pub fn atomic_count(&self) -> usize {
        self.elements.iter().map(|and| and.elements.len()).sum()
    }

    pub fn has_full_text(&self) -> bool {
        self.full_text_query.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn is_full_text_only(&self) -> bool {
        self.has_full_text() && self.is_empty()
    }
}

impl fmt::Display for AtomicQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.operand, self.operator) {
            (Operand::Range(lo, hi), QueryOperator::Btw) => {
                write!(f, "{} between {} and {}", self.property, lo, hi)
            }
            (Operand::Range(lo, hi), op) => {
                let (left, right) = match op {
                    QueryOperator::GeLe => ("<=", "<="),
                    QueryOperator::GtLe => ("<", "<="),
                    QueryOperator::GtLt => ("<", "<"),
                    _ => ("<=", "<"),
                };
                write!(f, "{} {} {} {} {}", lo, left, self.property, right, hi)
            }
            (Operand::Set(values), op) => {
                let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} {} ({})", self.property, op.symbol(), list.join(", "))
            }
            (Operand::Single(v), op) => write!(f, "{} {} {}", self.property, op.symbol(), v),
        }
    }
}

impl fmt::Display for AndQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.elements.iter().map(|q| q.to_string()).collect();
        write!(f, "{}", parts.join(" AND "))
    }
}

impl fmt::Display for OrQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:", self.collection)?;
        if self.is_empty() {
            write!(f, " *")?;
        } else {
            let parts: Vec<String> = self.elements.iter().map(|q| q.to_string()).collect();
            write!(f, " {}", parts.join(" OR "))?;
        }
        if let Some(text) = &self.full_text_query {
            write!(f, " FULLTEXT '{}'", text)?;
        }
        if let Some(property) = &self.order_by {
            write!(f, " ORDER BY {}{}", property, if self.order_descending { " DESC" } else { "" })?;
        }
        if let Some(take) = self.take {
            write!(f, " TAKE {}", take)?;
        }
        Ok(())
    }
}
