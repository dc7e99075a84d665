use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Sort order for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_descending(descending: bool) -> Self {
        if descending { SortOrder::Desc } else { SortOrder::Asc }
    }

    pub fn is_descending(self) -> bool {
        self == SortOrder::Desc
    }
}

/// How a query (or one AND branch of it) found its candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    PrimaryKey,
    SingleIndex,
    Intersection,
    FullScan,
    FullText,
    Mixed,
    Union,
}

/// How the ORDER BY clause was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingStrategy {
    None,
    InMemorySort,
    IndexScan,
    FreeFromScan,   // the full scan already walked the ordered index
}

/// One index consulted by the planner, with its estimated selectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexUse {
    pub property: String,
    pub predicate: String,
    pub count: usize,
}

/// Diagnostic record of one query evaluation; logged then discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub collection: String,
    pub strategy: Strategy,
    pub indexes: Vec<IndexUse>,
    pub residual_predicates: usize,
    pub branches: Vec<ExecutionPlan>,
    pub ordering: OrderingStrategy,
    pub distinct: bool,
    pub take: Option<usize>,
    pub result_count: usize,
    pub elapsed: Duration,
}

impl ExecutionPlan {
    pub fn new(collection: &str, strategy: Strategy) -> Self {
        ExecutionPlan {
            collection: collection.to_string(),
            strategy,
            indexes: Vec::new(),
            residual_predicates: 0,
            branches: Vec::new(),
            ordering: OrderingStrategy::None,
            distinct: false,
            take: None,
            result_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_index(mut self, index: IndexUse) -> Self {
        self.indexes.push(index);
        self
    }

    /// Whether this plan (or every branch of it) produced its candidates in index order
    pub fn is_ordered_scan(&self) -> bool {
        self.ordering == OrderingStrategy::FreeFromScan
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.strategy)?;
        if !self.indexes.is_empty() {
            let used: Vec<String> = self
                .indexes
                .iter()
                .map(|i| format!("{}({})", i.property, i.count))
                .collect();
            write!(f, " [{}]", used.join(", "))?;
        }
        if !self.branches.is_empty() {
            let branches: Vec<String> = self.branches.iter().map(|b| b.to_string()).collect();
            write!(f, " {{{}}}", branches.join(" | "))?;
        }
        if self.ordering != OrderingStrategy::None {
            write!(f, " order={:?}", self.ordering)?;
        }
        write!(f, " -> {} in {}us", self.result_count, self.elapsed.as_micros())
    }
}
