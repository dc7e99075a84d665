pub mod ast;
pub mod optimizer;
pub mod matcher;
pub mod containment;
pub mod planner;
pub mod types;

pub use ast::{AndQuery, AtomicQuery, Operand, OrQuery, QueryOperator};
pub use matcher::ObjectMatcher;
pub use optimizer::{optimize_query, QueryOptimizer};
pub use types::{ExecutionPlan, OrderingStrategy, SortOrder, Strategy};
