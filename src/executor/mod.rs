pub mod activity;
pub mod distinct;
pub mod ordering;
pub mod pivot;
pub mod query_manager;

pub use activity::{ActivityEntry, ActivityLog, ACTIVITY_COLLECTION};
pub use pivot::{AggregatedValue, PivotLevel, PivotRequest};
pub use query_manager::{QueryManager, QueryRequest};
