pub mod request;
pub mod response;
pub mod lock_manager;
pub mod log;
pub mod client;
pub mod manager;
pub mod staging;

pub use client::{channel, ChannelClient, ClientHandle, TransactionClient};
pub use lock_manager::{LockManager, WriteLockGuard};
pub use log::{InMemoryTransactionLog, LogEntry, TransactionLog};
pub use manager::{TransactionManager, TransactionState};
pub use staging::{replay, stage_transaction};
pub use request::{DataRequest, DurableTransaction, PutRequest, RemoveManyRequest, RemoveRequest, TransactionRequest};
pub use response::{EvalResponse, Response};
