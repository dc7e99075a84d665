pub mod core;
pub mod schema;
pub mod query;
pub mod index;
pub mod analysis;
pub mod scoring;
pub mod search;
pub mod store;
pub mod executor;
pub mod transaction;
pub mod storage;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{Handle, KeyValue, KeyValueKind, PackedObject};

/*
┌──────────────────────────────── READ PATH ─────────────────────────────────┐
│                                                                            │
│  OrQuery ──► optimizer ──► QueryManager ──┬── QueryPlanner ──► Index(es)   │
│  (ast)       (range merge)   (executor)   ├── ObjectMatcher (residuals)    │
│                                           ├── FullTextIndex (BM25)         │
│                                           └── ordering / distinct / pivot  │
│                                                                            │
│  DataStore: arena of Arc<PackedObject> addressed by Handle (u32),          │
│             RoaringBitmap sets, primary + secondary indexes, domain,       │
│             access tracker (read/hit counters, LRU touch order)            │
└────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── WRITE PATH ─────────────────────────────────┐
│                                                                            │
│  TransactionRequest ──► TransactionManager                                 │
│      LockManager (all-or-nothing, per collection set)                      │
│      check conditions ──► TransactionLog (WAL: Committed/Delayed/Cancelled)│
│      client round trips (tokio timeout) ──► DataManager (in memory)        │
└────────────────────────────────────────────────────────────────────────────┘
*/
