pub mod layout;
pub mod wal;

pub use layout::StorageLayout;
pub use wal::WalTransactionLog;
