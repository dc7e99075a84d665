pub mod datastore;
pub mod registry;
pub mod data_manager;

pub use datastore::DataStore;
pub use registry::{CollectionRegistry, SharedStore};
pub use data_manager::DataManager;
