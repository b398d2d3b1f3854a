mod file_storage;
mod memory;

pub use file_storage::{FileStore, StorageError};
pub use memory::MemoryStore;

/// Durable key/value persistence used for sync credentials and metadata.
///
/// Implementations must make a successful `set`/`delete` visible to every
/// later `get`, including after a restart for persistent stores.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;
}
