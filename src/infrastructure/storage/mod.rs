//! Storage infrastructure - Backend implementations

mod embedded;
mod factory;
mod in_memory;
mod locks;
mod redis;

pub use self::embedded::{default_store_path, EmbeddedStore, EmbeddedStoreConfig};
pub use self::factory::{StorageConfig, StorageFactory, StorageType};
pub use self::in_memory::InMemoryStore;
pub use self::locks::{KeyGuard, KeyedLocks};
pub use self::redis::{RedisStore, RedisStoreConfig};
