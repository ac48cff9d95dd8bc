//! Storage domain - Backend contract and namespace key codec

mod namespace;
mod repository;

pub use namespace::{KeyCodec, KeyEncoding, NamespaceKey, Purpose};
pub use repository::{StorageBackend, StorageBackendExt};

#[cfg(test)]
pub use repository::MockStorageBackend;
