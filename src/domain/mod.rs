//! Domain layer - Storage contract, key namespacing and errors

pub mod error;
pub mod storage;

pub use error::DomainError;
pub use storage::{
    KeyCodec, KeyEncoding, NamespaceKey, Purpose, StorageBackend, StorageBackendExt,
};
