//! Unhosted Storage
//!
//! Namespaced storage for a multi-tenant key-value and queue service. Every
//! `(channel, app, key_path)` slot holds an entity (single value) and a
//! mailbox (FIFO message queue), persisted by one of:
//! - Embedded SQLite document store
//! - Redis
//! - In-memory maps (tests and development)

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;
pub use crate::domain::{DomainError, StorageBackend, StorageBackendExt};
pub use crate::infrastructure::storage::{StorageConfig, StorageFactory, StorageType};
