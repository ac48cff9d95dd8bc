//! Storage factory for runtime backend selection

use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::config::StorageSettings;
use crate::domain::storage::StorageBackend;
use crate::domain::DomainError;

use super::embedded::{EmbeddedStore, EmbeddedStoreConfig};
use super::in_memory::InMemoryStore;
use super::redis::{RedisStore, RedisStoreConfig};

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageType {
    /// Process-local maps (for testing/development)
    InMemory,
    /// SQLite document file
    #[default]
    Embedded,
    /// Redis server
    Redis,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::InMemory => write!(f, "in_memory"),
            StorageType::Embedded => write!(f, "embedded"),
            StorageType::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for StorageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(StorageType::InMemory),
            "embedded" | "sqlite" | "file" => Ok(StorageType::Embedded),
            "redis" => Ok(StorageType::Redis),
            _ => Err(DomainError::configuration(format!(
                "Unknown storage backend: {}. Valid backends: in_memory, embedded, redis",
                s
            ))),
        }
    }
}

// Config files, env vars and the CLI accept the same spellings.
impl<'de> Deserialize<'de> for StorageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// In-memory storage configuration
    InMemory,
    /// Embedded store configuration
    Embedded(EmbeddedStoreConfig),
    /// Redis configuration
    Redis(RedisStoreConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Embedded(EmbeddedStoreConfig::default())
    }
}

impl StorageConfig {
    /// Creates an in-memory storage configuration
    pub fn in_memory() -> Self {
        Self::InMemory
    }

    /// Creates an embedded store configuration for the given file
    pub fn embedded(path: impl Into<std::path::PathBuf>) -> Self {
        Self::Embedded(EmbeddedStoreConfig::new(path))
    }

    /// Creates a Redis configuration for the given server
    pub fn redis(host: impl Into<String>, port: u16) -> Self {
        Self::Redis(RedisStoreConfig::new(host, port))
    }

    /// Builds the configuration for the backend selected in settings
    pub fn from_settings(settings: &StorageSettings) -> Self {
        match settings.backend {
            StorageType::InMemory => Self::InMemory,
            StorageType::Embedded => {
                let mut config =
                    EmbeddedStoreConfig::default().with_key_encoding(settings.key_encoding);

                if let Some(path) = &settings.path {
                    config.path = path.clone();
                }

                Self::Embedded(config)
            }
            StorageType::Redis => {
                let mut config = RedisStoreConfig::new(settings.host.clone(), settings.port)
                    .with_db(settings.db)
                    .with_key_encoding(settings.key_encoding);

                if let Some(prefix) = &settings.key_prefix {
                    config = config.with_key_prefix(prefix.clone());
                }

                Self::Redis(config)
            }
        }
    }

    /// Returns the storage type
    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory => StorageType::InMemory,
            Self::Embedded(_) => StorageType::Embedded,
            Self::Redis(_) => StorageType::Redis,
        }
    }
}

/// Factory for creating storage backends
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Creates and initializes the configured backend
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, DomainError> {
        let backend: Arc<dyn StorageBackend> = match config {
            StorageConfig::InMemory => Arc::new(InMemoryStore::new()),
            StorageConfig::Embedded(embedded) => {
                Arc::new(EmbeddedStore::open(embedded.clone()).await?)
            }
            StorageConfig::Redis(redis) => Arc::new(RedisStore::connect(redis.clone()).await?),
        };

        tracing::debug!(backend = backend.name(), "Storage backend ready");
        Ok(backend)
    }
}
