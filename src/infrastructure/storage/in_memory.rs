//! In-memory storage implementation

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::storage::{KeyCodec, KeyEncoding, StorageBackend};
use crate::domain::DomainError;

/// Thread-safe in-memory storage backend
///
/// Useful for testing and development. Data is lost when the process terminates.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entities: RwLock<HashMap<String, String>>,
    mailboxes: RwLock<HashMap<String, Vec<String>>>,
    codec: KeyCodec,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store using the given key encoding
    pub fn with_key_encoding(encoding: KeyEncoding) -> Self {
        Self {
            codec: KeyCodec::new(encoding),
            ..Default::default()
        }
    }
}

#[async_trait]
impl StorageBackend for InMemoryStore {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn set(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        value: &str,
    ) -> Result<(), DomainError> {
        let key = self.codec.entity_key(channel, app, key_path);
        let mut entities = self.entities.write().map_err(|e| {
            DomainError::backend(format!("Failed to acquire write lock: {}", e))
        })?;

        debug!(key = %key, "Saving entity");
        entities.insert(key, value.to_string());
        Ok(())
    }

    async fn get(&self, channel: &str, app: &str, key_path: &str) -> Result<String, DomainError> {
        let key = self.codec.entity_key(channel, app, key_path);
        let entities = self.entities.read().map_err(|e| {
            DomainError::backend(format!("Failed to acquire read lock: {}", e))
        })?;

        entities.get(&key).cloned().ok_or_else(|| {
            DomainError::not_found(format!(
                "Cannot get key '{}' in {}/{}",
                key_path, channel, app
            ))
        })
    }

    async fn send(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        value: &str,
    ) -> Result<(), DomainError> {
        let key = self.codec.mailbox_key(channel, app, key_path);
        let mut mailboxes = self.mailboxes.write().map_err(|e| {
            DomainError::backend(format!("Failed to acquire write lock: {}", e))
        })?;

        let mailbox = mailboxes.entry(key).or_default();
        mailbox.push(value.to_string());
        Ok(())
    }

    async fn receive(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        and_delete: bool,
    ) -> Result<Vec<String>, DomainError> {
        let key = self.codec.mailbox_key(channel, app, key_path);

        if and_delete {
            let mut mailboxes = self.mailboxes.write().map_err(|e| {
                DomainError::backend(format!("Failed to acquire write lock: {}", e))
            })?;

            return Ok(mailboxes.remove(&key).unwrap_or_default());
        }

        let mailboxes = self.mailboxes.read().map_err(|e| {
            DomainError::backend(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(mailboxes.get(&key).cloned().unwrap_or_default())
    }
}
