//! Storage backend contract

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Contract every storage provider implements
///
/// Each `(channel, app, key_path)` slot holds two independent shapes: an
/// entity (one value, `set`/`get`) and a mailbox (FIFO queue,
/// `send`/`receive`). A backend is ready once it has been constructed, so
/// there is no separate init step to forget.
///
/// Values are opaque strings. Use [`StorageBackendExt`] for typed values.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Stores or overwrites the entity
    async fn set(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        value: &str,
    ) -> Result<(), DomainError>;

    /// Retrieves the entity, `NotFound` if it was never set
    async fn get(&self, channel: &str, app: &str, key_path: &str) -> Result<String, DomainError>;

    /// Appends a message to the mailbox, creating the mailbox if absent
    async fn send(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        value: &str,
    ) -> Result<(), DomainError>;

    /// Returns every message in send order
    ///
    /// A mailbox that was never sent to is empty. With `and_delete` the
    /// mailbox is cleared as part of the same call.
    async fn receive(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        and_delete: bool,
    ) -> Result<Vec<String>, DomainError>;
}

/// Typed entity and mailbox access, stored as JSON
pub trait StorageBackendExt: StorageBackend {
    /// Serializes and stores an entity
    fn set_json<'a, V>(
        &'a self,
        channel: &'a str,
        app: &'a str,
        key_path: &'a str,
        value: &'a V,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::backend(format!("Failed to serialize entity value: {}", e))
            })?;
            self.set(channel, app, key_path, &data).await
        }
    }

    /// Retrieves and deserializes an entity
    fn get_json<'a, V>(
        &'a self,
        channel: &'a str,
        app: &'a str,
        key_path: &'a str,
    ) -> impl std::future::Future<Output = Result<V, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            let data = self.get(channel, app, key_path).await?;
            serde_json::from_str(&data).map_err(|e| {
                DomainError::backend(format!("Failed to deserialize entity value: {}", e))
            })
        }
    }

    /// Serializes and appends a message
    fn send_json<'a, V>(
        &'a self,
        channel: &'a str,
        app: &'a str,
        key_path: &'a str,
        value: &'a V,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::backend(format!("Failed to serialize message: {}", e))
            })?;
            self.send(channel, app, key_path, &data).await
        }
    }

    /// Receives and deserializes every message
    fn receive_json<'a, V>(
        &'a self,
        channel: &'a str,
        app: &'a str,
        key_path: &'a str,
        and_delete: bool,
    ) -> impl std::future::Future<Output = Result<Vec<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            let messages = self.receive(channel, app, key_path, and_delete).await?;

            messages
                .iter()
                .map(|message| {
                    serde_json::from_str(message).map_err(|e| {
                        DomainError::backend(format!("Failed to deserialize message: {}", e))
                    })
                })
                .collect()
        }
    }
}

// Blanket implementation for all storage backends
impl<T: StorageBackend + ?Sized> StorageBackendExt for T {}
