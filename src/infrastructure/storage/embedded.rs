//! Embedded document store backed by SQLite

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::domain::storage::{KeyCodec, KeyEncoding, StorageBackend};
use crate::domain::DomainError;

use super::locks::KeyedLocks;

const DEFAULT_STORE_NAME: &str = "unhosted-store";

/// Embedded store configuration
#[derive(Debug, Clone)]
pub struct EmbeddedStoreConfig {
    /// Database file, created with its parent directories if missing
    pub path: PathBuf,
    /// Maximum number of pooled SQLite connections
    pub max_connections: u32,
    /// How long a write waits on another connection's lock
    pub busy_timeout: Duration,
    /// Key layout inside the documents table
    pub key_encoding: KeyEncoding,
}

impl Default for EmbeddedStoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            key_encoding: KeyEncoding::default(),
        }
    }
}

impl EmbeddedStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }
}

/// `<cwd>/data/unhosted-store.db`
pub fn default_store_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_default()
        .join("data")
        .join(format!("{}.db", DEFAULT_STORE_NAME))
}

#[derive(Debug, Serialize, Deserialize)]
struct EntityDocument {
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MailboxDocument {
    messages: Vec<String>,
}

/// Single-file document store
///
/// Each entity and mailbox is one JSON document in a `documents` table keyed
/// by the encoded namespace key. Mailboxes have no native append, so `send`
/// reads the document, pushes the message and writes it back. That sequence
/// runs under a per-key lock, as does `receive` with delete, so concurrent
/// callers in this process never lose a message. Separate processes sharing
/// the file are only serialized by SQLite's own write lock.
pub struct EmbeddedStore {
    pool: SqlitePool,
    codec: KeyCodec,
    locks: KeyedLocks,
    path: PathBuf,
}

impl Debug for EmbeddedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedStore")
            .field("path", &self.path)
            .field("codec", &self.codec)
            .finish()
    }
}

impl EmbeddedStore {
    /// Opens (or creates) the store file and its table
    #[instrument(skip(config), fields(path = %config.path.display()))]
    pub async fn open(config: EmbeddedStoreConfig) -> Result<Self, DomainError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::configuration(format!(
                    "Failed to create data directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                DomainError::configuration(format!(
                    "Failed to open embedded store '{}': {}",
                    config.path.display(),
                    e
                ))
            })?;

        let store = Self {
            pool,
            codec: KeyCodec::new(config.key_encoding),
            locks: KeyedLocks::new(),
            path: config.path,
        };
        store.ensure_table().await?;

        info!(path = %store.path.display(), "Embedded store opened");
        Ok(store)
    }

    /// Returns the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensures the documents table exists
    pub async fn ensure_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::backend(format!("Failed to create documents table: {}", e)))?;

        Ok(())
    }

    /// Closes every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn get_document<D>(&self, key: &str) -> Result<Option<D>, DomainError>
    where
        D: DeserializeOwned,
    {
        let row = sqlx::query("SELECT data FROM documents WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to get document '{}': {}", key, e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: String = row.try_get("data").map_err(|e| {
            DomainError::backend(format!("Failed to read document '{}': {}", key, e))
        })?;

        let document = serde_json::from_str(&data).map_err(|e| {
            DomainError::backend(format!("Failed to deserialize document '{}': {}", key, e))
        })?;

        Ok(Some(document))
    }

    async fn save_document<D>(&self, key: &str, document: &D) -> Result<(), DomainError>
    where
        D: Serialize,
    {
        let data = serde_json::to_string(document).map_err(|e| {
            DomainError::backend(format!("Failed to serialize document '{}': {}", key, e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO documents (key, data)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::backend(format!("Failed to save document '{}': {}", key, e)))?;

        Ok(())
    }

    async fn remove_document(&self, key: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM documents WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::backend(format!("Failed to remove document '{}': {}", key, e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StorageBackend for EmbeddedStore {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn set(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        value: &str,
    ) -> Result<(), DomainError> {
        let key = self.codec.entity_key(channel, app, key_path);
        debug!(key = %key, "Saving entity");

        let document = EntityDocument {
            value: value.to_string(),
        };
        self.save_document(&key, &document).await
    }

    async fn get(&self, channel: &str, app: &str, key_path: &str) -> Result<String, DomainError> {
        let key = self.codec.entity_key(channel, app, key_path);
        debug!(key = %key, "Loading entity");

        match self.get_document::<EntityDocument>(&key).await? {
            Some(document) => Ok(document.value),
            None => Err(DomainError::not_found(format!(
                "Cannot get key '{}' in {}/{}",
                key_path, channel, app
            ))),
        }
    }

    async fn send(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        value: &str,
    ) -> Result<(), DomainError> {
        let key = self.codec.mailbox_key(channel, app, key_path);
        let _guard = self.locks.lock(&key).await;

        let mut mailbox = self
            .get_document::<MailboxDocument>(&key)
            .await?
            .unwrap_or_default();
        mailbox.messages.push(value.to_string());

        debug!(key = %key, len = mailbox.messages.len(), "Appending to mailbox");
        self.save_document(&key, &mailbox).await
    }

    async fn receive(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        and_delete: bool,
    ) -> Result<Vec<String>, DomainError> {
        let key = self.codec.mailbox_key(channel, app, key_path);
        debug!(key = %key, and_delete, "Receiving mailbox");

        if !and_delete {
            let mailbox = self.get_document::<MailboxDocument>(&key).await?;
            return Ok(mailbox.map(|m| m.messages).unwrap_or_default());
        }

        let _guard = self.locks.lock(&key).await;

        let Some(mailbox) = self.get_document::<MailboxDocument>(&key).await? else {
            return Ok(Vec::new());
        };
        self.remove_document(&key).await?;

        Ok(mailbox.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open_temp() -> (EmbeddedStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddedStore::open(EmbeddedStoreConfig::new(dir.path().join("t.db")))
            .await
            .unwrap();
        (store, dir)
    }

    #[test]
    fn test_embedded_config_default() {
        let config = EmbeddedStoreConfig::default();

        assert!(config.path.ends_with("data/unhosted-store.db"));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert_eq!(config.key_encoding, KeyEncoding::LengthPrefixed);
    }

    #[test]
    fn test_embedded_config_builder() {
        let config = EmbeddedStoreConfig::new("/tmp/store.db")
            .with_max_connections(8)
            .with_busy_timeout(Duration::from_secs(1))
            .with_key_encoding(KeyEncoding::Legacy);

        assert_eq!(config.path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert_eq!(config.key_encoding, KeyEncoding::Legacy);
    }

    #[tokio::test]
    async fn test_send_then_receive_in_order() {
        let (store, _dir) = open_temp().await;

        store.send("c1", "a1", "k1", "hello").await.unwrap();
        store.send("c1", "a1", "k1", "world").await.unwrap();

        let messages = store.receive("c1", "a1", "k1", false).await.unwrap();
        assert_eq!(messages, vec!["hello", "world"]);

        // Reading without delete leaves the mailbox in place
        let messages = store.receive("c1", "a1", "k1", false).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _dir) = open_temp().await;

        store.set("c1", "a1", "k2", "42").await.unwrap();
        assert_eq!(store.get("c1", "a1", "k2").await.unwrap(), "42");

        store.set("c1", "a1", "k2", "43").await.unwrap();
        assert_eq!(store.get("c1", "a1", "k2").await.unwrap(), "43");
    }

    #[tokio::test]
    async fn test_repeated_set_is_idempotent() {
        let (store, _dir) = open_temp().await;

        for _ in 0..3 {
            store.set("c1", "a1", "k1", "same").await.unwrap();
        }

        assert_eq!(store.get("c1", "a1", "k1").await.unwrap(), "same");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (store, _dir) = open_temp().await;

        let result = store.get("c1", "a1", "missing").await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_receive_missing_is_empty() {
        let (store, _dir) = open_temp().await;

        assert!(store.receive("c1", "a1", "nothing", false).await.unwrap().is_empty());
        assert!(store.receive("c1", "a1", "nothing", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receive_and_delete() {
        let (store, _dir) = open_temp().await;

        store.send("c1", "a1", "k1", "first").await.unwrap();
        store.send("c1", "a1", "k1", "second").await.unwrap();

        let messages = store.receive("c1", "a1", "k1", true).await.unwrap();
        assert_eq!(messages, vec!["first", "second"]);

        let messages = store.receive("c1", "a1", "k1", false).await.unwrap();
        assert!(messages.is_empty());

        store.send("c1", "a1", "k1", "third").await.unwrap();
        let messages = store.receive("c1", "a1", "k1", false).await.unwrap();
        assert_eq!(messages, vec!["third"]);
    }

    #[tokio::test]
    async fn test_entity_and_mailbox_are_independent() {
        let (store, _dir) = open_temp().await;

        store.set("c1", "a1", "k1", "value").await.unwrap();
        store.send("c1", "a1", "k1", "message").await.unwrap();

        assert_eq!(store.get("c1", "a1", "k1").await.unwrap(), "value");
        assert_eq!(
            store.receive("c1", "a1", "k1", true).await.unwrap(),
            vec!["message"]
        );
        assert_eq!(store.get("c1", "a1", "k1").await.unwrap(), "value");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_are_not_lost() {
        let (store, _dir) = open_temp().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..25)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.send("c1", "a1", "busy", &i.to_string()).await })
            })
            .collect();

        for handle in futures::future::join_all(handles).await {
            handle.unwrap().unwrap();
        }

        let mut messages = store.receive("c1", "a1", "busy", false).await.unwrap();
        messages.sort_by_key(|m| m.parse::<u32>().unwrap());

        let expected: Vec<String> = (0..25).map(|i: u32| i.to_string()).collect();
        assert_eq!(messages, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sends_racing_receive_and_delete_are_delivered_once() {
        let (store, _dir) = open_temp().await;
        let store = Arc::new(store);
        let total = 200u32;

        let senders: Vec<_> = (0..total)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.send("c1", "a1", "race", &i.to_string()).await })
            })
            .collect();

        let mut received = Vec::new();
        for _ in 0..20 {
            received.extend(store.receive("c1", "a1", "race", true).await.unwrap());
            tokio::task::yield_now().await;
        }

        for handle in futures::future::join_all(senders).await {
            handle.unwrap().unwrap();
        }
        received.extend(store.receive("c1", "a1", "race", true).await.unwrap());

        received.sort_by_key(|m| m.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..total).map(|i| i.to_string()).collect();
        assert_eq!(received, expected);
        assert!(store.receive("c1", "a1", "race", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddedStoreConfig::new(dir.path().join("nested").join("t.db"));

        let store = EmbeddedStore::open(config.clone()).await.unwrap();
        store.set("c1", "a1", "k1", "persisted").await.unwrap();
        store.send("c1", "a1", "k1", "queued").await.unwrap();
        store.close().await;

        let store = EmbeddedStore::open(config).await.unwrap();
        assert!(store.path().ends_with("nested/t.db"));
        assert_eq!(store.get("c1", "a1", "k1").await.unwrap(), "persisted");
        assert_eq!(
            store.receive("c1", "a1", "k1", false).await.unwrap(),
            vec!["queued"]
        );
    }

    #[tokio::test]
    async fn test_legacy_encoding_shares_ambiguous_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddedStoreConfig::new(dir.path().join("t.db"))
            .with_key_encoding(KeyEncoding::Legacy);
        let store = EmbeddedStore::open(config).await.unwrap();

        store.set("ab", "c", "k", "left").await.unwrap();
        assert_eq!(store.get("a", "bc", "k").await.unwrap(), "left");
    }

    #[tokio::test]
    async fn test_length_prefixed_encoding_separates_ambiguous_keys() {
        let (store, _dir) = open_temp().await;

        store.set("ab", "c", "k", "left").await.unwrap();
        assert!(store.get("a", "bc", "k").await.unwrap_err().is_not_found());
    }
}
