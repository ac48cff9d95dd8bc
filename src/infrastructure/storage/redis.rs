//! Redis storage backend

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, instrument};

use crate::domain::storage::{KeyCodec, KeyEncoding, StorageBackend};
use crate::domain::DomainError;

/// Reads a whole list and deletes it in one server-side step
const RECEIVE_AND_DELETE_SCRIPT: &str = r#"
local messages = redis.call('LRANGE', KEYS[1], 0, -1)
redis.call('DEL', KEYS[1])
return messages
"#;

/// Configuration for the Redis backend
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Logical database selected on every connection
    pub db: i64,
    /// Key prefix for separating deployments that share a database
    pub key_prefix: Option<String>,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// Key layout for entity and mailbox keys
    pub key_encoding: KeyEncoding,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 1,
            key_prefix: None,
            connection_timeout: Duration::from_secs(5),
            key_encoding: KeyEncoding::default(),
        }
    }
}

impl RedisStoreConfig {
    /// Creates a new configuration for the given server
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Sets the logical database
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the key encoding
    pub fn with_key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }

    /// Connection URL including the database index
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Redis storage backend
///
/// Entities are plain string keys (`SET`/`GET`); mailboxes are native lists.
/// - `send` is a single `RPUSH`, so appends are atomic and land in issue order
/// - `receive` with delete runs `LRANGE` and `DEL` in one Lua script, so a
///   racing `send` is never dropped between the read and the delete
/// - Reconnection and database selection via `ConnectionManager`
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    codec: KeyCodec,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Connects to the configured server and selects its database
    #[instrument(skip(config), fields(host = %config.host, port = config.port, db = config.db))]
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url().as_str()).map_err(|e| {
            DomainError::configuration(format!("Failed to create Redis client: {}", e))
        })?;

        let connecting = ConnectionManager::new(client);
        let connection = tokio::time::timeout(config.connection_timeout, connecting)
            .await
            .map_err(|_| {
                DomainError::configuration(format!(
                    "Timed out connecting to Redis at {}:{}",
                    config.host, config.port
                ))
            })?
            .map_err(|e| DomainError::configuration(format!("Failed to connect to Redis: {}", e)))?;

        info!("Connected to Redis");

        Ok(Self {
            connection,
            codec: KeyCodec::new(config.key_encoding),
            config,
        })
    }

    fn entity_key(&self, channel: &str, app: &str, key_path: &str) -> String {
        let key = self.codec.entity_key(channel, app, key_path);
        prefixed(self.config.key_prefix.as_deref(), key)
    }

    fn mailbox_key(&self, channel: &str, app: &str, key_path: &str) -> String {
        let key = self.codec.mailbox_key(channel, app, key_path);
        prefixed(self.config.key_prefix.as_deref(), key)
    }
}

fn prefixed(prefix: Option<&str>, key: String) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, key),
        None => key,
    }
}

#[async_trait]
impl StorageBackend for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn set(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        value: &str,
    ) -> Result<(), DomainError> {
        let key = self.entity_key(channel, app, key_path);
        let mut conn = self.connection.clone();
        debug!(key = %key, "Saving entity");

        let _: () = conn
            .set(&key, value)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to set key '{}': {}", key, e)))?;

        Ok(())
    }

    async fn get(&self, channel: &str, app: &str, key_path: &str) -> Result<String, DomainError> {
        let key = self.entity_key(channel, app, key_path);
        let mut conn = self.connection.clone();
        debug!(key = %key, "Loading entity");

        let result: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to get key '{}': {}", key, e)))?;

        result.ok_or_else(|| {
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
        let key = self.mailbox_key(channel, app, key_path);
        let mut conn = self.connection.clone();

        let len: i64 = conn.rpush(&key, value).await.map_err(|e| {
            DomainError::backend(format!("Failed to append to mailbox '{}': {}", key, e))
        })?;

        debug!(key = %key, len, "Appended to mailbox");
        Ok(())
    }

    async fn receive(
        &self,
        channel: &str,
        app: &str,
        key_path: &str,
        and_delete: bool,
    ) -> Result<Vec<String>, DomainError> {
        let key = self.mailbox_key(channel, app, key_path);
        let mut conn = self.connection.clone();
        debug!(key = %key, and_delete, "Receiving mailbox");

        let result: redis::RedisResult<Vec<String>> = if and_delete {
            redis::cmd("EVAL")
                .arg(RECEIVE_AND_DELETE_SCRIPT)
                .arg(1)
                .arg(&key)
                .query_async(&mut conn)
                .await
        } else {
            conn.lrange(&key, 0, -1).await
        };

        result.map_err(|e| DomainError::backend(format!("Failed to read mailbox '{}': {}", key, e)))
    }
}
