use std::path::PathBuf;

use serde::Deserialize;

use crate::domain::storage::KeyEncoding;
use crate::infrastructure::storage::StorageType;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSettings,
    pub logging: LoggingConfig,
}

/// Flat storage section of the configuration file
///
/// Only the fields relevant to the selected backend are read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageType,
    /// Embedded store file, defaults to `<cwd>/data/unhosted-store.db`
    pub path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub key_prefix: Option<String>,
    pub key_encoding: KeyEncoding,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageType::default(),
            path: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 1,
            key_prefix: None,
            key_encoding: KeyEncoding::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config = ::config::Config::builder()
            .add_source(::config::File::with_name("config/default").required(false))
            .add_source(::config::File::with_name("config/local").required(false))
            .add_source(
                ::config::Environment::with_prefix("UNHOSTED")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
