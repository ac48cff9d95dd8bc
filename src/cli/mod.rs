//! CLI module for Unhosted Storage
//!
//! Runs a single storage operation against the configured backend:
//! - `set` / `get`: entity values
//! - `send` / `receive`: mailbox messages

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::{DomainError, StorageBackend};
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::storage::{StorageConfig, StorageFactory, StorageType};

/// Unhosted Storage - namespaced entities and mailboxes
#[derive(Debug, Parser)]
#[command(name = "unhosted-storage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override the configured backend (in_memory, embedded, redis)
    #[arg(long, global = true)]
    pub backend: Option<StorageType>,

    #[command(subcommand)]
    pub command: Command,
}

/// Namespace slot addressed by a command
#[derive(Debug, Clone, Args)]
pub struct Target {
    /// Tenant channel
    pub channel: String,
    /// Application within the channel
    pub app: String,
    /// Key path within the application
    pub key_path: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store an entity value
    Set {
        #[command(flatten)]
        target: Target,
        value: String,
    },

    /// Print an entity value
    Get {
        #[command(flatten)]
        target: Target,
    },

    /// Append a message to a mailbox
    Send {
        #[command(flatten)]
        target: Target,
        value: String,
    },

    /// Print every message in a mailbox, one per line
    Receive {
        #[command(flatten)]
        target: Target,

        /// Clear the mailbox after reading it
        #[arg(long)]
        delete: bool,
    },
}

/// Loads configuration, opens the backend and runs the command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load configuration")?;

    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }

    init_logging(&config.logging);

    let storage = StorageFactory::create(&StorageConfig::from_settings(&config.storage))
        .await
        .with_context(|| format!("Failed to initialize {} storage", config.storage.backend))?;
    info!(backend = storage.name(), "Storage initialized");

    for line in execute(storage.as_ref(), cli.command).await? {
        println!("{}", line);
    }

    Ok(())
}

/// Runs one command and returns the lines to print
pub async fn execute(
    storage: &dyn StorageBackend,
    command: Command,
) -> Result<Vec<String>, DomainError> {
    match command {
        Command::Set { target, value } => {
            storage
                .set(&target.channel, &target.app, &target.key_path, &value)
                .await?;
            Ok(Vec::new())
        }
        Command::Get { target } => {
            let value = storage
                .get(&target.channel, &target.app, &target.key_path)
                .await?;
            Ok(vec![value])
        }
        Command::Send { target, value } => {
            storage
                .send(&target.channel, &target.app, &target.key_path, &value)
                .await?;
            Ok(Vec::new())
        }
        Command::Receive { target, delete } => {
            storage
                .receive(&target.channel, &target.app, &target.key_path, delete)
                .await
        }
    }
}
