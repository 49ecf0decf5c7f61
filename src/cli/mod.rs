use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_rusqlite::Connection;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod characters;
pub mod chat;
pub mod compose;
pub mod init;
pub mod theme;

use crate::characters::{CharacterDirectory, SqliteCharacterStore};
use crate::core::AppConfig;
use crate::core::db::open_initialized;
use crate::storage::{Preferences, SqliteKv};

#[derive(Subcommand)]
pub enum CharacterCommand {
    /// List all characters, the built-in default first
    List {},
    /// Create a character
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        subtitle: String,
        #[arg(long, default_value = "")]
        prompt: String,
    },
    /// Change a character. Omitted fields keep their current value
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        subtitle: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Delete a character
    Delete { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ThemeArg {
    Light,
    Dark,
    Toggle,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database
    Init {},
    /// Start a chat session with the active character
    Chat {
        /// Chat backend URL, overrides PERSONA_CHAT_ENDPOINT
        #[arg(long)]
        endpoint: Option<String>,
        /// Character to chat with instead of the last selected one
        #[arg(long)]
        character: Option<String>,
    },
    /// Manage characters
    Characters {
        #[command(subcommand)]
        command: CharacterCommand,
    },
    /// Set the active character
    Select { id: String },
    /// Show or change the theme
    Theme {
        #[arg(value_enum)]
        mode: Option<ThemeArg>,
    },
    /// Compose a character prompt from a profile and rules
    Compose {
        /// Character profile (name, looks, personality, ...)
        #[arg(long, default_value = "")]
        info: String,
        /// System directives for the model
        #[arg(long, default_value = "")]
        rules: String,
        /// Save the prompt as a new character
        #[arg(long, action, default_value = "false")]
        save: bool,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        subtitle: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the database, overrides PERSONA_CHAT_STORAGE_PATH
    #[arg(long, global = true)]
    storage_path: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Everything backed by the database: preferences and characters.
pub struct Workspace {
    pub db: Option<Connection>,
    pub prefs: Arc<Preferences>,
    pub directory: CharacterDirectory,
}

impl Workspace {
    pub fn from_db(db: Connection) -> Self {
        let prefs = Arc::new(Preferences::new(Arc::new(SqliteKv::new(&db))));
        let store = Arc::new(SqliteCharacterStore::new(&db));
        let directory = CharacterDirectory::new(Some(store), prefs.clone());
        Self {
            db: Some(db),
            prefs,
            directory,
        }
    }

    /// A workspace with no persistence at all.
    pub fn in_memory() -> Self {
        let prefs = Arc::new(Preferences::in_memory());
        let directory = CharacterDirectory::new(None, prefs.clone());
        Self {
            db: None,
            prefs,
            directory,
        }
    }

    pub async fn open(config: &AppConfig) -> Result<Self> {
        let db = open_initialized(&config.db_path).await?;
        Ok(Self::from_db(db))
    }

    /// Like `open` but falls back to an in-memory workspace so chatting
    /// still works without a usable database.
    pub async fn open_or_degrade(config: &AppConfig) -> Self {
        match Self::open(config).await {
            Ok(workspace) => workspace,
            Err(err) => {
                tracing::warn!(
                    "Database at {} unavailable, nothing will be saved: {}",
                    config.db_path,
                    err
                );
                Self::in_memory()
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=warn", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let mut config = AppConfig::default();
    if let Some(path) = args.storage_path.as_deref() {
        let mut overridden = AppConfig::new(path, &config.endpoint);
        overridden.request_timeout = config.request_timeout;
        config = overridden;
    }

    // Handle each sub command
    match args.command {
        Some(Command::Init {}) => {
            init::run(&config).await?;
        }
        Some(Command::Chat {
            endpoint,
            character,
        }) => {
            let config = config.with_endpoint(endpoint);
            chat::run(&config, character).await?;
        }
        Some(Command::Characters { command }) => {
            characters::run(&config, command).await?;
        }
        Some(Command::Select { id }) => {
            characters::select(&config, &id).await?;
        }
        Some(Command::Theme { mode }) => {
            theme::run(&config, mode).await?;
        }
        Some(Command::Compose {
            info,
            rules,
            save,
            name,
            subtitle,
        }) => {
            compose::run(&config, &info, &rules, save, name, &subtitle).await?;
        }
        None => {}
    }

    Ok(())
}
