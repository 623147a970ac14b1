//! Engine configuration

use crate::conversation::NumericSelection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Where active conversations are saved between restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_path: PathBuf::from("dialogue.db"),
        }
    }
}

/// Top-level engine configuration.
///
/// Every field has a default, so a partial JSON document only needs the keys
/// it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueConfig {
    /// Directory holding one `*.json` tree document per file
    pub content_dir: PathBuf,
    pub default_provider: Option<String>,
    pub max_conversations_per_player: usize,
    pub conversation_timeout_minutes: u32,
    /// Interval of the background cleanup and autosave task
    pub cleanup_interval_seconds: u64,
    pub numeric_selection: NumericSelection,
    /// Appended to the message when input matches no choice
    pub not_understood_suffix: String,
    /// Returned when a turn leads to an empty target
    pub farewell_message: String,
    /// NPC id → tree id
    pub npc_trees: HashMap<String, String>,
    pub event_capacity: usize,
    pub persistence: PersistenceConfig,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content/dialogues"),
            default_provider: None,
            max_conversations_per_player: 3,
            conversation_timeout_minutes: 30,
            cleanup_interval_seconds: 60,
            numeric_selection: NumericSelection::Ordinal,
            not_understood_suffix:
                "\n\n(I didn't understand that. Please choose one of the options.)".to_string(),
            farewell_message: "Farewell.".to_string(),
            npc_trees: HashMap::new(),
            event_capacity: 256,
            persistence: PersistenceConfig::default(),
        }
    }
}

impl DialogueConfig {
    /// Defaults overridden by `DIALOGUE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("DIALOGUE_CONTENT_DIR") {
            config.content_dir = PathBuf::from(dir);
        }
        if let Ok(provider) = std::env::var("DIALOGUE_DEFAULT_PROVIDER") {
            config.default_provider = Some(provider);
        }
        if let Some(max) = parse_env("DIALOGUE_MAX_CONVERSATIONS")? {
            config.max_conversations_per_player = max;
        }
        if let Some(minutes) = parse_env("DIALOGUE_TIMEOUT_MINUTES")? {
            config.conversation_timeout_minutes = minutes;
        }
        if let Some(seconds) = parse_env("DIALOGUE_CLEANUP_SECONDS")? {
            config.cleanup_interval_seconds = seconds;
        }
        if let Ok(mode) = std::env::var("DIALOGUE_NUMERIC_SELECTION") {
            config.numeric_selection = match mode.as_str() {
                "ordinal" => NumericSelection::Ordinal,
                "choice_id" => NumericSelection::ChoiceId,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "DIALOGUE_NUMERIC_SELECTION",
                        value: mode,
                    })
                }
            };
        }
        // Setting a database path is what turns persistence on
        if let Ok(path) = std::env::var("DIALOGUE_DB_PATH") {
            config.persistence = PersistenceConfig {
                enabled: true,
                database_path: PathBuf::from(path),
            };
        }
        Ok(config)
    }

    /// Read a JSON config file, merging it over the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn conversation_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.conversation_timeout_minutes))
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }

    /// The part of the configuration turn processing reads
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            conversation_timeout: self.conversation_timeout(),
            numeric_selection: self.numeric_selection,
            not_understood_suffix: self.not_understood_suffix.clone(),
            farewell_message: self.farewell_message.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

/// Settings shared with providers through the per-call context
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub conversation_timeout: chrono::Duration,
    pub numeric_selection: NumericSelection,
    pub not_understood_suffix: String,
    pub farewell_message: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        DialogueConfig::default().settings()
    }
}
