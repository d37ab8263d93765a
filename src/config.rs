//! Configuration loading and validation.
//!
//! The relay reads a single human-owned `config.toml` (default
//! `~/.relaybot/config.toml`). Secrets are never stored in it: sections name
//! the environment variable that holds them, resolved through
//! [`crate::credentials`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::message::{ChatId, Platform};

/// Configuration problems detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A pipeline was given both an allow list and a block list.
    #[error("a pipeline cannot have both allowed_chats and blocked_chats")]
    ConflictingAccessLists,

    /// Two adapters were registered for the same platform.
    #[error("a transport for {0} is already registered")]
    DuplicateTransport(Platform),

    /// A pipeline needs a collaborator service that is not configured.
    #[error("pipeline `{pipeline}` requires the {service} service")]
    MissingService {
        /// Pipeline kind.
        pipeline: String,
        /// Missing service name.
        service: &'static str,
    },

    /// A required credential is absent.
    #[error("missing required credential: {0}")]
    MissingCredential(String),

    /// A backend URL does not parse.
    #[error("{field} is not a valid URL: {error}")]
    InvalidUrl {
        /// Config key holding the URL.
        field: &'static str,
        /// Parser error.
        error: String,
    },

    /// A notification has an unparsable cron expression.
    #[error("notification `{name}` has invalid cron expression: {error}")]
    InvalidCron {
        /// Notification name.
        name: String,
        /// Parser error.
        error: String,
    },
}

/// Top-level human-owned configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Dispatch engine limits.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Messaging backends. A present section enables its transport.
    #[serde(default)]
    pub transports: TransportsConfig,

    /// Persisted chat history and gallery.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Collaborator services used by pipelines.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Pipelines, in registration order.
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,

    /// Scheduled notifications.
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pipeline in &self.pipelines {
            if !pipeline.allowed_chats.is_empty() && !pipeline.blocked_chats.is_empty() {
                return Err(ConfigError::ConflictingAccessLists);
            }
        }
        let urls = [
            (
                "transports.whatsapp.bridge_url",
                self.transports.whatsapp.as_ref().map(|c| c.bridge_url.as_str()),
            ),
            (
                "transports.telegram.api_url",
                self.transports
                    .telegram
                    .as_ref()
                    .and_then(|c| c.api_url.as_deref()),
            ),
            (
                "transports.signal.base_url",
                self.transports.signal.as_ref().map(|c| c.base_url.as_str()),
            ),
            (
                "services.openai.base_url",
                self.services.openai.as_ref().map(|c| c.base_url.as_str()),
            ),
        ];
        for (field, url) in urls {
            if let Some(url) = url {
                url::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                    field,
                    error: e.to_string(),
                })?;
            }
        }
        for notification in &self.notifications {
            cron::Schedule::from_str(&notification.cron).map_err(|e| {
                ConfigError::InvalidCron {
                    name: notification.name.clone(),
                    error: e.to_string(),
                }
            })?;
        }
        Ok(())
    }
}

/// Dispatch engine limits. Both default to unlimited.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on concurrently running pipeline tasks.
    #[serde(default)]
    pub max_concurrent_pipelines: Option<usize>,

    /// Per-pipeline wall-clock limit in seconds.
    #[serde(default)]
    pub pipeline_timeout_secs: Option<u64>,
}

/// Transport sections.
#[derive(Debug, Default, Deserialize)]
pub struct TransportsConfig {
    /// WhatsApp HTTP bridge.
    pub whatsapp: Option<WhatsAppConfig>,
    /// Telegram Bot API.
    pub telegram: Option<TelegramConfig>,
    /// Signal CLI REST bridge.
    pub signal: Option<SignalConfig>,
    /// Telegram client-library session.
    pub telethon: Option<SessionConfig>,
    /// Instagram direct messages.
    pub instagram: Option<SessionConfig>,
}

/// WhatsApp bridge settings.
#[derive(Debug, Deserialize)]
pub struct WhatsAppConfig {
    /// Base URL of the HTTP bridge.
    #[serde(default = "default_whatsapp_bridge_url")]
    pub bridge_url: String,

    /// The bot account's phone number, used to detect mentions.
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Telegram bot settings.
#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    /// Environment variable name holding the bot token.
    pub bot_token_env: String,

    /// Bot API server, for self-hosted `telegram-bot-api` deployments.
    #[serde(default)]
    pub api_url: Option<String>,
}

/// Signal CLI REST bridge settings.
#[derive(Debug, Deserialize)]
pub struct SignalConfig {
    /// Base URL of signal-cli-rest-api.
    #[serde(default = "default_signal_base_url")]
    pub base_url: String,

    /// Registered account number, e.g. `+4915100000000`.
    pub number: String,
}

/// Session settings for client-library transports.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Session name or account handle.
    #[serde(default)]
    pub session: Option<String>,
}

/// Storage settings.
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. Defaults to `~/.relaybot/data/relaybot.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

/// Collaborator service settings.
#[derive(Debug, Default, Deserialize)]
pub struct ServicesConfig {
    /// OpenAI-compatible endpoints.
    pub openai: Option<OpenAiServiceConfig>,
}

/// OpenAI-compatible service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiServiceConfig {
    /// Environment variable name holding the API key.
    pub api_key_env: String,

    /// API base URL including the version segment.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Chat completion model.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Speech-to-text model.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    /// Image generation model.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Text-to-speech model.
    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    /// Text-to-speech voice.
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Chat price per million prompt tokens, in USD. Zero hides the cost.
    #[serde(default)]
    pub input_cost_per_mtok: f64,

    /// Chat price per million completion tokens, in USD.
    #[serde(default)]
    pub output_cost_per_mtok: f64,
}

/// Built-in pipeline kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// `#help` listing.
    Help,
    /// Record every message in chat history.
    History,
    /// `#ask` question answering.
    Ask,
    /// `#forget` history wipe with confirmation.
    Forget,
    /// Per-chat image gallery.
    Gallery,
    /// Voice message transcription.
    Transcribe,
    /// `#imagine` image generation.
    Imagine,
    /// `#say` text-to-speech.
    Say,
    /// Self-authored `#undo`.
    Undo,
}

impl PipelineKind {
    /// Configuration name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::Help => "help",
            PipelineKind::History => "history",
            PipelineKind::Ask => "ask",
            PipelineKind::Forget => "forget",
            PipelineKind::Gallery => "gallery",
            PipelineKind::Transcribe => "transcribe",
            PipelineKind::Imagine => "imagine",
            PipelineKind::Say => "say",
            PipelineKind::Undo => "undo",
        }
    }
}

/// One `[[pipelines]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Which pipeline to build.
    pub kind: PipelineKind,

    /// Chats the pipeline is restricted to.
    #[serde(default)]
    pub allowed_chats: Vec<ChatId>,

    /// Chats the pipeline never runs in.
    #[serde(default)]
    pub blocked_chats: Vec<ChatId>,

    /// Register into the self-authored list instead of the external one.
    #[serde(default)]
    pub self_authored: bool,

    /// Default language for speech pipelines.
    #[serde(default)]
    pub language: Option<String>,
}

/// One `[[notifications]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Unique name, used to track last run.
    pub name: String,

    /// Cron expression (seconds field first).
    pub cron: String,

    /// Target chat.
    pub chat: ChatId,

    /// Text to send.
    pub text: String,

    /// Whether the notification is active.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions for serde

fn default_whatsapp_bridge_url() -> String {
    "http://127.0.0.1:3001".to_owned()
}
fn default_signal_base_url() -> String {
    "http://127.0.0.1:8080".to_owned()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_owned()
}
fn default_transcription_model() -> String {
    "whisper-1".to_owned()
}
fn default_image_model() -> String {
    "dall-e-3".to_owned()
}
fn default_speech_model() -> String {
    "tts-1".to_owned()
}
fn default_voice() -> String {
    "alloy".to_owned()
}
fn default_true() -> bool {
    true
}

/// Resolved filesystem layout under `~/.relaybot/`.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Root directory.
    pub root: PathBuf,
    /// `config.toml`.
    pub config_toml: PathBuf,
    /// `.env` with credentials.
    pub env_file: PathBuf,
    /// Log directory.
    pub logs_dir: PathBuf,
    /// Data directory (database).
    pub data_dir: PathBuf,
}

impl RuntimePaths {
    /// Layout rooted at an arbitrary directory.
    pub fn under(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            config_toml: root.join("config.toml"),
            env_file: root.join(".env"),
            logs_dir: root.join("logs"),
            data_dir: root.join("data"),
        }
    }

    /// Default database path.
    pub fn database(&self) -> PathBuf {
        self.data_dir.join("relaybot.db")
    }
}

/// Load the config from a TOML file and validate it.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Resolve the default config directory (`~/.relaybot/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".relaybot"))
}

/// Resolve the default runtime layout.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    Ok(RuntimePaths::under(&config_dir()?))
}
