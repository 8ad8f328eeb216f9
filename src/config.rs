use crate::exchange::{ExchangeSettings, DEFAULT_REPLY_TIMEOUT};
use crate::reply::DEFAULT_REPLY_DELAY;
use crate::session::ConversationDefaults;
use crate::title::{DEFAULT_TITLE_MARKER, DEFAULT_TITLE_MAX_CHARS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Title every conversation starts with
    pub placeholder_title: String,

    /// Assistant message that opens every conversation
    pub greeting: String,

    /// Characters of the first message kept in a derived title
    pub title_max_chars: usize,

    /// Appended to a derived title that was cut short
    pub title_marker: String,

    /// Delay of the simulated assistant, in milliseconds
    pub reply_delay_ms: u64,

    /// Give up waiting for a reply after this many seconds
    pub reply_timeout_secs: u64,

    /// Where tracing output is written while the TUI owns the terminal
    pub log_file: Option<PathBuf>,

    /// UI preferences
    pub ui: UiConfig,
}

/// UI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub show_timestamps: bool,
    /// Whether the conversation list is open at startup
    pub show_sidebar: bool,
    pub sidebar_width: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            show_sidebar: true,
            sidebar_width: 28,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let conversation = ConversationDefaults::default();

        Config {
            placeholder_title: conversation.placeholder_title,
            greeting: conversation.greeting,
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            title_marker: DEFAULT_TITLE_MARKER.to_string(),
            reply_delay_ms: DEFAULT_REPLY_DELAY.as_millis() as u64,
            reply_timeout_secs: DEFAULT_REPLY_TIMEOUT.as_secs(),
            log_file: None,
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Directory holding the config file and log
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".chatdeck"))
    }

    /// Default location of `config.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

        anyhow::ensure!(config.title_max_chars > 0, "title_max_chars must be at least 1");
        anyhow::ensure!(config.reply_timeout_secs > 0, "reply_timeout_secs must be at least 1");
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Log file location, defaulting next to the config file
    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::home_dir()?.join("chatdeck.log")),
        }
    }

    pub fn conversation_defaults(&self) -> ConversationDefaults {
        ConversationDefaults {
            placeholder_title: self.placeholder_title.clone(),
            greeting: self.greeting.clone(),
        }
    }

    pub fn exchange_settings(&self) -> ExchangeSettings {
        ExchangeSettings {
            title_max_chars: self.title_max_chars,
            title_marker: self.title_marker.clone(),
            reply_timeout: Duration::from_secs(self.reply_timeout_secs),
        }
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}
