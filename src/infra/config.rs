// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub marketplace: MarketplaceConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub timers: TimersConfig,

    #[serde(default)]
    pub mailbox: MailboxConfig,

    #[serde(default)]
    pub bulk: BulkConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token. Falls back to the TELEGRAM_BOT_TOKEN env var.
    pub bot_token: Option<String>,
    /// Users allowed to talk to the bot when no session store is configured.
    /// Empty means everyone.
    #[serde(default)]
    pub allowed_users: Vec<i64>,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: Vec::new(),
            poll_timeout_secs: 30,
        }
    }
}

impl TelegramConfig {
    pub fn resolve_token(&self) -> Option<String> {
        self.bot_token
            .clone()
            .or_else(|| std::env::var("TELEGRAM_BOT_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".into(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    /// Falls back to the OPENAI_API_KEY env var.
    pub api_key: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
        }
    }
}

impl VisionConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Quiet periods, caps and inactivity timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConfig {
    pub album_quiet_ms: u64,
    pub album_max_items: usize,
    pub status_debounce_ms: u64,
    pub draft_expiry_secs: u64,
    pub login_expiry_secs: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            album_quiet_ms: 1500,
            album_max_items: 10,
            status_debounce_ms: 300,
            draft_expiry_secs: 600,
            login_expiry_secs: 900,
        }
    }
}

impl TimersConfig {
    pub fn album_quiet(&self) -> Duration {
        Duration::from_millis(self.album_quiet_ms)
    }

    pub fn status_debounce(&self) -> Duration {
        Duration::from_millis(self.status_debounce_ms)
    }

    pub fn draft_expiry(&self) -> Duration {
        Duration::from_secs(self.draft_expiry_secs)
    }

    pub fn login_expiry(&self) -> Duration {
        Duration::from_secs(self.login_expiry_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Bounded queue depth per session.
    pub capacity: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    pub max_drafts: usize,
    /// Comparable listings needed before a price is suggested.
    pub min_comparables: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_drafts: 20,
            min_comparables: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How often the background refresher looks for expiring tokens.
    pub refresh_interval_secs: u64,
    /// Refresh tokens expiring within this window.
    pub refresh_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
            refresh_margin_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Session store file. `None` uses the default data dir; set `disabled`
    /// to run without persistence.
    pub sessions_file: Option<PathBuf>,
    #[serde(default)]
    pub disabled: bool,
}

impl StorageConfig {
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if self.disabled {
            return None;
        }
        Some(
            self.sessions_file
                .clone()
                .unwrap_or_else(paths::sessions_file),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for usage records. `None` disables them.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            dir: None,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
