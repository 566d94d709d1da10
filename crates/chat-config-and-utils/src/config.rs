//! Configuration management for chatsync.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default hosted backend URL (can be overridden at compile time via CHATSYNC_SUPABASE_URL).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("CHATSYNC_SUPABASE_URL") {
    Some(url) => url,
    None => "https://localhost.supabase.co",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Number of newest messages kept live by the tail subscription.
pub const DEFAULT_TAIL_LIMIT: usize = 30;

/// Number of messages requested per older page.
pub const DEFAULT_PAGE_LIMIT: usize = 30;

/// Same-sender gap (seconds) under which consecutive messages share one label.
pub const DEFAULT_BURST_WINDOW_SECS: i64 = 120;

/// Distance (points) from the bottom that still counts as "at the bottom".
pub const DEFAULT_NEAR_BOTTOM_THRESHOLD: f64 = 60.0;

/// How conversation ids are derived from the two participant ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    /// Collision-free `len:id` encoding.
    #[default]
    LengthPrefixed,
    /// `a_b` join used by threads created before length prefixing.
    LegacyJoin,
}

/// Main chatsync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Size of the live tail window (K).
    #[serde(default = "default_tail_limit")]
    pub tail_limit: usize,
    /// Size of each older-page request (L).
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Burst grouping window in seconds.
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: i64,
    /// Stick-to-bottom threshold in points.
    #[serde(default = "default_near_bottom_threshold")]
    pub near_bottom_threshold: f64,
    /// Conversation id derivation.
    #[serde(default)]
    pub id_scheme: IdScheme,
    /// Hosted backend project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Hosted backend publishable API key.
    #[serde(default)]
    pub supabase_publishable_key: Option<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_tail_limit() -> usize {
    DEFAULT_TAIL_LIMIT
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

fn default_burst_window_secs() -> i64 {
    DEFAULT_BURST_WINDOW_SECS
}

fn default_near_bottom_threshold() -> f64 {
    DEFAULT_NEAR_BOTTOM_THRESHOLD
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            tail_limit: DEFAULT_TAIL_LIMIT,
            page_limit: DEFAULT_PAGE_LIMIT,
            burst_window_secs: DEFAULT_BURST_WINDOW_SECS,
            near_bottom_threshold: DEFAULT_NEAR_BOTTOM_THRESHOLD,
            id_scheme: IdScheme::default(),
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_publishable_key: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `<base>/config.json`, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Some(log_level) = env_non_empty("CHATSYNC_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(url) = env_non_empty("CHATSYNC_SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = env_non_empty("CHATSYNC_SUPABASE_KEY") {
            self.supabase_publishable_key = Some(key);
        }
    }

    /// Rejects values the sync engine cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.tail_limit == 0 {
            return Err(CoreError::Config("tail_limit must be at least 1".into()));
        }
        if self.page_limit == 0 {
            return Err(CoreError::Config("page_limit must be at least 1".into()));
        }
        if self.burst_window_secs < 0 {
            return Err(CoreError::Config(
                "burst_window_secs must not be negative".into(),
            ));
        }
        if !self.near_bottom_threshold.is_finite() || self.near_bottom_threshold < 0.0 {
            return Err(CoreError::Config(
                "near_bottom_threshold must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// Get the hosted backend URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
