//! Configuration file parser for ~/.config/feedsync/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use crate::media::DoubleTapPolicy;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_token` from the file.
pub const TOKEN_ENV_VAR: &str = "FEEDSYNC_API_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_token` to keep it out of logs.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend root, e.g. `https://api.example.com/v1`.
    pub api_base_url: String,

    /// Bearer token (alternative to the FEEDSYNC_API_TOKEN env var).
    /// Env var takes precedence over config file.
    pub api_token: Option<String>,

    /// Signed-in user id. Used only to decide which controls to show.
    pub user_id: Option<String>,

    /// Posts requested per page.
    pub page_size: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retries for feed and comment reads on 5xx/429.
    pub max_retries: u32,

    /// Coverage percent an item needs to become the active item.
    pub viewability_threshold: f32,

    /// Report "no active item" when nothing meets the threshold.
    pub clear_active_on_gap: bool,

    /// Maximum gap between two taps that still counts as a double tap.
    pub double_tap_window_ms: u64,

    /// What a double tap does on an already-liked post.
    pub double_tap_policy: DoubleTapPolicy,

    /// Autoplay inline videos on metered (cellular) connections.
    pub autoplay_on_metered: bool,

    /// Restart reel clips from the beginning when they end.
    pub loop_reels: bool,

    /// One mute flag shared by every video instead of one per item.
    pub shared_mute: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.example.com/v1".to_string(),
            api_token: None,
            user_id: None,
            page_size: 20,
            request_timeout_secs: 15,
            max_retries: 3,
            viewability_threshold: 80.0,
            clear_active_on_gap: false,
            double_tap_window_ms: 280,
            double_tap_policy: DoubleTapPolicy::default(),
            autoplay_on_metered: false,
            loop_reels: true,
            shared_mute: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("user_id", &self.user_id)
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("viewability_threshold", &self.viewability_threshold)
            .field("clear_active_on_gap", &self.clear_active_on_gap)
            .field("double_tap_window_ms", &self.double_tap_window_ms)
            .field("double_tap_policy", &self.double_tap_policy)
            .field("autoplay_on_metered", &self.autoplay_on_metered)
            .field("loop_reels", &self.loop_reels)
            .field("shared_mute", &self.shared_mute)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 13] = [
        "api_base_url",
        "api_token",
        "user_id",
        "page_size",
        "request_timeout_secs",
        "max_retries",
        "viewability_threshold",
        "clear_active_on_gap",
        "double_tap_window_ms",
        "double_tap_policy",
        "autoplay_on_metered",
        "loop_reels",
        "shared_mute",
    ];

    /// Default location: `~/.config/feedsync/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("feedsync")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            base_url = %config.api_base_url,
            page_size = config.page_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if !(0.0..=100.0).contains(&self.viewability_threshold) {
            return Err(ConfigError::Invalid(format!(
                "viewability_threshold must be between 0 and 100, got {}",
                self.viewability_threshold
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Token to send, env var first.
    pub fn api_token(&self) -> Option<SecretString> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.api_token.clone())
            .map(SecretString::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_window_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
