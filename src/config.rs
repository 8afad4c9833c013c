//! Configuration file parser for ~/.config/vodview/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Every sizing value the feed and watch views need (page size, skeleton
//! rows, sentinel threshold) lives here and is handed to each component at
//! construction.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// `api_token` is a `SecretString`, so it never shows up in `Debug` output.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL; endpoints are joined onto it (`videos`, `videos/<id>`).
    pub api_base_url: String,

    /// Items requested per feed page.
    pub page_size: usize,

    /// Per-request timeout for API and manifest fetches.
    pub request_timeout_secs: u64,

    /// Request playback as soon as a session reaches `Ready`.
    pub autoplay: bool,

    /// Fraction of the sentinel that must be visible before the next page
    /// is requested.
    pub sentinel_threshold: f32,

    /// Placeholder rows shown while the first page is loading.
    pub skeleton_rows: usize,

    /// Bearer token for the backend. `VODVIEW_API_TOKEN` takes precedence.
    #[serde(deserialize_with = "deserialize_token")]
    pub api_token: Option<SecretString>,
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|t| !t.is_empty())
        .map(SecretString::from))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            page_size: 20,
            request_timeout_secs: 30,
            autoplay: true,
            sentinel_threshold: 1.0,
            skeleton_rows: 24,
            api_token: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Upper bound on `page_size`; larger pages defeat incremental loading.
    pub const MAX_PAGE_SIZE: usize = 200;

    const KNOWN_KEYS: [&'static str; 7] = [
        "api_base_url",
        "page_size",
        "request_timeout_secs",
        "autoplay",
        "sentinel_threshold",
        "skeleton_rows",
        "api_token",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        tracing::info!(
            api_base_url = %config.api_base_url,
            page_size = config.page_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply `VODVIEW_API_TOKEN` over the file value.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("VODVIEW_API_TOKEN") {
            if !token.is_empty() {
                self.api_token = Some(SecretString::from(token));
            }
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > Self::MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size must be between 1 and {} (got {})",
                Self::MAX_PAGE_SIZE,
                self.page_size
            )));
        }
        if !(self.sentinel_threshold > 0.0 && self.sentinel_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "sentinel_threshold must be in (0, 1] (got {})",
                self.sentinel_threshold
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
