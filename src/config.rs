//! Configuration management for Docuchat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{DocuchatError, Result};
use crate::text::TitleUnit;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Docuchat
///
/// This structure holds all configuration needed by the client: where the
/// backend lives, how conversations are titled and listed, and how logs are
/// written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// Conversation engine settings
    #[serde(default)]
    pub chat: ChatConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the chat API, e.g. `http://localhost:8000/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds, including streamed responses
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Request answers as event streams; `false` waits for the full reply
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_streaming() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            streaming: default_streaming(),
        }
    }
}

/// Conversation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum title length before an ellipsis is appended
    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,

    /// Unit `title_max_len` is measured in
    #[serde(default)]
    pub title_unit: TitleUnit,

    /// Maximum length of the last-message preview in listings
    #[serde(default = "default_preview_max_len")]
    pub preview_max_len: usize,

    /// Conversations fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Owner sent with created conversations and used to filter listings
    #[serde(default)]
    pub owner_id: Option<String>,
}

fn default_title_max_len() -> usize {
    50
}

fn default_preview_max_len() -> usize {
    100
}

fn default_page_size() -> usize {
    20
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            title_max_len: default_title_max_len(),
            title_unit: TitleUnit::default(),
            preview_max_len: default_preview_max_len(),
            page_size: default_page_size(),
            owner_id: None,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(DocuchatError::from)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config = serde_yaml::from_str(&contents)
            .map_err(DocuchatError::from)
            .with_context(|| format!("Failed to parse config {}", path))?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("DOCUCHAT_BASE_URL") {
            self.backend.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("DOCUCHAT_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.backend.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid DOCUCHAT_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(streaming) = std::env::var("DOCUCHAT_STREAMING") {
            match streaming.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.backend.streaming = true,
                "0" | "false" | "no" | "off" => self.backend.streaming = false,
                _ => tracing::warn!("Invalid DOCUCHAT_STREAMING: {}", streaming),
            }
        }

        if let Ok(page_size) = std::env::var("DOCUCHAT_PAGE_SIZE") {
            if let Ok(value) = page_size.parse() {
                self.chat.page_size = value;
            } else {
                tracing::warn!("Invalid DOCUCHAT_PAGE_SIZE: {}", page_size);
            }
        }

        if let Ok(owner_id) = std::env::var("DOCUCHAT_OWNER_ID") {
            self.chat.owner_id = if owner_id.is_empty() {
                None
            } else {
                Some(owner_id)
            };
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            tracing::debug!("Using base URL override: {}", base_url);
            self.backend.base_url = base_url.clone();
        }
        if cli.no_stream {
            tracing::debug!("Streaming disabled from the command line");
            self.backend.streaming = false;
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(
                DocuchatError::Config("backend.base_url cannot be empty".to_string()).into(),
            );
        }

        match url::Url::parse(&self.backend.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(DocuchatError::Config(format!(
                    "backend.base_url must use http or https, got {}",
                    url.scheme()
                ))
                .into());
            }
            Err(e) => {
                return Err(DocuchatError::Config(format!(
                    "Invalid backend.base_url '{}': {}",
                    self.backend.base_url, e
                ))
                .into());
            }
        }

        if self.backend.timeout_seconds == 0 {
            return Err(DocuchatError::Config(
                "backend.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.page_size == 0 {
            return Err(
                DocuchatError::Config("chat.page_size must be greater than 0".to_string()).into(),
            );
        }

        if self.chat.title_max_len == 0 {
            return Err(DocuchatError::Config(
                "chat.title_max_len must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.preview_max_len == 0 {
            return Err(DocuchatError::Config(
                "chat.preview_max_len must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
