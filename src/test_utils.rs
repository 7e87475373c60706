//! Test utilities for Docuchat
//!
//! This module provides common fixtures (a fixed clock, conversations with
//! chosen timestamps, configurations) and assertion helpers.

use crate::config::{ChatConfig, Config};
use crate::types::Conversation;
use chrono::{DateTime, TimeZone, Utc};

/// A fixed "now" at noon UTC, so calendar-day arithmetic is stable
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0)
        .single()
        .expect("valid fixed timestamp")
}

/// Create conversation metadata last updated at `updated_at`
///
/// # Examples
///
/// ```ignore
/// let c = conversation_at("c1", "Budget", fixed_now());
/// assert_eq!(c.updated_at, fixed_now());
/// ```
pub fn conversation_at(id: &str, title: &str, updated_at: DateTime<Utc>) -> Conversation {
    let mut conversation = Conversation::new(id, title, None);
    conversation.created_at = updated_at;
    conversation.updated_at = updated_at;
    conversation
}

/// Chat settings with the given page size
pub fn chat_config(page_size: usize) -> ChatConfig {
    ChatConfig {
        page_size,
        ..Default::default()
    }
}

/// Create a test configuration
///
/// Returns a configuration suitable for testing, with a short timeout.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.backend.timeout_seconds = 5;
    config
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
backend:
  base_url: "http://localhost:8000/api"
  timeout_seconds: 5
  streaming: true
chat:
  title_max_len: 50
  title_unit: chars
  preview_max_len: 100
  page_size: 20
logging:
  level: debug
  json: false
"#
    .to_string()
}

/// Assert that an error's message contains the expected text
///
/// # Panics
///
/// Panics if the result is `Ok` or the message does not contain `expected`
pub fn assert_error_contains<T: std::fmt::Debug>(result: crate::error::Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!("Expected error containing '{}', got Ok({:?})", expected, value),
        Err(e) => {
            let message = format!("{:#}", e);
            assert!(
                message.contains(expected),
                "Expected error containing '{}', got '{}'",
                expected,
                message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_config_yaml_parses_and_validates() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_assert_error_contains() {
        let result: crate::error::Result<()> =
            Err(crate::error::DocuchatError::Config("bad value".to_string()).into());
        assert_error_contains(result, "bad value");
    }
}
