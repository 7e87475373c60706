//! Error types for Docuchat
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Docuchat operations
///
/// This enum encompasses the errors that can occur while loading
/// configuration, talking to the chat backend, ingesting a response
/// stream, or driving the conversation engine.
#[derive(Error, Debug)]
pub enum DocuchatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend API errors (non-success status, malformed body, etc.)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Response stream errors (reported by the server or the transport)
    #[error("Stream error: {0}")]
    Stream(String),

    /// A conversation or other resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A submission was rejected before reaching the network
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Docuchat operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Render an error chain as the single line shown to the user.
///
/// Network-boundary failures are converted with this before they reach the
/// front-end, so the banner never shows a debug dump.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<DocuchatError>() {
        Some(DocuchatError::Stream(reason)) => reason.clone(),
        Some(DocuchatError::Backend(reason)) => reason.clone(),
        _ => format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = DocuchatError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_backend_error_display() {
        let error = DocuchatError::Backend("HTTP 500".to_string());
        assert_eq!(error.to_string(), "Backend error: HTTP 500");
    }

    #[test]
    fn test_stream_error_display() {
        let error = DocuchatError::Stream("connection reset".to_string());
        assert_eq!(error.to_string(), "Stream error: connection reset");
    }

    #[test]
    fn test_not_found_error_display() {
        let error = DocuchatError::NotFound("conversation abc".to_string());
        assert_eq!(error.to_string(), "Not found: conversation abc");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: DocuchatError = io_error.into();
        assert!(matches!(error, DocuchatError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: DocuchatError = json_error.into();
        assert!(matches!(error, DocuchatError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: DocuchatError = yaml_error.into();
        assert!(matches!(error, DocuchatError::Yaml(_)));
    }

    #[test]
    fn test_user_message_strips_variant_prefix_for_stream_errors() {
        let err = anyhow::Error::new(DocuchatError::Stream("model overloaded".to_string()));
        assert_eq!(user_message(&err), "model overloaded");
    }

    #[test]
    fn test_user_message_keeps_context_chain() {
        let err = anyhow::anyhow!("socket closed").context("failed to load conversation");
        assert_eq!(
            user_message(&err),
            "failed to load conversation: socket closed"
        );
    }

    #[test]
    fn test_user_message_keeps_context_of_converted_errors() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = anyhow::Error::new(DocuchatError::from(json_error)).context("malformed chat response");
        let message = user_message(&err);
        assert!(message.starts_with("malformed chat response: Serialization error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DocuchatError>();
    }
}
