//! Error types for publish operations.
//!
//! One variant per failure class, each carrying enough context (broker
//! address, topic) to be actionable. Messages destined for the host pass
//! through [`sanitize_error_message`] so credential values can never leak
//! into logs or results.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    /// Missing or invalid required configuration; not retried
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed per-call input; not retried
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Producer construction failed; the connection stays producer-less so a
    /// later call may retry construction
    #[error("failed to create producer for {broker}: {message}")]
    Connection { broker: String, message: String },

    /// Negative acknowledgment or acknowledgment timeout
    #[error("message delivery failed ({broker}): {reason}")]
    Delivery { broker: String, reason: String },

    /// Failure in the client library during send or flush, distinct from a
    /// negative acknowledgment; triggers a connection reset
    #[error("transport failure ({broker}): {message}")]
    Transport { broker: String, message: String },

    /// A transport failure whose follow-up connection reset failed as well
    #[error("transport failure ({broker}): {send_error}; connection reset also failed: {reset_error}")]
    ResetFailed {
        broker: String,
        send_error: String,
        reset_error: String,
    },

    /// Credential validation probe failed at setup time
    #[error("credential validation failed: {message}")]
    CredentialValidation { message: String },
}

impl PublishError {
    /// Create an invalid-request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a producer-construction error
    pub fn connection<S: Into<String>, M: Into<String>>(broker: S, message: M) -> Self {
        Self::Connection {
            broker: broker.into(),
            message: message.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery<S: Into<String>, R: Into<String>>(broker: S, reason: R) -> Self {
        Self::Delivery {
            broker: broker.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>, M: Into<String>>(broker: S, message: M) -> Self {
        Self::Transport {
            broker: broker.into(),
            message: message.into(),
        }
    }

    /// Create a credential-validation error
    pub fn credential_validation<S: Into<String>>(message: S) -> Self {
        Self::CredentialValidation {
            message: message.into(),
        }
    }

    /// Sanitized message suitable for host-facing output
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Sanitize error messages so credential material never reaches the host
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    // Redact key=value / key: value pairs for common secret names,
    // including the dotted Kafka form (sasl.password=...)
    sanitized = regex::Regex::new(r"(?i)([\w.]*(password|token|secret))[=:]\s*\S+")
        .unwrap()
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    // Truncate very long messages - ensure total length is <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let max_content_len = 500 - truncate_suffix.len();
        sanitized = format!("{}{}", &sanitized[..max_content_len], truncate_suffix);
    }

    sanitized
}

/// Result type for publisher operations
pub type PublishResult<T> = Result<T, PublishError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_constructor() {
        let error = PublishError::invalid_request("missing topic");
        assert!(matches!(error, PublishError::InvalidRequest { .. }));
        assert_eq!(error.to_string(), "invalid request: missing topic");
    }

    #[test]
    fn test_connection_error_carries_broker() {
        let error = PublishError::connection("b1:9092", "broker unreachable");
        assert!(error.to_string().contains("b1:9092"));
        assert!(error.to_string().contains("broker unreachable"));
    }

    #[test]
    fn test_delivery_error_carries_broker_and_reason() {
        let error = PublishError::delivery("b1:9092", "send timed out or unacknowledged");
        assert!(error.to_string().contains("b1:9092"));
        assert!(error.to_string().contains("send timed out or unacknowledged"));
    }

    #[test]
    fn test_reset_failed_carries_both_errors() {
        let error = PublishError::ResetFailed {
            broker: "b1:9092".to_string(),
            send_error: "local queue full".to_string(),
            reset_error: "flush timed out".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("local queue full"));
        assert!(message.contains("flush timed out"));
    }

    #[test]
    fn test_config_error_converts() {
        let error: PublishError = ConfigError::MissingBootstrapServers.into();
        assert!(matches!(error, PublishError::Config(_)));
        assert!(error.to_string().contains("bootstrap.servers"));
    }

    #[test]
    fn test_sanitize_kafka_password_key() {
        let sanitized =
            sanitize_error_message("authentication failed: sasl.password=hunter2 rejected");
        assert!(!sanitized.contains("hunter2"));
        assert!(sanitized.contains("sasl.password=***"));
    }

    #[test]
    fn test_sanitize_multiple_secrets() {
        let sanitized =
            sanitize_error_message("auth failed: password=pass1 secret=hidden token: tok456");
        assert!(!sanitized.contains("pass1"));
        assert!(!sanitized.contains("hidden"));
        assert!(!sanitized.contains("tok456"));
    }

    #[test]
    fn test_sanitize_case_insensitive() {
        let sanitized = sanitize_error_message("PASSWORD=secret123");
        assert!(!sanitized.contains("secret123"));
    }

    #[test]
    fn test_sanitize_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }

    #[test]
    fn test_long_message_truncation() {
        let long_message = "x".repeat(600);
        let sanitized = sanitize_error_message(&long_message);
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_exactly_500_chars() {
        let message = "x".repeat(500);
        let sanitized = sanitize_error_message(&message);
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_sanitized_message_on_error() {
        let error = PublishError::transport("b1:9092", "SASL auth failure: sasl.password=p");
        let sanitized = error.sanitized_message();
        assert!(!sanitized.contains("=p "));
        assert!(sanitized.contains("sasl.password=***"));
    }
}
