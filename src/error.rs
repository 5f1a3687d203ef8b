//! Error types for the review context engine.

use thiserror::Error;

/// Result type alias for context engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the context engine.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Token Counting Errors =====
    #[error("API error: {status} {status_text} - {message}")]
    Api {
        status: u16,
        status_text: String,
        message: String,
    },

    #[error("Token count missing from response: {0}")]
    MissingTokenCount(String),

    #[error("Encoder unavailable for model {model}: {reason}")]
    EncoderUnavailable { model: String, reason: String },

    // ===== Data Source Errors =====
    #[error("Data source error ({source_name}): {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error("Invalid diff format: {0}")]
    InvalidDiffFormat(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    // ===== HTTP Errors =====
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an API error from HTTP response details.
    pub fn api(status: u16, status_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            status_text: status_text.into(),
            message: message.into(),
        }
    }

    /// Create a data source error.
    pub fn source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retriable (transient failures).
    ///
    /// The engine never retries on its own; callers wrapping a data source may.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || (*status >= 500 && *status < 600),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let api_err = Error::api(401, "Unauthorized", "invalid x-api-key");
        assert_eq!(
            api_err.to_string(),
            "API error: 401 Unauthorized - invalid x-api-key"
        );

        let source_err = Error::source("github", "rate limited");
        assert_eq!(
            source_err.to_string(),
            "Data source error (github): rate limited"
        );

        let missing = Error::MissingTokenCount("{}".to_string());
        assert_eq!(missing.to_string(), "Token count missing from response: {}");
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::api(500, "Internal Server Error", "").is_retriable());
        assert!(Error::api(529, "Overloaded", "").is_retriable());
        assert!(Error::api(429, "Too Many Requests", "").is_retriable());
        assert!(!Error::api(400, "Bad Request", "").is_retriable());
        assert!(!Error::api(404, "Not Found", "").is_retriable());

        assert!(!Error::InvalidDiffFormat("x".to_string()).is_retriable());
        assert!(!Error::Config("x".to_string()).is_retriable());
    }

    #[test]
    fn test_api_error_constructor() {
        let err = Error::api(503, "Service Unavailable", "try later");
        match err {
            Error::Api {
                status,
                status_text,
                message,
            } => {
                assert_eq!(status, 503);
                assert_eq!(status_text, "Service Unavailable");
                assert_eq!(message, "try later");
            }
            _ => panic!("Expected Api error"),
        }
    }

    #[test]
    fn test_diff_and_file_errors() {
        let invalid_diff = Error::InvalidDiffFormat("hunk without file header".to_string());
        assert_eq!(
            invalid_diff.to_string(),
            "Invalid diff format: hunk without file header"
        );

        let invalid_path = Error::InvalidPath("../etc/passwd".to_string());
        assert_eq!(invalid_path.to_string(), "Invalid path: ../etc/passwd");

        let encoder = Error::EncoderUnavailable {
            model: "mystery-1".to_string(),
            reason: "unknown model".to_string(),
        };
        assert!(encoder.to_string().contains("mystery-1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error"));
    }
}
