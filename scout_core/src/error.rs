// src/error.rs
use std::time::Duration;

/// Failure of a single backend call.
///
/// Transient errors are retried by the execution engine; permanent errors
/// fail the task on the first attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent error: {0}")]
    Permanent(String),
}

impl BackendError {
    pub fn transient(msg: impl Into<String>) -> Self {
        BackendError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        BackendError::Permanent(msg.into())
    }

    pub fn timeout(after: Duration) -> Self {
        BackendError::Transient(format!("timeout after {}ms", after.as_millis()))
    }

    /// Classify a non-success HTTP status from a provider.
    pub fn from_status(backend: &str, status: u16, body: &str) -> Self {
        let body = body.trim();
        let detail = if body.len() > 200 {
            let mut end = 200;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        } else {
            body.to_string()
        };
        let msg = format!("{} API error: {} - {}", backend, status, detail);
        if is_transient_status(status) {
            BackendError::Transient(msg)
        } else {
            BackendError::Permanent(msg)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::Transient(msg) | BackendError::Permanent(msg) => msg,
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            BackendError::Transient(_) => "transient",
            BackendError::Permanent(_) => "permanent",
        }
    }
}

/// Statuses worth retrying: rate limiting, request timeouts and server errors.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..600).contains(&status)
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if is_transient_status(status.as_u16()) {
                return BackendError::Transient(err.to_string());
            }
            return BackendError::Permanent(err.to_string());
        }
        if err.is_decode() || err.is_builder() {
            BackendError::Permanent(err.to_string())
        } else {
            // timeouts, connection resets, dns failures
            BackendError::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Permanent(format!("unparseable reply: {}", err))
    }
}

/// Failure of the content-quality rater. Never aborts an evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("rater unavailable: {0}")]
    Unavailable(String),

    #[error("invalid rater response: {0}")]
    InvalidResponse(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure of the query generator. The controller falls back to templates.
#[derive(Debug, thiserror::Error)]
pub enum QueryGenerationError {
    #[error("query generator unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query generator response: {0}")]
    InvalidResponse(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Fatal setup problems, raised before any search is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no usable search backends (requested: {requested})")]
    NoBackendsAvailable { requested: String },

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ConfigurationError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ConfigurationError::NoBackendsAvailable { .. } => "no_backends",
            ConfigurationError::UnknownBackend(_) => "unknown_backend",
            ConfigurationError::InvalidRequest(_) => "invalid_request",
            ConfigurationError::Invalid(_) => "invalid_config",
            ConfigurationError::Io(_) => "io_error",
            ConfigurationError::Parse(_) => "parse_error",
            ConfigurationError::Serialize(_) => "serialize_error",
            ConfigurationError::Http(_) => "http_client",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(BackendError::from_status("brave", 429, "slow down").is_transient());
        assert!(BackendError::from_status("brave", 503, "").is_transient());
        assert!(!BackendError::from_status("brave", 401, "bad key").is_transient());
        assert!(!BackendError::from_status("brave", 400, "").is_transient());
    }

    #[test]
    fn test_status_message_truncated() {
        let body = "x".repeat(500);
        let err = BackendError::from_status("tavily", 500, &body);
        assert!(err.message().starts_with("tavily API error: 500 - "));
        assert!(err.message().ends_with("..."));
        assert!(err.message().len() < 260);
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = BackendError::timeout(Duration::from_millis(1500));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "transient error: timeout after 1500ms");
        assert_eq!(err.code_str(), "transient");
    }

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::NoBackendsAvailable {
            requested: "tavily, brave".into(),
        };
        assert_eq!(
            err.to_string(),
            "no usable search backends (requested: tavily, brave)"
        );
        assert_eq!(err.code_str(), "no_backends");
    }
}
