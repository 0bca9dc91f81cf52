//! Error types for canillita.
//!
//! Every [`Error`] belongs to exactly one [`ErrorKind`]. The kind decides what
//! the job state machine does with a failure; the variant carries the
//! human-readable detail that ends up in logs and processed-post records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using canillita's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy shared by extraction, delivery and the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network timeout, rate limiting, database hiccup. Retried with backoff.
    Transient,
    /// Content fetched but failed the quality gate.
    LowQuality,
    /// Malformed URL, unsupported content kind. Never retried.
    Permanent,
    /// Document did not contain anything the selectors could use.
    Unparseable,
    /// Requested resource does not exist (e.g. no transcript).
    NotFound,
    /// A backend service (summarizer) is down. Retried like Transient.
    Unavailable,
    /// Duplicate lease, schema mismatch. Fatal for the worker that saw it.
    InvariantViolation,
}

impl ErrorKind {
    /// Whether a job failing with this kind goes back to the queue.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Unavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::LowQuality => "low_quality",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Unparseable => "unparseable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InvariantViolation => "invariant_violation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transient" => Ok(ErrorKind::Transient),
            "low_quality" => Ok(ErrorKind::LowQuality),
            "permanent" => Ok(ErrorKind::Permanent),
            "unparseable" => Ok(ErrorKind::Unparseable),
            "not_found" => Ok(ErrorKind::NotFound),
            "unavailable" => Ok(ErrorKind::Unavailable),
            "invariant_violation" => Ok(ErrorKind::InvariantViolation),
            other => Err(Error::InvalidInput(format!("unknown error kind: {}", other))),
        }
    }
}

/// Core error type for canillita operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Document or API fetch failed at the transport level
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A network call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Remote side asked us to slow down
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Backend service unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Extraction failed the quality gate
    #[error("Low quality content: {0}")]
    LowQuality(String),

    /// Document had no usable content nodes
    #[error("Unparseable document: {0}")]
    Unparseable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content kind the pipeline does not handle
    #[error("Unsupported content: {0}")]
    Unsupported(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure that will not improve on retry
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Queue or store state contradicts its own invariants
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Database(_)
            | Error::Fetch(_)
            | Error::Timeout(_)
            | Error::RateLimited(_)
            | Error::Request(_)
            | Error::Io(_) => ErrorKind::Transient,
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::LowQuality(_) => ErrorKind::LowQuality,
            Error::Unparseable(_) => ErrorKind::Unparseable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Error::Unsupported(_)
            | Error::InvalidInput(_)
            | Error::Permanent(_)
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::Internal(_) => ErrorKind::Permanent,
        }
    }

    /// Rebuild an error from a recorded kind and message.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Transient => Error::Fetch(message),
            ErrorKind::LowQuality => Error::LowQuality(message),
            ErrorKind::Permanent => Error::Permanent(message),
            ErrorKind::Unparseable => Error::Unparseable(message),
            ErrorKind::NotFound => Error::NotFound(message),
            ErrorKind::Unavailable => Error::Unavailable(message),
            ErrorKind::InvariantViolation => Error::InvariantViolation(message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidInput(format!("malformed URL: {}", e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Error::Timeout(e.to_string());
        }
        if let Some(status) = e.status() {
            return Error::from_status(status.as_u16(), e.to_string());
        }
        if e.is_connect() {
            return Error::Fetch(e.to_string());
        }
        Error::Request(e.to_string())
    }
}

impl Error {
    /// Map an HTTP status code to the matching error variant.
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            408 => Error::Timeout(format!("HTTP {}: {}", status, context)),
            429 => Error::RateLimited(format!("HTTP {}: {}", status, context)),
            400..=499 => Error::Permanent(format!("HTTP {}: {}", status, context)),
            _ => Error::Fetch(format!("HTTP {}: {}", status, context)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_fetch() {
        let err = Error::Fetch("connection reset".to_string());
        assert_eq!(err.to_string(), "Fetch error: connection reset");
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout("fetch after 15s".to_string());
        assert_eq!(err.to_string(), "Timed out: fetch after 15s");
    }

    #[test]
    fn test_error_display_low_quality() {
        let err = Error::LowQuality("text too short".to_string());
        assert_eq!(err.to_string(), "Low quality content: text too short");
    }

    #[test]
    fn test_error_display_unparseable() {
        let err = Error::Unparseable("no selector matched".to_string());
        assert_eq!(err.to_string(), "Unparseable document: no selector matched");
    }

    #[test]
    fn test_error_display_unsupported() {
        let err = Error::Unsupported("application/pdf".to_string());
        assert_eq!(err.to_string(), "Unsupported content: application/pdf");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing selectors".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing selectors");
    }

    #[test]
    fn test_error_display_invariant() {
        let err = Error::InvariantViolation("job leased twice".to_string());
        assert_eq!(err.to_string(), "Invariant violation: job leased twice");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_kind_transient_variants() {
        assert_eq!(Error::Fetch("x".into()).kind(), ErrorKind::Transient);
        assert_eq!(Error::Timeout("x".into()).kind(), ErrorKind::Transient);
        assert_eq!(Error::RateLimited("x".into()).kind(), ErrorKind::Transient);
        assert_eq!(Error::Request("x".into()).kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_kind_permanent_variants() {
        assert_eq!(Error::Unsupported("x".into()).kind(), ErrorKind::Permanent);
        assert_eq!(Error::InvalidInput("x".into()).kind(), ErrorKind::Permanent);
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::LowQuality.is_retryable());
        assert!(!ErrorKind::Permanent.is_retryable());
        assert!(!ErrorKind::Unparseable.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::InvariantViolation.is_retryable());
    }

    #[test]
    fn test_from_kind_preserves_kind() {
        let kinds = [
            ErrorKind::Transient,
            ErrorKind::LowQuality,
            ErrorKind::Permanent,
            ErrorKind::Unparseable,
            ErrorKind::NotFound,
            ErrorKind::Unavailable,
            ErrorKind::InvariantViolation,
        ];
        for kind in kinds {
            assert_eq!(Error::from_kind(kind, "msg").kind(), kind);
        }
    }

    #[test]
    fn test_error_kind_parse() {
        assert_eq!("low_quality".parse::<ErrorKind>().unwrap(), ErrorKind::LowQuality);
        assert_eq!(
            ErrorKind::InvariantViolation.to_string(),
            "invariant_violation"
        );
        assert!("bogus".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn test_from_status_mapping() {
        assert_eq!(Error::from_status(429, "u").kind(), ErrorKind::Transient);
        assert_eq!(Error::from_status(408, "u").kind(), ErrorKind::Transient);
        assert_eq!(Error::from_status(503, "u").kind(), ErrorKind::Transient);
        assert_eq!(Error::from_status(404, "u").kind(), ErrorKind::Permanent);
        assert_eq!(Error::from_status(403, "u").kind(), ErrorKind::Permanent);
        assert!(Error::from_status(500, "https://x").to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_from_url_parse_error() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("malformed URL"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_serde_yaml_error() {
        let yaml_err = serde_yaml::from_str::<Vec<i32>>("{ not: [a list").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
