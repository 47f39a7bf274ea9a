//! # Error Handling Framework
//!
//! Structured error type shared across the pipeline. Every failure carries
//! one of five orthogonal kinds that drive the propagation policy:
//!
//! - `Transient`: retryable transport failures, timeouts, 5xx responses,
//!   rate-limit signals
//! - `Malformed`: external contract violations, non-decodable payloads
//! - `Integrity`: datastore constraint failures (treated as fatal when
//!   repeated, since the idempotence design should make them impossible)
//! - `Budget`: local token bucket exhausted beyond what the phase allows
//! - `Fatal`: configuration errors, missing credentials, datastore
//!   unreachable at startup

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Orthogonal failure kinds. Severity is a property of where the error
/// surfaces, not of the kind itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transient,
    Malformed,
    Integrity,
    Budget,
    Fatal,
}

/// Main error type for the opportunity pipeline.
#[derive(Debug, Clone, ThisError)]
#[error("{kind:?}: {message}")]
pub struct Error {
    /// Failure classification driving retry and abort policy
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Optional detailed description (payload fragments, SQL constraint)
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }

    pub fn budget(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Budget, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Attach detail text preserved for the audit trail.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Transient and budget failures may be retried; the rest may not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient | ErrorKind::Budget)
    }

    /// Fatal and integrity failures abort the run.
    pub fn aborts_run(&self) -> bool {
        matches!(self.kind, ErrorKind::Fatal | ErrorKind::Integrity)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.constraint().is_some() => {
                Error::integrity(format!("constraint violation: {db}"))
                    .with_details(db.constraint().unwrap_or_default().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Error::transient(format!("database I/O failure: {err}"))
            }
            sqlx::Error::RowNotFound => Error::integrity("expected row missing"),
            _ => Error::fatal(format!("database error: {err}")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::malformed(format!("JSON decode failure: {err}"))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::fatal(format!("configuration error: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::transient(format!("I/O failure: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_follows_kind() {
        assert!(Error::transient("timeout").is_retryable());
        assert!(Error::budget("bucket empty").is_retryable());
        assert!(!Error::malformed("bad payload").is_retryable());
        assert!(!Error::integrity("dup key").is_retryable());
        assert!(!Error::fatal("no credentials").is_retryable());
    }

    #[test]
    fn abort_policy_follows_kind() {
        assert!(Error::fatal("boom").aborts_run());
        assert!(Error::integrity("dup").aborts_run());
        assert!(!Error::transient("timeout").aborts_run());
    }

    #[test]
    fn details_are_preserved() {
        let err = Error::malformed("bad record").with_details("field price missing");
        assert_eq!(err.details.as_deref(), Some("field price missing"));
        assert_eq!(err.kind, ErrorKind::Malformed);
    }
}
