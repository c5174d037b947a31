//! Error types for Presswork.
//!
//! Library crates use [`PressworkError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::{Status, WorkItemKind};

/// Top-level error type for all Presswork operations.
#[derive(Debug, thiserror::Error)]
pub enum PressworkError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of generation (search lookups).
    #[error("network error: {0}")]
    Network(String),

    /// Parsing of generated output, metadata blocks, or input records.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A classified failure from the external generation gateway.
    #[error("generation error: {0}")]
    Gateway(#[from] GatewayError),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid input, bad flag value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A status transition the store refused (guard mismatch or illegal edge).
    #[error("invalid transition for {kind} #{id}: expected {expected}, found {actual}")]
    InvalidTransition {
        kind: WorkItemKind,
        id: i64,
        expected: String,
        actual: String,
    },

    /// A work item or content record that does not exist.
    #[error("{kind} #{id} not found")]
    NotFound { kind: String, id: i64 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PressworkError>;

impl PressworkError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an [`PressworkError::InvalidTransition`] from the statuses involved.
    pub fn invalid_transition(
        kind: WorkItemKind,
        id: i64,
        expected: impl std::fmt::Display,
        actual: Option<Status>,
    ) -> Self {
        Self::InvalidTransition {
            kind,
            id,
            expected: expected.to_string(),
            actual: actual.map_or_else(|| "none".to_string(), |s| s.to_string()),
        }
    }
}

/// Classified failures of a single generation call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Wall-clock limit hit; the call was cancelled and partial output discarded.
    #[error("generation timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    /// The generator process exited unsuccessfully.
    #[error("generator exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The generator succeeded but produced nothing usable.
    #[error("generator returned empty output")]
    EmptyOutput,

    /// The generator process could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Non-success HTTP status from a sync-http generator.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// HTTP 429 from the generation service.
    #[error("rate limited by generation service")]
    RateLimited,

    /// Connection-level failure talking to the generation service.
    #[error("transport error: {0}")]
    Transport(String),

    /// The temporary prompt resource could not be prepared.
    #[error("temporary prompt file: {0}")]
    TempResource(String),
}

impl GatewayError {
    /// Whether a later attempt with the same input could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited | Self::EmptyOutput | Self::Transport(_) => {
                true
            }
            Self::NonZeroExit { code, .. } => code.is_none(),
            Self::Http { status, .. } => *status >= 500,
            Self::Spawn { .. } | Self::TempResource(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PressworkError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = PressworkError::validation("limit must be positive");
        assert!(err.to_string().contains("limit must be positive"));
    }

    #[test]
    fn invalid_transition_display() {
        let err = PressworkError::invalid_transition(
            WorkItemKind::Keyword,
            7,
            Status::Backlog,
            Some(Status::Writing),
        );
        assert_eq!(
            err.to_string(),
            "invalid transition for keyword #7: expected backlog, found writing"
        );
    }

    #[test]
    fn gateway_error_classification() {
        assert!(
            GatewayError::Timeout {
                after: Duration::from_millis(100)
            }
            .is_transient()
        );
        assert!(GatewayError::RateLimited.is_transient());
        assert!(
            GatewayError::Http {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !GatewayError::Http {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !GatewayError::NonZeroExit {
                code: Some(1),
                stderr: "bad flag".into()
            }
            .is_transient()
        );
        assert!(
            GatewayError::NonZeroExit {
                code: None,
                stderr: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn gateway_error_converts() {
        let err: PressworkError = GatewayError::EmptyOutput.into();
        assert!(err.to_string().contains("empty output"));
    }
}
