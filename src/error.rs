//! Error types for issuecrawl.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=auth, 4=misconfiguration, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for issuecrawl operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the exit code, tooling on the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,

    // Authentication (exit 3)
    AuthFailed,

    // Misconfiguration (exit 4)
    ConfigError,
    TrackerUnreachable,
    NoIssuesFound,
    InvalidArgument,

    // Tracker worker (exit 5)
    WorkerFailed,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::AuthFailed => "AUTH_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::TrackerUnreachable => "TRACKER_UNREACHABLE",
            Self::NoIssuesFound => "NO_ISSUES_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::WorkerFailed => "WORKER_FAILED",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::AuthFailed => 3,
            Self::ConfigError
            | Self::TrackerUnreachable
            | Self::NoIssuesFound
            | Self::InvalidArgument => 4,
            Self::WorkerFailed => 5,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running the same command unchanged can succeed.
    ///
    /// Only database contention and worker failures (network flakiness,
    /// exhausted retries) qualify. Configuration problems never do.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError | Self::WorkerFailed)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in issuecrawl operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database not found at {path}: run `issuecrawl crawl` first")]
    NotInitialized { path: PathBuf },

    #[error("Authentication failed for tracker '{tracker}': {message}")]
    Auth { tracker: String, message: String },

    #[error("Tracker '{tracker}' is unreachable: {message}")]
    Unreachable { tracker: String, message: String },

    #[error("No issues found on tracker '{tracker}'")]
    NoIssuesFound { tracker: String },

    #[error("Tracker '{tracker}' failed: {message}")]
    Worker { tracker: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Auth { .. } => ErrorCode::AuthFailed,
            Self::Unreachable { .. } => ErrorCode::TrackerUnreachable,
            Self::NoIssuesFound { .. } => ErrorCode::NoIssuesFound,
            Self::Worker { .. } => ErrorCode::WorkerFailed,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether this error must abort the whole process rather than one worker.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::Unreachable { .. } | Self::NoIssuesFound { .. } | Self::Config(_)
        )
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { path } => Some(format!(
                "No database at {}. Run `issuecrawl crawl` to create it, or pass --db.",
                path.display()
            )),
            Self::Auth { tracker, .. } => Some(format!(
                "Check the token/user configured for '{tracker}' (or the env var named by `token_env`)."
            )),
            Self::Unreachable { tracker, .. } => Some(format!(
                "Verify the url of '{tracker}' and that the host is reachable from this machine."
            )),
            Self::NoIssuesFound { tracker } => Some(format!(
                "The first fetch for '{tracker}' returned nothing. Check `project` and `url`; \
                 a tracker with zero issues is almost always a misconfiguration."
            )),
            Self::Config(_) => Some(
                "Run `issuecrawl check-config` to validate the configuration file.".to_string(),
            ),
            Self::Database(_)
            | Self::Worker { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
