//! Error types for fetch-dl
//!
//! This module provides:
//! - The crate-wide [`Error`] type used by fallible internal operations
//! - The closed [`ErrorCategory`] taxonomy reported to consumers of HTTP downloads
//! - A heuristic classifier mapping low-level failures onto that taxonomy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fetch-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetch-dl
///
/// Errors never escape a running task: they are converted into a single
/// terminal [`Event::Failed`](crate::types::Event::Failed). This type is what
/// the task internals propagate with `?` before that conversion happens.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "http.chunk_size")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to prepare a destination directory
    #[error("failed to create directory '{}': {source}", path.display())]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Network error reported by the HTTP client
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an error status before any byte was written
    #[error("server returned HTTP {status}")]
    HttpStatus {
        /// The HTTP status code (>= 400)
        status: u16,
    },

    /// External downloader executable could not be located or started
    #[error("{tool} not found; install it or configure tools.ytdlp_path")]
    ToolNotFound {
        /// Name of the missing tool
        tool: String,
    },

    /// External tool execution failed
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// User-facing category assigned to a failed HTTP download
///
/// The presentation layer maps each category onto localized text; the engine
/// only guarantees that exactly one category is attached to each failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// The connection was refused, reset or timed out
    NetworkInterrupted,
    /// The destination volume ran out of space
    InsufficientStorage,
    /// The destination could not be written
    PermissionDenied,
    /// Anything the heuristics do not recognise
    GeneralFailure,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::NetworkInterrupted => "NETWORK_INTERRUPTED",
            ErrorCategory::InsufficientStorage => "INSUFFICIENT_STORAGE",
            ErrorCategory::PermissionDenied => "PERMISSION_DENIED",
            ErrorCategory::GeneralFailure => "GENERAL_FAILURE",
        };
        f.write_str(s)
    }
}

impl ErrorCategory {
    /// Classify a crate error
    ///
    /// Message keywords are checked first (case-insensitive), then the
    /// structured kind of the underlying error. Unmatched errors fall back to
    /// [`ErrorCategory::GeneralFailure`].
    pub fn classify(error: &Error) -> Self {
        match error {
            // Only the io error itself is inspected; paths in our own message could contain keywords
            Error::Io(e) | Error::CreateDir { source: e, .. } => Self::classify_io(e),
            Error::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return ErrorCategory::NetworkInterrupted;
                }
                // reqwest wraps body read failures; the io error sits further down the chain
                let mut source = std::error::Error::source(e);
                while let Some(inner) = source {
                    if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                        return Self::classify_io(io);
                    }
                    if let Some(category) = Self::from_message(&inner.to_string()) {
                        return category;
                    }
                    source = inner.source();
                }
                ErrorCategory::GeneralFailure
            }
            other => Self::from_message(&other.to_string()).unwrap_or(ErrorCategory::GeneralFailure),
        }
    }

    /// Classify a raw I/O error
    pub fn classify_io(error: &std::io::Error) -> Self {
        Self::from_message(&error.to_string()).unwrap_or_else(|| Self::from_io_kind(error.kind()))
    }

    fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();

        if lower.contains("space") || lower.contains("disk") {
            return Some(ErrorCategory::InsufficientStorage);
        }
        if lower.contains("denied") || lower.contains("permission") {
            return Some(ErrorCategory::PermissionDenied);
        }
        if lower.contains("refused") || lower.contains("reset") || lower.contains("timed out") {
            return Some(ErrorCategory::NetworkInterrupted);
        }

        None
    }

    fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;

        match kind {
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                ErrorCategory::PermissionDenied
            }
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => {
                ErrorCategory::InsufficientStorage
            }
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ErrorCategory::NetworkInterrupted,
            _ => ErrorCategory::GeneralFailure,
        }
    }
}
