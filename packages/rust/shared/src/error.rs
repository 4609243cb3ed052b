//! Error types for citeflow.
//!
//! Library crates use [`CiteflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all citeflow operations.
#[derive(Debug, thiserror::Error)]
pub enum CiteflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTTP request could not be issued or was rejected before streaming began.
    #[error("network error: {0}")]
    Network(String),

    /// The byte stream failed mid-read. Text received so far is kept.
    #[error("transport error: {message}")]
    Transport { message: String, partial: String },

    /// The upstream generator reported an error event.
    #[error("stream error: {message}")]
    Stream { message: String, partial: String },

    /// The byte stream ended without a completion or error event.
    #[error("stream ended before completion ({} bytes of answer text received)", partial.len())]
    Incomplete { partial: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, bad argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Parse error for structured input (event logs, markers).
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CiteflowError>;

impl CiteflowError {
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

    /// Answer text accumulated before a stream failure, if any.
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            Self::Transport { partial, .. }
            | Self::Stream { partial, .. }
            | Self::Incomplete { partial } => Some(partial),
            _ => None,
        }
    }

    /// Attach accumulated answer text to a stream failure.
    ///
    /// Errors raised below the accumulator carry an empty `partial`; the
    /// pipeline fills it in once it knows how much text was received.
    pub fn with_partial(self, text: &str) -> Self {
        match self {
            Self::Transport { message, .. } => Self::Transport {
                message,
                partial: text.to_string(),
            },
            Self::Stream { message, .. } => Self::Stream {
                message,
                partial: text.to_string(),
            },
            Self::Incomplete { .. } => Self::Incomplete {
                partial: text.to_string(),
            },
            other => other,
        }
    }
}
