//! Error types for store, transformation and execution failures
//!
//! Every failure that crosses a component boundary is a [`FlowError`] so the
//! engine and pipeline can report a machine-checkable [`ErrorKind`] next to
//! the human-readable message.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the execution core
pub type Result<T> = std::result::Result<T, FlowError>;

/// Discoverable category of a [`FlowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or insufficient store/mapping configuration
    Config,
    /// Store unreachable or connection unusable
    Connection,
    /// Unrecognised file format
    UnsupportedFormat,
    /// Unrecognised or unimplemented write mode
    UnsupportedMode,
    /// A transformation step failed
    Transformation,
    /// Local file system failure
    Io,
    /// Data that cannot be decoded or does not fit the dataset model
    Data,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Connection => "connection",
            Self::UnsupportedFormat => "unsupported_format",
            Self::UnsupportedMode => "unsupported_mode",
            Self::Transformation => "transformation",
            Self::Io => "io",
            Self::Data => "data",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised by stores, transformations and the execution engine
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported write mode '{mode}': {reason}")]
    UnsupportedMode { mode: String, reason: String },

    #[error("Transformation '{step}' failed: {message}")]
    Transformation { step: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data error: {0}")]
    Data(String),
}

impl FlowError {
    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) => ErrorKind::Connection,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::UnsupportedMode { .. } => ErrorKind::UnsupportedMode,
            Self::Transformation { .. } => ErrorKind::Transformation,
            Self::Io { .. } => ErrorKind::Io,
            Self::Data(_) => ErrorKind::Data,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_mode(mode: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedMode {
            mode: mode.into(),
            reason: reason.into(),
        }
    }

    pub fn transformation(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transformation {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for FlowError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::NotADatabase
                ) =>
            {
                Self::Connection(e.to_string())
            }
            other => Self::Data(other.to_string()),
        }
    }
}

impl From<csv::Error> for FlowError {
    fn from(e: csv::Error) -> Self {
        Self::Data(format!("CSV: {}", e))
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Data(format!("JSON: {}", e))
    }
}

impl From<arrow::error::ArrowError> for FlowError {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::Data(format!("Arrow: {}", e))
    }
}

impl From<parquet::errors::ParquetError> for FlowError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Self::Data(format!("Parquet: {}", e))
    }
}
