//! Error types for the Cardpeek core.
//!
//! Every recoverable failure is a `CardpeekError`. Components convert these into
//! status values at their own boundary; nothing here is allowed to abort the
//! process.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Cardpeek core.
#[derive(Debug, Error)]
pub enum CardpeekError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    // Provisioning errors
    #[error("Embedded asset not found: {name}")]
    AssetMissing { name: String },

    #[error("Extraction of {archive} failed: {message}")]
    Extraction { archive: PathBuf, message: String },

    // Reader errors
    #[error("Failed to open smart card reader '{reader}': {message}")]
    ReaderOpen { reader: String, message: String },

    #[error("Failed to enumerate readers: {message}")]
    ReaderEnumeration { message: String },

    // Runtime errors
    #[error("Command failed: {message}")]
    Command { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Signal handler error: {message}")]
    Signal { message: String },
}

/// Result type alias for Cardpeek operations.
pub type Result<T> = std::result::Result<T, CardpeekError>;

/// Which recovery policy applies to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Directory/file I/O or archive problems while provisioning; retried next run.
    Provision,
    /// Transfer or replace problems while syncing; retried at the next window.
    Sync,
    /// Reader could not be opened; the run continues without a session.
    Reader,
    /// Everything else (configuration, runtime dispatch, handler setup).
    Internal,
}

impl From<std::io::Error> for CardpeekError {
    fn from(err: std::io::Error) -> Self {
        CardpeekError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CardpeekError {
    fn from(err: serde_json::Error) -> Self {
        CardpeekError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for CardpeekError {
    fn from(err: reqwest::Error) -> Self {
        CardpeekError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(unix)]
impl From<nix::Error> for CardpeekError {
    fn from(err: nix::Error) -> Self {
        CardpeekError::Signal {
            message: err.desc().to_string(),
        }
    }
}

impl CardpeekError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CardpeekError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Map the error onto its recovery policy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CardpeekError::AssetMissing { .. } | CardpeekError::Extraction { .. } => {
                ErrorCategory::Provision
            }

            CardpeekError::Network { .. } | CardpeekError::DownloadFailed { .. } => {
                ErrorCategory::Sync
            }

            CardpeekError::ReaderOpen { .. } | CardpeekError::ReaderEnumeration { .. } => {
                ErrorCategory::Reader
            }

            // Bare IO errors are counted as provisioning failures.
            CardpeekError::Io { .. } => ErrorCategory::Provision,

            _ => ErrorCategory::Internal,
        }
    }
}
