//! Error types for the sync engine.

use crate::classify::{classify, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Connectivity failure before a response was received.
    #[error("network error: {0}")]
    Network(String),

    /// A remote call did not complete in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The remote answered with a non-success status.
    #[error("remote returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response message.
        message: String,
    },

    /// The remote has no article with this id.
    #[error("article {id} not found on remote")]
    NotFound {
        /// Article ID.
        id: String,
    },

    /// Local store read or write failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid record received from a collaborator.
    #[error("invalid record: {0}")]
    Protocol(#[from] folio_sync_protocol::ProtocolError),

    /// A sync run is already active.
    #[error("sync already in progress")]
    AlreadyRunning,

    /// The run was cancelled.
    #[error("aborted")]
    Aborted,

    /// Configuration rejected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Unstructured failure.
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        classify(self).kind
    }

    /// Returns true if retrying later could succeed.
    pub fn is_retryable(&self) -> bool {
        classify(self).retryable
    }

    /// Returns true if this is the remote reporting a missing article.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. } | SyncError::Http { status: 404, .. })
    }
}
