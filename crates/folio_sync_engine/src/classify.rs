//! Failure classification.
//!
//! Every failure recorded during a run is labelled with an [`ErrorKind`] and
//! a retryable flag. The flag says whether a *future* run could succeed; the
//! engine itself never retries.

use crate::error::SyncError;

/// Taxonomy of sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connectivity or timeout.
    Network,
    /// 401/403 from the remote.
    Auth,
    /// 5xx from the remote.
    Server,
    /// Other 4xx, or a record the remote or protocol rejected.
    Validation,
    /// Local read or write failure.
    Storage,
    /// Cooperative cancellation.
    Aborted,
    /// Anything unstructured.
    Unknown,
}

impl ErrorKind {
    /// Returns true if failures of this kind are worth retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server)
    }

    /// Returns a short hint for the user, if this kind needs one.
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Auth => Some("re-authenticate"),
            ErrorKind::Storage => Some("local data may be inconsistent"),
            _ => None,
        }
    }
}

/// Classification of a single failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Taxonomy kind.
    pub kind: ErrorKind,
    /// Whether a later retry could succeed.
    pub retryable: bool,
}

impl From<ErrorKind> for Classification {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
        }
    }
}

/// Classifies an HTTP status code.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        // Request timeout and rate limiting behave like connectivity trouble.
        408 | 429 => ErrorKind::Network,
        400..=499 => ErrorKind::Validation,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

/// Classifies a failure.
///
/// Unknown errors are never retryable.
pub fn classify(error: &SyncError) -> Classification {
    let kind = match error {
        SyncError::Network(_) | SyncError::Timeout(_) => ErrorKind::Network,
        SyncError::Http { status, .. } => classify_status(*status),
        SyncError::NotFound { .. } | SyncError::Protocol(_) => ErrorKind::Validation,
        SyncError::Storage(_) => ErrorKind::Storage,
        SyncError::Aborted => ErrorKind::Aborted,
        SyncError::Serialization(_)
        | SyncError::AlreadyRunning
        | SyncError::InvalidConfig(_)
        | SyncError::Other(_) => ErrorKind::Unknown,
    };
    kind.into()
}
