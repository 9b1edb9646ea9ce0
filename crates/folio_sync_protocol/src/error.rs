//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised when a record or patch is structurally invalid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Article has an empty identifier.
    #[error("article id must not be empty")]
    EmptyId,

    /// Article was last updated before it was created.
    #[error("article {id} has updated_at earlier than created_at")]
    TimestampOrder {
        /// Article ID.
        id: String,
    },

    /// Patch carries no field to update.
    #[error("patch for article {id} is empty")]
    EmptyPatch {
        /// Article ID.
        id: String,
    },
}
