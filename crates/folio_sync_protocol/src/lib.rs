//! # Folio Sync Protocol
//!
//! Data model and conflict resolution for Folio sync.
//!
//! This crate provides:
//! - `Article` records and `ArticlePatch` partial updates
//! - Conflict classification (`ConflictType`)
//! - Deterministic conflict resolution (`ConflictStrategy`, `resolve`)
//! - `ConflictRecord` for conflicts surfaced to callers
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod article;
mod conflict;
mod error;

pub use article::{Article, ArticlePatch};
pub use conflict::{
    detect_conflicts, resolve, ConflictRecord, ConflictResolution, ConflictStrategy, ConflictType,
    Outcome, Resolution, Winner,
};
pub use error::{ProtocolError, ProtocolResult};
