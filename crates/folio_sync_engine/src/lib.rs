//! # Folio Sync Engine
//!
//! Offline-first sync engine for Folio articles.
//!
//! This crate provides:
//! - Sync orchestrator state machine (idle → uploading → downloading →
//!   resolving → finalizing)
//! - Batched, abortable per-item execution with failure isolation
//! - Change-set queries against the local store and the remote API
//! - Failure classification (retryable or not, with a taxonomy kind)
//! - Progress listeners and a progress watch channel
//! - HTTP remote abstraction
//! - In-memory store and remote for tests and dry runs
//!
//! ## Architecture
//!
//! The engine implements an **upload-then-download** model:
//! 1. Push locally modified articles to the remote
//! 2. Pull remote changes since the last successful sync
//! 3. Resolve conflicts between dirty local copies and remote versions
//! 4. Record the run and advance the sync timestamp
//!
//! ## Key Invariants
//!
//! - At most one run is active per orchestrator
//! - Every run that starts produces exactly one [`SyncReport`]
//! - Per-item failures never stop a batch
//! - Local writes are single-record partial updates keyed by id
//! - Cancellation is observed between items and keeps committed writes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod changeset;
mod classify;
mod config;
mod error;
mod http;
mod progress;
mod remote;
mod report;
mod state;
mod store;

pub use batch::{AbortSignal, BatchOutcome, BatchRunner};
pub use changeset::ChangeSetBuilder;
pub use classify::{classify, classify_status, Classification, ErrorKind};
pub use config::{SyncConfig, SyncConfigUpdate, DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_INTERVAL};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRemote, HttpRequest, HttpResponse, Method};
pub use progress::{SyncListener, SyncProgress};
pub use remote::{
    with_timeout, ArticlePage, FetchRequest, MockFailure, MockRemote, RemoteApi, RemoteOp,
};
pub use report::{SyncFailure, SyncReport, SyncStats, RUN_OPERATION};
pub use state::{SyncOrchestrator, SyncPhase, SyncRunState};
pub use store::{LocalStore, MemoryStore};

pub use folio_sync_protocol::{
    Article, ArticlePatch, ConflictRecord, ConflictResolution, ConflictStrategy, ConflictType,
    Winner,
};
