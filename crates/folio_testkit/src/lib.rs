//! # Folio Testkit
//!
//! Test utilities for Folio sync.
//!
//! This crate provides:
//! - Article fixtures and a builder for hand-written scenarios
//! - Property-based test generators using proptest
//! - Tracing setup for test binaries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn uploads_dirty_articles() {
//!     init_tracing();
//!     let store = MemoryStore::with_articles(dirty_articles(10));
//!     // ... run a sync
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

/// Installs a test-friendly tracing subscriber.
///
/// Filtered by `RUST_LOG`, defaulting to `warn`. Safe to call from every
/// test; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
