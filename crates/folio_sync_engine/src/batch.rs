//! Batched, abortable execution of per-item operations.

use crate::error::{SyncError, SyncResult};
use crate::report::SyncFailure;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A shared cancellation flag.
///
/// Cloning shares the flag. Set by `stop_sync`, polled by the engine
/// between items, pages and phases.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Creates a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears the flag for a new run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`SyncError::Aborted`] if cancellation was requested.
    pub fn check(&self) -> SyncResult<()> {
        if self.is_aborted() {
            Err(SyncError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// What a [`BatchRunner::run`] call did.
#[derive(Debug)]
pub struct BatchOutcome<O> {
    /// Results of the items that succeeded, in input order.
    pub succeeded: Vec<O>,
    /// Failures, in input order. Ends with the abort marker when aborted.
    pub failed: Vec<SyncFailure>,
    /// Batches started.
    pub batches: usize,
    /// Items attempted.
    pub processed: usize,
    /// True if the run stopped on the abort signal.
    pub aborted: bool,
}

impl<O> BatchOutcome<O> {
    fn empty() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            batches: 0,
            processed: 0,
            aborted: false,
        }
    }
}

/// Runs an operation over items in sequential chunks of at most
/// `batch_size`, isolating per-item failures.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    batch_size: usize,
    signal: AbortSignal,
}

impl BatchRunner {
    /// Creates a runner. A zero batch size is treated as one.
    pub fn new(batch_size: usize, signal: AbortSignal) -> Self {
        Self {
            batch_size: batch_size.max(1),
            signal,
        }
    }

    /// Returns the effective batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs `operation` over `items`.
    ///
    /// `label` names the operation for an item in failure records.
    /// `on_progress` is called with the running count after each item. The
    /// abort signal is checked before every item; on abort the outcome
    /// holds what was processed so far plus one abort failure.
    pub async fn run<T, O, L, F, Fut, P>(
        &self,
        items: Vec<T>,
        label: L,
        mut operation: F,
        mut on_progress: P,
    ) -> BatchOutcome<O>
    where
        L: Fn(&T) -> String,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = SyncResult<O>>,
        P: FnMut(usize),
    {
        let mut outcome = BatchOutcome::empty();
        let mut items = items.into_iter().peekable();

        while items.peek().is_some() {
            if self.signal.is_aborted() {
                return Self::stop(outcome);
            }
            let chunk: Vec<T> = items.by_ref().take(self.batch_size).collect();
            outcome.batches += 1;
            debug!(batch = outcome.batches, size = chunk.len(), "dispatching batch");

            for item in chunk {
                if self.signal.is_aborted() {
                    return Self::stop(outcome);
                }
                let name = label(&item);
                match operation(item).await {
                    Ok(result) => outcome.succeeded.push(result),
                    Err(SyncError::Aborted) => {
                        outcome.processed += 1;
                        return Self::stop(outcome);
                    }
                    Err(err) => {
                        warn!(operation = %name, error = %err, "item failed");
                        outcome.failed.push(SyncFailure::from_error(name, &err));
                    }
                }
                outcome.processed += 1;
                on_progress(outcome.processed);
            }
        }

        outcome
    }

    fn stop<O>(mut outcome: BatchOutcome<O>) -> BatchOutcome<O> {
        debug!(processed = outcome.processed, "batch run aborted");
        outcome.aborted = true;
        outcome.failed.push(SyncFailure::aborted());
        outcome
    }
}
