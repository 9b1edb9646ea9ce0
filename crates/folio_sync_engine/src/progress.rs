//! Progress reporting.
//!
//! A run reports through two channels: registered [`SyncListener`]s are
//! called synchronously, and a `tokio::sync::watch` channel always holds the
//! latest [`SyncProgress`] for pollers.

use crate::report::SyncReport;
use crate::state::SyncPhase;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

/// A progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// Current phase.
    pub phase: SyncPhase,
    /// Items processed in this phase.
    pub processed_items: usize,
    /// Items known for this phase.
    pub total_items: usize,
}

impl SyncProgress {
    /// The idle state.
    pub const IDLE: SyncProgress = SyncProgress {
        phase: SyncPhase::Idle,
        processed_items: 0,
        total_items: 0,
    };

    /// Completed fraction of the phase, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        (self.processed_items as f64 / self.total_items as f64).min(1.0)
    }
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Observer of sync runs. Every method defaults to a no-op.
///
/// Callbacks run on the sync task and must not block.
pub trait SyncListener: Send + Sync {
    /// Called when a run enters `phase`.
    fn on_phase_change(&self, phase: SyncPhase) {
        let _ = phase;
    }

    /// Called on phase entry and every few processed items.
    fn on_progress(&self, progress: &SyncProgress) {
        let _ = progress;
    }

    /// Called once with the report of every finished run.
    fn on_complete(&self, report: &SyncReport) {
        let _ = report;
    }
}

/// Fans progress out to listeners and the watch channel.
pub(crate) struct ProgressReporter {
    listeners: RwLock<Vec<Arc<dyn SyncListener>>>,
    sender: watch::Sender<SyncProgress>,
}

impl ProgressReporter {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(SyncProgress::IDLE);
        Self {
            listeners: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn SyncListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.sender.subscribe()
    }

    pub(crate) fn latest(&self) -> SyncProgress {
        *self.sender.borrow()
    }

    fn snapshot(&self) -> Vec<Arc<dyn SyncListener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn phase(&self, phase: SyncPhase, total_items: usize) {
        let progress = SyncProgress {
            phase,
            processed_items: 0,
            total_items,
        };
        self.sender.send_replace(progress);
        for listener in self.snapshot() {
            listener.on_phase_change(phase);
            listener.on_progress(&progress);
        }
    }

    /// Emits when `processed` hits a multiple of `interval` or the end of
    /// the phase.
    pub(crate) fn item(&self, processed: usize, interval: usize) {
        let mut progress = self.latest();
        progress.processed_items = processed;
        let boundary = interval > 0 && processed % interval == 0;
        if boundary || processed == progress.total_items {
            self.emit(progress);
        } else {
            self.sender.send_replace(progress);
        }
    }

    pub(crate) fn emit(&self, progress: SyncProgress) {
        self.sender.send_replace(progress);
        for listener in self.snapshot() {
            listener.on_progress(&progress);
        }
    }

    pub(crate) fn complete(&self, report: &SyncReport) {
        self.sender.send_replace(SyncProgress::IDLE);
        for listener in self.snapshot() {
            listener.on_complete(report);
        }
    }
}
