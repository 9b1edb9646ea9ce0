//! Sync orchestrator state machine.
//!
//! A run moves through the phases in order and always returns to
//! [`SyncPhase::Idle`]:
//!
//! ```text
//! Idle → UploadingChanges → DownloadingUpdates → ResolvingConflicts → Finalizing → Idle
//! ```
//!
//! Uploads drain before downloads start. Downloads that meet a dirty local
//! copy are held back and decided in the resolving phase, so a record is
//! never written before its conflict is settled.

use crate::batch::{AbortSignal, BatchOutcome, BatchRunner};
use crate::changeset::ChangeSetBuilder;
use crate::config::{SyncConfig, SyncConfigUpdate};
use crate::error::{SyncError, SyncResult};
use crate::progress::{ProgressReporter, SyncListener, SyncProgress};
use crate::remote::{with_timeout, RemoteApi};
use crate::report::{SyncFailure, SyncReport, SyncStats};
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use folio_sync_protocol::{
    resolve, Article, ArticlePatch, ConflictRecord, ConflictStrategy, Winner,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Phase of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// No run is active.
    Idle,
    /// Pushing locally modified articles.
    UploadingChanges,
    /// Pulling the remote change set.
    DownloadingUpdates,
    /// Deciding conflicts found while downloading.
    ResolvingConflicts,
    /// Recording the run.
    Finalizing,
}

impl SyncPhase {
    /// Returns true for every phase except `Idle`.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncPhase::Idle)
    }

    /// Returns the name of this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "IDLE",
            SyncPhase::UploadingChanges => "UPLOADING_CHANGES",
            SyncPhase::DownloadingUpdates => "DOWNLOADING_UPDATES",
            SyncPhase::ResolvingConflicts => "RESOLVING_CONFLICTS",
            SyncPhase::Finalizing => "FINALIZING",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the orchestrator's run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRunState {
    /// A run is active.
    pub running: bool,
    /// Cancellation was requested for the active run.
    pub abort_requested: bool,
    /// Current phase.
    pub phase: SyncPhase,
    /// Items processed in the current phase.
    pub processed_items: usize,
    /// Items known for the current phase.
    pub total_items: usize,
}

/// Releases the running flag when a run ends, however it ends.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    phase: &'a RwLock<SyncPhase>,
    signal: &'a AbortSignal,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.phase.write() = SyncPhase::Idle;
        self.signal.reset();
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Why a run stopped before finalizing.
enum Halt {
    Aborted,
    Failed(SyncFailure),
}

fn halt(operation: &'static str) -> impl FnOnce(SyncError) -> Halt {
    move |err| match err {
        SyncError::Aborted => Halt::Aborted,
        err => Halt::Failed(SyncFailure::from_error(operation, &err)),
    }
}

/// Result of pushing one dirty article.
enum Upload {
    /// Written to the remote and marked clean.
    Pushed,
    /// Deleted locally and absent remotely; marked clean.
    Retired,
    /// The remote changed since the last sync; carried to conflict handling.
    Deferred(Article),
}

/// Result of applying one downloaded article.
enum Download {
    Created,
    Overwritten,
    Unchanged,
    Converged,
    /// Dirty locally, unchanged remotely since the last sync; left for upload.
    LocalAhead,
    Conflict { local: Article, remote: Article },
}

/// Per-run accumulator.
struct RunLog {
    started_at: DateTime<Utc>,
    synced: u64,
    errors: Vec<SyncFailure>,
    conflicts: Vec<ConflictRecord>,
    upload_batches: usize,
    download_batches: usize,
    download_failures: usize,
}

impl RunLog {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            synced: 0,
            errors: Vec::new(),
            conflicts: Vec::new(),
            upload_batches: 0,
            download_batches: 0,
            download_failures: 0,
        }
    }

    /// Keeps item failures and reports whether the batch stopped on abort.
    fn absorb<O>(&mut self, outcome: &mut BatchOutcome<O>) -> Result<usize, Halt> {
        let failures: Vec<SyncFailure> = outcome
            .failed
            .drain(..)
            .filter(|f| !f.is_abort())
            .collect();
        let count = failures.len();
        self.errors.extend(failures);
        if outcome.aborted {
            Err(Halt::Aborted)
        } else {
            Ok(count)
        }
    }

    fn finish(self, success: bool, duration: Duration) -> SyncReport {
        SyncReport {
            success,
            synced_count: self.synced,
            conflict_count: self.conflicts.len() as u64,
            error_count: self.errors.len() as u64,
            errors: self.errors,
            conflicts: self.conflicts,
            upload_batches: self.upload_batches,
            download_batches: self.download_batches,
            started_at: self.started_at,
            duration,
        }
    }
}

/// Coordinates sync runs between a local store and a remote API.
///
/// One orchestrator owns the run state for one local store. Construct it
/// once at startup and share it behind an `Arc`.
pub struct SyncOrchestrator<S: LocalStore + ?Sized, R: RemoteApi + ?Sized> {
    config: RwLock<SyncConfig>,
    store: Arc<S>,
    remote: Arc<R>,
    running: AtomicBool,
    signal: AbortSignal,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
    pending: RwLock<Vec<ConflictRecord>>,
    progress: ProgressReporter,
}

impl<S: LocalStore + ?Sized, R: RemoteApi + ?Sized> SyncOrchestrator<S, R> {
    /// Creates an idle orchestrator.
    pub fn new(config: SyncConfig, store: Arc<S>, remote: Arc<R>) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            store,
            remote,
            running: AtomicBool::new(false),
            signal: AbortSignal::new(),
            phase: RwLock::new(SyncPhase::Idle),
            stats: RwLock::new(SyncStats::default()),
            pending: RwLock::new(Vec::new()),
            progress: ProgressReporter::new(),
        })
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the remote API.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> SyncConfig {
        self.config.read().clone()
    }

    /// Applies a partial configuration change.
    ///
    /// An active run keeps the configuration it started with.
    pub fn update_config(&self, update: &SyncConfigUpdate) -> SyncResult<()> {
        let mut config = self.config.write();
        *config = config.merged(update)?;
        debug!(?update, "sync config updated");
        Ok(())
    }

    /// Returns true while a run is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the run state.
    pub fn run_state(&self) -> SyncRunState {
        let running = self.is_running();
        let progress = if running {
            self.progress.latest()
        } else {
            SyncProgress::IDLE
        };
        SyncRunState {
            running,
            abort_requested: running && self.signal.is_aborted(),
            phase: *self.phase.read(),
            processed_items: progress.processed_items,
            total_items: progress.total_items,
        }
    }

    /// Returns counters aggregated over every finished run.
    pub fn sync_stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Registers a listener for phase, progress and completion events.
    pub fn add_listener(&self, listener: Arc<dyn SyncListener>) {
        self.progress.add_listener(listener);
    }

    /// Subscribes to the latest progress.
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Returns the conflicts left for manual resolution by the last run.
    pub fn pending_conflicts(&self) -> Vec<ConflictRecord> {
        self.pending.read().clone()
    }

    /// Requests cancellation of the active run. Does nothing when idle.
    pub fn stop_sync(&self) {
        if self.is_running() {
            info!("sync stop requested");
            self.signal.abort();
        }
    }

    fn acquire(&self) -> SyncResult<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.signal.reset();
        Ok(RunGuard {
            running: &self.running,
            phase: &self.phase,
            signal: &self.signal,
        })
    }

    /// Runs one full reconciliation.
    ///
    /// Fails only with [`SyncError::AlreadyRunning`] when another run is
    /// active. Every run that starts returns a report, whatever happens
    /// inside it.
    pub async fn start_full_sync(&self) -> SyncResult<SyncReport> {
        let guard = match self.acquire() {
            Ok(guard) => guard,
            Err(err) => {
                warn!("sync requested while a run is active");
                return Err(err);
            }
        };

        let config = self.config();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            batch_size = config.batch_size,
            strategy = ?config.conflict_strategy,
            "sync started"
        );

        let mut log = RunLog::new(started_at);
        let (success, aborted) = match self.execute(&config, &mut log).await {
            Ok(()) => (true, false),
            Err(Halt::Aborted) => {
                warn!("sync aborted");
                log.errors.push(SyncFailure::aborted());
                (false, true)
            }
            Err(Halt::Failed(failure)) => {
                error!(operation = %failure.operation, error = %failure.error, "sync failed");
                log.errors.push(failure);
                (false, false)
            }
        };
        let report = log.finish(success, clock.elapsed());

        self.stats.write().record(&report);
        if !aborted {
            *self.pending.write() = report.pending_conflicts().cloned().collect();
        }
        drop(guard);

        info!(
            success = report.success,
            synced = report.synced_count,
            conflicts = report.conflict_count,
            errors = report.error_count,
            duration_ms = report.duration.as_millis() as u64,
            "sync finished"
        );
        self.progress.complete(&report);
        Ok(report)
    }

    fn enter(&self, phase: SyncPhase, total_items: usize) {
        *self.phase.write() = phase;
        info!(%phase, total_items, "sync phase");
        self.progress.phase(phase, total_items);
    }

    async fn execute(&self, config: &SyncConfig, log: &mut RunLog) -> Result<(), Halt> {
        let changes = ChangeSetBuilder::new(
            &*self.store,
            &*self.remote,
            config.batch_size,
            config.request_timeout,
            self.signal.clone(),
        );
        let runner = BatchRunner::new(config.batch_size, self.signal.clone());
        let timeout = config.request_timeout;
        let interval = config.progress_interval;
        let this = self;

        // Upload.
        *self.phase.write() = SyncPhase::UploadingChanges;
        let dirty = changes.local_dirty().await.map_err(halt("read_local_changes"))?;
        self.enter(SyncPhase::UploadingChanges, dirty.len());
        let mut uploads = runner
            .run(
                dirty,
                |a| format!("upload_article_{}", a.id),
                move |article| this.upload(article, timeout),
                move |n| this.progress.item(n, interval),
            )
            .await;
        log.upload_batches = uploads.batches;
        let mut deferred = Vec::new();
        for upload in uploads.succeeded.drain(..) {
            match upload {
                Upload::Pushed | Upload::Retired => log.synced += 1,
                Upload::Deferred(remote) => deferred.push(remote),
            }
        }
        log.absorb(&mut uploads)?;
        self.signal.check().map_err(halt("sync"))?;

        // Download.
        *self.phase.write() = SyncPhase::DownloadingUpdates;
        let since = self
            .store
            .get_last_sync_timestamp()
            .await
            .map_err(halt("read_local_changes"))?;
        let mut incoming = changes
            .remote_since(since)
            .await
            .map_err(halt("fetch_remote_changes"))?;
        for remote in deferred {
            if !incoming.iter().any(|a| a.id == remote.id) {
                incoming.push(remote);
            }
        }
        self.enter(SyncPhase::DownloadingUpdates, incoming.len());
        let mut downloads = runner
            .run(
                incoming,
                |a| format!("download_article_{}", a.id),
                move |remote| this.download(remote),
                move |n| this.progress.item(n, interval),
            )
            .await;
        log.download_batches = downloads.batches;
        let mut collisions = Vec::new();
        for download in downloads.succeeded.drain(..) {
            match download {
                Download::Created | Download::Overwritten => log.synced += 1,
                Download::Unchanged | Download::Converged | Download::LocalAhead => {}
                Download::Conflict { local, remote } => collisions.push((local, remote)),
            }
        }
        log.download_failures = log.absorb(&mut downloads)?;
        self.signal.check().map_err(halt("sync"))?;

        // Resolve.
        self.enter(SyncPhase::ResolvingConflicts, collisions.len());
        let strategy = config.conflict_strategy;
        let mut resolved = runner
            .run(
                collisions,
                |(local, _)| format!("download_article_{}", local.id),
                move |(local, remote)| this.reconcile(local, remote, strategy),
                move |n| this.progress.item(n, interval),
            )
            .await;
        log.conflicts.extend(resolved.succeeded.drain(..).flatten());
        let failed = log.absorb(&mut resolved)?;
        log.download_failures += failed;
        self.signal.check().map_err(halt("sync"))?;

        // Finalize.
        self.enter(SyncPhase::Finalizing, 0);
        if log.download_failures == 0 {
            self.store
                .set_last_sync_timestamp(log.started_at)
                .await
                .map_err(halt("finalize"))?;
        } else {
            warn!(
                failures = log.download_failures,
                "keeping previous sync timestamp after download failures"
            );
        }
        Ok(())
    }

    async fn upload(&self, local: Article, timeout: Duration) -> SyncResult<Upload> {
        let remote = match with_timeout(timeout, self.remote.get_article(&local.id)).await {
            Ok(remote) => Some(remote),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };

        match remote {
            None if local.is_deleted() => {
                debug!(article_id = %local.id, "retiring local-only deletion");
                self.write(&local.id, &ArticlePatch::mark_synced(Utc::now()))
                    .await?;
                Ok(Upload::Retired)
            }
            None => {
                let stored =
                    with_timeout(timeout, self.remote.create_article(&local.to_remote())).await?;
                debug!(article_id = %local.id, "created on remote");
                self.write(
                    &local.id,
                    &ArticlePatch::mark_synced(Utc::now()).with_server_timestamps(&stored),
                )
                .await?;
                Ok(Upload::Pushed)
            }
            Some(remote) if changed_since_sync(&local, &remote) && !local.same_content(&remote) => {
                debug!(article_id = %local.id, "remote changed since last sync, deferring upload");
                Ok(Upload::Deferred(remote))
            }
            Some(_) => {
                let stored = with_timeout(
                    timeout,
                    self.remote.update_article(&local.id, &local.to_remote()),
                )
                .await?;
                debug!(article_id = %local.id, "updated on remote");
                self.write(
                    &local.id,
                    &ArticlePatch::mark_synced(Utc::now()).with_server_timestamps(&stored),
                )
                .await?;
                Ok(Upload::Pushed)
            }
        }
    }

    async fn download(&self, remote: Article) -> SyncResult<Download> {
        let now = Utc::now();
        let local = self.store.get_article(&remote.id).await?;
        match local {
            None => {
                let id = self
                    .store
                    .create_article(Article {
                        synced_at: Some(now),
                        is_modified: false,
                        ..remote
                    })
                    .await?;
                debug!(article_id = %id, "created locally");
                Ok(Download::Created)
            }
            Some(local) if !local.is_modified => {
                if local.same_version(&remote) {
                    return Ok(Download::Unchanged);
                }
                self.write(&remote.id, &ArticlePatch::overwrite_with(&remote.to_remote(), now))
                    .await?;
                debug!(article_id = %remote.id, "overwrote clean local copy");
                Ok(Download::Overwritten)
            }
            Some(local) if local.same_content(&remote) => {
                self.write(
                    &remote.id,
                    &ArticlePatch::mark_synced(now).with_server_timestamps(&remote),
                )
                .await?;
                debug!(article_id = %remote.id, "local edit already on remote");
                Ok(Download::Converged)
            }
            Some(local) if !changed_since_sync(&local, &remote) => {
                debug!(article_id = %remote.id, "remote unchanged since last sync, keeping local edit");
                Ok(Download::LocalAhead)
            }
            Some(local) => Ok(Download::Conflict { local, remote }),
        }
    }

    async fn reconcile(
        &self,
        local: Article,
        remote: Article,
        strategy: ConflictStrategy,
    ) -> SyncResult<Option<ConflictRecord>> {
        let now = Utc::now();
        let resolution = resolve(&local, &remote, strategy);
        let stamped = match resolution.winning_side() {
            Some(side) => Some(self.apply_winner(&local.id, &remote, side, now).await?),
            None => None,
        };

        let record = ConflictRecord::from_resolution(&local, &remote, &resolution, now)
            .map(|record| match stamped {
                Some(at) => record.with_synced_at(at),
                None => record,
            });
        match &record {
            Some(record) if record.is_pending() => info!(
                article_id = %local.id,
                conflict = %record.conflict_type,
                "conflict left for manual resolution"
            ),
            Some(record) => debug!(
                article_id = %local.id,
                conflict = %record.conflict_type,
                winner = ?resolution.winning_side(),
                "conflict resolved"
            ),
            None => {}
        }
        Ok(record)
    }

    async fn apply_winner(
        &self,
        id: &str,
        remote: &Article,
        side: Winner,
        now: DateTime<Utc>,
    ) -> SyncResult<DateTime<Utc>> {
        let (patch, synced_at) = match side {
            // Stamped past the remote version so the next run uploads it.
            Winner::Local => {
                let synced_at = now.max(remote.updated_at);
                let patch = ArticlePatch {
                    synced_at: Some(Some(synced_at)),
                    is_modified: Some(true),
                    ..ArticlePatch::new()
                };
                (patch, synced_at)
            }
            Winner::Remote => (ArticlePatch::overwrite_with(&remote.to_remote(), now), now),
        };
        self.write(id, &patch).await?;
        Ok(synced_at)
    }

    async fn write(&self, id: &str, patch: &ArticlePatch) -> SyncResult<()> {
        match self.store.update_article(id, patch).await? {
            0 => Err(SyncError::Storage(format!("article {id} vanished during sync"))),
            _ => Ok(()),
        }
    }

    /// Applies a caller's decision for a conflict left pending by a manual
    /// run.
    ///
    /// Rejected with [`SyncError::AlreadyRunning`] while a run is active.
    pub async fn resolve_conflict(
        &self,
        record: &ConflictRecord,
        winner: Winner,
    ) -> SyncResult<()> {
        let _guard = self.acquire()?;
        self.apply_winner(&record.article_id, &record.remote, winner, Utc::now())
            .await?;
        self.pending
            .write()
            .retain(|pending| pending.article_id != record.article_id);
        info!(article_id = %record.article_id, ?winner, "manual conflict resolved");
        Ok(())
    }
}

/// True if the remote copy moved after the local copy last synced.
fn changed_since_sync(local: &Article, remote: &Article) -> bool {
    local
        .synced_at
        .map_or(true, |synced| remote.updated_at > synced)
}
