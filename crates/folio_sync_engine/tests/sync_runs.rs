//! End-to-end sync runs against the in-memory store and remote.

use folio_sync_engine::{
    ConflictResolution, ConflictStrategy, ConflictType, ErrorKind, MemoryStore, MockFailure,
    MockRemote, RemoteOp, SyncConfig, SyncConfigUpdate, SyncError, SyncListener, SyncOrchestrator,
    SyncPhase, SyncProgress, SyncReport, Winner,
};
use folio_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Orchestrator = SyncOrchestrator<MemoryStore, MockRemote>;

fn orchestrator(store: MemoryStore, remote: MockRemote, config: SyncConfig) -> Arc<Orchestrator> {
    init_tracing();
    Arc::new(SyncOrchestrator::new(config, Arc::new(store), Arc::new(remote)).unwrap())
}

fn default_orchestrator(store: MemoryStore, remote: MockRemote) -> Arc<Orchestrator> {
    orchestrator(store, remote, SyncConfig::default())
}

#[tokio::test]
async fn uploads_dirty_articles_in_batches() {
    let sync = orchestrator(
        MemoryStore::with_articles(dirty_articles(125)),
        MockRemote::new(),
        SyncConfig::new().with_batch_size(25),
    );

    let report = sync.start_full_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(report.upload_batches, 5);
    assert_eq!(report.synced_count, 125);
    assert_eq!(report.conflict_count, 0);
    assert_eq!(report.error_count, 0);
    assert_eq!(sync.remote().len(), 125);
    assert_eq!(sync.remote().create_calls(), 125);
    for article in sync.store().all() {
        assert!(!article.is_modified, "{} still dirty", article.id);
        assert!(article.synced_at.is_some());
    }
    assert!(sync.store().last_sync().is_some());
}

#[tokio::test]
async fn second_run_without_changes_is_a_no_op() {
    let remote = MockRemote::new();
    remote.set_assign_timestamps(true);
    for i in 100..105 {
        remote.insert(ArticleBuilder::new(article_id(i)).build());
    }
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(20)), remote);

    let first = sync.start_full_sync().await.unwrap();
    assert_eq!(first.synced_count, 25);

    let second = sync.start_full_sync().await.unwrap();
    assert!(second.success);
    assert_eq!(second.synced_count, 0);
    assert_eq!(second.conflict_count, 0);
    assert_eq!(second.error_count, 0);
}

#[tokio::test]
async fn last_write_wins_takes_newer_remote() {
    let sync = default_orchestrator(
        MemoryStore::with_articles([lww_local()]),
        MockRemote::with_articles([lww_remote()]),
    );

    let report = sync.start_full_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(report.conflict_count, 1);
    let local = sync.store().get("A").unwrap();
    assert_eq!(local.title, "Remote");
    assert!(!local.is_modified);
    assert_eq!(sync.remote().get("A").unwrap().title, "Remote");
    assert_eq!(sync.remote().update_calls(), 0);

    let record = &report.conflicts[0];
    assert_eq!(record.article_id, "A");
    assert_eq!(record.conflict_type, ConflictType::ContentModified);
    assert!(matches!(
        record.resolution,
        ConflictResolution::Applied {
            winner: Winner::Remote,
            strategy: ConflictStrategy::LastWriteWins,
            ..
        }
    ));
}

#[tokio::test]
async fn last_write_wins_keeps_newer_local_for_upload() {
    let local = ArticleBuilder::new("A")
        .title("Local")
        .updated(at(14, 0))
        .synced(at(9, 0))
        .dirty()
        .build();
    let sync = default_orchestrator(
        MemoryStore::with_articles([local]),
        MockRemote::with_articles([lww_remote()]),
    );

    let first = sync.start_full_sync().await.unwrap();
    assert_eq!(first.conflict_count, 1);
    let kept = sync.store().get("A").unwrap();
    assert_eq!(kept.title, "Local");
    assert!(kept.is_modified);

    let second = sync.start_full_sync().await.unwrap();
    assert_eq!(second.conflict_count, 0);
    assert_eq!(second.synced_count, 1);
    assert_eq!(sync.remote().get("A").unwrap().title, "Local");
    assert!(!sync.store().get("A").unwrap().is_modified);
}

#[tokio::test]
async fn local_wins_is_uploaded_on_next_run() {
    let sync = orchestrator(
        MemoryStore::with_articles([lww_local()]),
        MockRemote::with_articles([lww_remote()]),
        SyncConfig::new().with_conflict_strategy(ConflictStrategy::LocalWins),
    );

    let first = sync.start_full_sync().await.unwrap();
    assert_eq!(first.conflict_count, 1);
    assert_eq!(sync.remote().get("A").unwrap().title, "Remote");
    assert!(sync.store().get("A").unwrap().is_modified);

    let second = sync.start_full_sync().await.unwrap();
    assert!(second.success);
    assert_eq!(second.conflict_count, 0);
    assert_eq!(sync.remote().get("A").unwrap().title, "Local");
    assert!(!sync.store().get("A").unwrap().is_modified);
}

#[tokio::test]
async fn manual_conflicts_wait_for_a_decision() {
    let sync = orchestrator(
        MemoryStore::with_articles([lww_local()]),
        MockRemote::with_articles([lww_remote()]),
        SyncConfig::new().with_conflict_strategy(ConflictStrategy::Manual),
    );

    let report = sync.start_full_sync().await.unwrap();
    assert_eq!(report.conflict_count, 1);
    assert_eq!(report.pending_conflicts().count(), 1);

    let untouched = sync.store().get("A").unwrap();
    assert_eq!(untouched, lww_local());

    let pending = sync.pending_conflicts();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_pending());

    sync.resolve_conflict(&pending[0], Winner::Remote)
        .await
        .unwrap();
    let resolved = sync.store().get("A").unwrap();
    assert_eq!(resolved.title, "Remote");
    assert!(!resolved.is_modified);
    assert!(sync.pending_conflicts().is_empty());
}

#[tokio::test]
async fn manual_conflict_resolved_locally_uploads_next_run() {
    let sync = orchestrator(
        MemoryStore::with_articles([lww_local()]),
        MockRemote::with_articles([lww_remote()]),
        SyncConfig::new().with_conflict_strategy(ConflictStrategy::Manual),
    );
    sync.start_full_sync().await.unwrap();

    let record = sync.pending_conflicts().remove(0);
    sync.resolve_conflict(&record, Winner::Local).await.unwrap();
    assert!(sync.store().get("A").unwrap().is_modified);

    let report = sync.start_full_sync().await.unwrap();
    assert_eq!(report.conflict_count, 0);
    assert_eq!(sync.remote().get("A").unwrap().title, "Local");
}

#[tokio::test]
async fn upload_failures_are_isolated() {
    let remote = MockRemote::new();
    remote.fail_on(RemoteOp::Create, article_id(3), MockFailure::Status(500));
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(10)), remote);

    let report = sync.start_full_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(report.synced_count, 9);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.synced_count + report.error_count, 10);

    let failure = &report.errors[0];
    assert_eq!(failure.operation, format!("upload_article_{}", article_id(3)));
    assert_eq!(failure.kind, ErrorKind::Server);
    assert!(failure.retryable);

    assert!(sync.store().get(&article_id(3)).unwrap().is_modified);
    assert!(!sync.store().get(&article_id(4)).unwrap().is_modified);
}

#[tokio::test]
async fn auth_failure_is_not_retryable() {
    let remote = MockRemote::new();
    remote.fail_on(RemoteOp::Get, article_id(0), MockFailure::Status(401));
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(2)), remote);

    let report = sync.start_full_sync().await.unwrap();
    let failure = &report.errors[0];
    assert_eq!(failure.kind, ErrorKind::Auth);
    assert!(!failure.retryable);
    assert_eq!(failure.kind.user_hint(), Some("re-authenticate"));
}

#[tokio::test]
async fn remote_fetch_failure_aborts_run() {
    let remote = MockRemote::new();
    remote.fail_fetches(MockFailure::Network);
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(3)), remote);

    let report = sync.start_full_sync().await.unwrap();

    assert!(!report.success);
    assert!(!report.was_aborted());
    let failure = report.errors.last().unwrap();
    assert_eq!(failure.operation, "fetch_remote_changes");
    assert!(failure.retryable);
    assert!(!sync.is_running());
    assert_eq!(sync.run_state().phase, SyncPhase::Idle);
    assert!(sync.store().last_sync().is_none());
    assert_eq!(sync.sync_stats().runs_failed, 1);
}

#[tokio::test]
async fn unreadable_store_aborts_run() {
    let store = MemoryStore::with_articles(dirty_articles(3));
    store.set_fail_reads(true);
    let sync = default_orchestrator(store, MockRemote::new());

    let report = sync.start_full_sync().await.unwrap();

    assert!(!report.success);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.errors[0].operation, "read_local_changes");
    assert_eq!(report.errors[0].kind, ErrorKind::Storage);
    assert!(sync.remote().is_empty());
}

#[tokio::test]
async fn hung_call_times_out_and_run_continues() {
    let remote = MockRemote::new();
    remote.fail_on(RemoteOp::Get, article_id(1), MockFailure::Hang);
    let sync = orchestrator(
        MemoryStore::with_articles(dirty_articles(3)),
        remote,
        SyncConfig::new().with_request_timeout(Duration::from_millis(50)),
    );

    let report = sync.start_full_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(report.synced_count, 2);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Network);
    assert!(report.errors[0].error.contains("timed out"));
}

#[tokio::test]
async fn concurrent_start_is_rejected() {
    let remote = MockRemote::new();
    remote.set_latency(Duration::from_millis(20));
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(20)), remote);

    let running = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.start_full_sync().await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(sync.is_running());
    assert!(sync.run_state().running);

    let rejected = sync.start_full_sync().await;
    assert!(matches!(rejected, Err(SyncError::AlreadyRunning)));

    let report = running.await.unwrap().unwrap();
    assert!(report.success);
    assert_eq!(report.synced_count, 20);
    assert_eq!(sync.remote().create_calls(), 20);
    assert!(!sync.is_running());
}

#[tokio::test]
async fn stop_sync_cancels_between_items() {
    let remote = MockRemote::new();
    remote.set_latency(Duration::from_millis(5));
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(200)), remote);

    let running = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.start_full_sync().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    sync.stop_sync();

    let report = running.await.unwrap().unwrap();

    assert!(!report.success);
    assert!(report.was_aborted());
    let last = report.errors.last().unwrap();
    assert_eq!(last.operation, "sync");
    assert_eq!(last.error, "aborted");
    assert!(!last.retryable);
    assert!(!sync.is_running());
    assert!(report.synced_count < 200);

    let committed = sync.store().all().iter().filter(|a| !a.is_modified).count();
    assert_eq!(committed as u64, report.synced_count);
    assert!(sync.store().last_sync().is_none());
    assert_eq!(sync.sync_stats().runs_aborted, 1);
}

#[tokio::test]
async fn stop_when_idle_does_nothing() {
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(2)), MockRemote::new());
    sync.stop_sync();
    assert!(!sync.run_state().abort_requested);

    let report = sync.start_full_sync().await.unwrap();
    assert!(report.success);
}

#[tokio::test]
async fn soft_deletes_propagate() {
    let shared = ArticleBuilder::new("d").synced(at(9, 0)).build();
    let store = MemoryStore::with_articles([
        shared.clone(),
        ArticleBuilder::new("local-only").dirty().deleted(at(8, 0)).build(),
    ]);
    store.edit("d", at(11, 0), |a| a.deleted_at = Some(at(11, 0)));
    let sync = default_orchestrator(store, MockRemote::with_articles([shared]));

    let report = sync.start_full_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(sync.remote().get("d").unwrap().deleted_at, Some(at(11, 0)));
    assert!(sync.remote().get("local-only").is_none());
    assert!(!sync.store().get("local-only").unwrap().is_modified);
    assert!(!sync.store().get("d").unwrap().is_modified);
}

#[tokio::test]
async fn downloads_create_and_overwrite_clean_copies() {
    let stale = ArticleBuilder::new("x").title("Old").synced(at(1, 0)).build();
    let fresh = ArticleBuilder::new("x").title("New").updated(at(6, 0)).build();
    let remote = MockRemote::with_articles([fresh]);
    for i in 0..3 {
        remote.insert(ArticleBuilder::new(article_id(i)).tag("remote").build());
    }
    let sync = default_orchestrator(MemoryStore::with_articles([stale]), remote);

    let report = sync.start_full_sync().await.unwrap();

    assert_eq!(report.synced_count, 4);
    assert_eq!(report.conflict_count, 0);
    assert_eq!(sync.store().len(), 4);
    assert_eq!(sync.store().get("x").unwrap().title, "New");
    let created = sync.store().get(&article_id(0)).unwrap();
    assert!(created.tags.contains("remote"));
    assert!(!created.is_modified);
    assert!(created.synced_at.is_some());
}

#[tokio::test]
async fn matching_dirty_copy_converges_without_conflict() {
    let remote = MockRemote::with_articles([ArticleBuilder::new("c")
        .title("Same")
        .updated(at(12, 0))
        .build()]);
    remote.fail_on(RemoteOp::Update, "c", MockFailure::Status(503));
    let local = ArticleBuilder::new("c")
        .title("Same")
        .updated(at(10, 0))
        .synced(at(9, 0))
        .dirty()
        .build();
    let sync = default_orchestrator(MemoryStore::with_articles([local]), remote);

    let report = sync.start_full_sync().await.unwrap();

    assert_eq!(report.conflict_count, 0);
    assert_eq!(report.error_count, 1);
    let converged = sync.store().get("c").unwrap();
    assert!(!converged.is_modified);
    assert_eq!(converged.updated_at, at(12, 0));
}

#[tokio::test]
async fn remote_wins_replaces_local_edit() {
    let sync = orchestrator(
        MemoryStore::with_articles([lww_local()]),
        MockRemote::with_articles([lww_remote()]),
        SyncConfig::new().with_conflict_strategy(ConflictStrategy::RemoteWins),
    );

    let report = sync.start_full_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(report.conflict_count, 1);
    assert_eq!(report.synced_count, 0);
    let local = sync.store().get("A").unwrap();
    assert_eq!(local.title, "Remote");
    assert!(!local.is_modified);
    assert_eq!(sync.remote().update_calls(), 0);

    match &report.conflicts[0].resolution {
        ConflictResolution::Applied {
            strategy,
            winner,
            article,
        } => {
            assert_eq!(*strategy, ConflictStrategy::RemoteWins);
            assert_eq!(*winner, Winner::Remote);
            assert_eq!(article.title, "Remote");
            assert_eq!(article.synced_at, local.synced_at);
        }
        ConflictResolution::Pending => panic!("expected an applied resolution"),
    }
}

#[tokio::test]
async fn failed_upload_is_not_mistaken_for_a_conflict() {
    let remote = MockRemote::with_articles([ArticleBuilder::new("B")
        .title("Server")
        .updated(at(8, 0))
        .build()]);
    remote.fail_on(RemoteOp::Update, "B", MockFailure::Status(503));
    let local = ArticleBuilder::new("B")
        .title("Mine")
        .updated(at(11, 0))
        .synced(at(9, 0))
        .dirty()
        .build();
    let sync = orchestrator(
        MemoryStore::with_articles([local]),
        remote,
        SyncConfig::new().with_conflict_strategy(ConflictStrategy::RemoteWins),
    );

    let first = sync.start_full_sync().await.unwrap();
    assert!(first.success);
    assert_eq!(first.error_count, 1);
    assert_eq!(first.conflict_count, 0);
    assert_eq!(first.synced_count, 0);
    let kept = sync.store().get("B").unwrap();
    assert_eq!(kept.title, "Mine");
    assert!(kept.is_modified);

    sync.remote().clear_failures();
    let second = sync.start_full_sync().await.unwrap();
    assert_eq!(second.error_count, 0);
    assert_eq!(second.conflict_count, 0);
    assert_eq!(second.synced_count, 1);
    assert_eq!(sync.remote().get("B").unwrap().title, "Mine");
    assert!(!sync.store().get("B").unwrap().is_modified);
}

#[tokio::test]
async fn download_failure_keeps_previous_timestamp() {
    let store = MemoryStore::new();
    store.fail_writes_for("blocked");
    let remote = MockRemote::with_articles([
        ArticleBuilder::new("blocked").build(),
        ArticleBuilder::new("fine").build(),
    ]);
    let sync = default_orchestrator(store, remote);

    let report = sync.start_full_sync().await.unwrap();

    assert!(report.success);
    assert_eq!(report.synced_count, 1);
    assert_eq!(report.errors[0].operation, "download_article_blocked");
    assert_eq!(report.errors[0].kind, ErrorKind::Storage);
    assert!(sync.store().last_sync().is_none());
}

#[derive(Default)]
struct Recorder {
    phases: Mutex<Vec<SyncPhase>>,
    progress: Mutex<Vec<SyncProgress>>,
    completed: Mutex<Vec<SyncReport>>,
}

impl SyncListener for Recorder {
    fn on_phase_change(&self, phase: SyncPhase) {
        self.phases.lock().push(phase);
    }

    fn on_progress(&self, progress: &SyncProgress) {
        self.progress.lock().push(*progress);
    }

    fn on_complete(&self, report: &SyncReport) {
        self.completed.lock().push(report.clone());
    }
}

#[tokio::test]
async fn listeners_see_every_phase_and_bounded_progress() {
    let sync = orchestrator(
        MemoryStore::with_articles(dirty_articles(25)),
        MockRemote::new(),
        SyncConfig::new().with_batch_size(10),
    );
    let recorder = Arc::new(Recorder::default());
    sync.add_listener(recorder.clone());
    let progress = sync.subscribe();

    sync.start_full_sync().await.unwrap();

    assert_eq!(
        *recorder.phases.lock(),
        vec![
            SyncPhase::UploadingChanges,
            SyncPhase::DownloadingUpdates,
            SyncPhase::ResolvingConflicts,
            SyncPhase::Finalizing,
        ]
    );
    let uploads: Vec<_> = recorder
        .progress
        .lock()
        .iter()
        .filter(|p| p.phase == SyncPhase::UploadingChanges)
        .map(|p| p.processed_items)
        .collect();
    assert_eq!(uploads, vec![0, 10, 20, 25]);
    assert_eq!(recorder.completed.lock().len(), 1);
    assert_eq!(*progress.borrow(), SyncProgress::IDLE);
}

#[tokio::test]
async fn config_updates_apply_to_next_run() {
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(25)), MockRemote::new());

    sync.update_config(&SyncConfigUpdate::new().batch_size(10))
        .unwrap();
    assert!(sync
        .update_config(&SyncConfigUpdate::new().batch_size(0))
        .is_err());
    assert_eq!(sync.config().batch_size, 10);

    let report = sync.start_full_sync().await.unwrap();
    assert_eq!(report.upload_batches, 3);
}

#[tokio::test]
async fn stats_accumulate_across_runs() {
    let sync = default_orchestrator(MemoryStore::with_articles(dirty_articles(4)), MockRemote::new());

    sync.start_full_sync().await.unwrap();
    sync.store().edit(&article_id(0), at(20, 0), |a| a.is_read = true);
    sync.start_full_sync().await.unwrap();

    let stats = sync.sync_stats();
    assert_eq!(stats.runs_started, 2);
    assert_eq!(stats.runs_succeeded, 2);
    assert_eq!(stats.articles_synced, 5);
    assert_eq!(stats.errors_recorded, 0);
    assert!(stats.last_success_at.is_some());
    assert!(stats.last_duration.is_some());
    assert!(stats.last_error.is_none());
}
