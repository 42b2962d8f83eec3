#![cfg(feature = "sqlite-tests")]

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use upload_worker_lib::staging::{FsStaging, StagedDocument};
use upload_worker_lib::store::{count_blocks, get_page_mapping, get_page_status, get_semaphore, PageStatus};
use upload_worker_lib::upload_service::block_uploader::{
    BlockUploader, ChunkWorker, WorkspaceWriter,
};
use upload_worker_lib::upload_service::ingest::{BlockIngestor, MarkdownRenderer, RedriveOutcome};
use upload_worker_lib::upload_service::types::{
    ArrivalEvent, ChunkResult, ChunkStatus, ExecutionStatus, RetryPolicy, UploadError,
    UploaderConfig,
};
use upload_worker_lib::upload_service::{
    DistributedSemaphore, Error, OrchestratorConfig, RecoverySweeper, SemaphoreConfig,
    SqliteStore, UploadOrchestrator, UploadService,
};
use upload_worker_lib::workspace_client::ParentContainer;
use wiki_core::RenderedBlock;

fn fast_semaphore(limit: i64, max_attempts: u32) -> SemaphoreConfig {
    SemaphoreConfig {
        lock_name: "Semaphore".to_string(),
        limit,
        poll_policy: RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(2),
            max_backoff: Duration::from_millis(5),
            jitter: Duration::ZERO,
        },
    }
}

fn lock_state(store: &SqliteStore) -> (i64, Vec<String>) {
    let state = store
        .with_conn(|conn| get_semaphore(conn, "Semaphore"))
        .expect("semaphore lookup")
        .expect("semaphore row");
    (state.current_lock_count, state.owner_ids)
}

/// Uploads one block per call, then reports drained. Tracks how many calls overlap.
#[derive(Default)]
struct OverlapWorker {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: Mutex<HashMap<String, u32>>,
}

impl ChunkWorker for OverlapWorker {
    fn process_chunk<'a>(&'a self, batch_id: &'a str) -> BoxFuture<'a, Result<ChunkResult, Error>> {
        Box::pin(async move {
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let call = {
                let mut calls = self.calls.lock().expect("calls mutex");
                let entry = calls.entry(batch_id.to_string()).or_insert(0);
                *entry += 1;
                *entry
            };
            if call > 1 {
                return Ok(ChunkResult::drained());
            }
            Ok(ChunkResult {
                status: ChunkStatus::Success,
                processed_count: 1,
                success_block_count: 1,
                fail_block_count: 0,
                failure: None,
            })
        })
    }
}

struct HangingWorker;

impl ChunkWorker for HangingWorker {
    fn process_chunk<'a>(&'a self, _batch_id: &'a str) -> BoxFuture<'a, Result<ChunkResult, Error>> {
        Box::pin(futures::future::pending())
    }
}

fn orchestrator(
    store: &SqliteStore,
    worker: Arc<dyn ChunkWorker>,
    semaphore: SemaphoreConfig,
    chunk_timeout: Duration,
    events: flume::Sender<upload_worker_lib::upload_service::types::LifecycleEvent>,
) -> UploadOrchestrator<SqliteStore> {
    UploadOrchestrator::new(
        store.clone(),
        DistributedSemaphore::new(store.clone(), semaphore),
        worker,
        OrchestratorConfig {
            chunk_timeout,
            job_timeout: Duration::from_secs(60),
        },
        CancellationToken::new(),
    )
    .with_events(events)
}

#[tokio::test]
async fn limit_one_serializes_two_jobs() {
    let store = SqliteStore::in_memory();
    let worker = Arc::new(OverlapWorker::default());
    let (events_tx, events_rx) = flume::unbounded();

    let first = orchestrator(
        &store,
        worker.clone(),
        fast_semaphore(1, 2_000),
        Duration::from_secs(5),
        events_tx.clone(),
    );
    let second = orchestrator(
        &store,
        worker.clone(),
        fast_semaphore(1, 2_000),
        Duration::from_secs(5),
        events_tx,
    );

    let (a, b) = tokio::join!(first.run_as("batch-a", "exec-a"), second.run_as("batch-b", "exec-b"));
    let a = a.expect("job a should run");
    let b = b.expect("job b should run");

    assert_eq!(a.status, ExecutionStatus::Succeeded);
    assert_eq!(b.status, ExecutionStatus::Succeeded);
    assert_eq!(a.job.success_block_count, 1);
    assert_eq!(b.job.success_block_count, 1);
    assert_eq!(
        worker.max_active.load(Ordering::SeqCst),
        1,
        "a second job must not run while the only slot is held"
    );
    assert_eq!(lock_state(&store), (0, vec![]));

    drop(first);
    drop(second);
    let statuses: Vec<ExecutionStatus> = events_rx.drain().map(|event| event.status).collect();
    assert_eq!(statuses, vec![ExecutionStatus::Succeeded, ExecutionStatus::Succeeded]);
}

#[tokio::test]
async fn timed_out_job_keeps_the_slot_until_the_sweeper_clears_it() {
    let store = SqliteStore::in_memory();
    let (events_tx, events_rx) = flume::unbounded();

    let stuck = orchestrator(
        &store,
        Arc::new(HangingWorker),
        fast_semaphore(1, 3),
        Duration::from_millis(30),
        events_tx.clone(),
    );
    let report = stuck
        .run_as("batch-stuck", "exec-stuck")
        .await
        .expect("job should report");
    assert_eq!(report.status, ExecutionStatus::TimedOut);
    assert!(!report.lock_released);
    assert_eq!(lock_state(&store), (1, vec!["exec-stuck".to_string()]));

    // While the slot is leaked, nobody else gets in.
    let blocked = orchestrator(
        &store,
        Arc::new(OverlapWorker::default()),
        fast_semaphore(1, 3),
        Duration::from_secs(5),
        events_tx.clone(),
    );
    let err = blocked
        .run_as("batch-next", "exec-blocked")
        .await
        .expect_err("slot is still held");
    assert!(matches!(err, Error::LockTimeout { .. }));

    drop(stuck);
    drop(blocked);
    drop(events_tx);
    RecoverySweeper::new(store.clone())
        .run(events_rx, CancellationToken::new())
        .await;
    assert_eq!(lock_state(&store), (0, vec![]));

    let status = store
        .with_conn(|conn| get_page_status(conn, "batch-stuck"))
        .expect("status lookup")
        .expect("status row");
    assert_eq!(status.status, PageStatus::Stalled);

    let (events_tx, _events_rx) = flume::unbounded();
    let retry = orchestrator(
        &store,
        Arc::new(OverlapWorker::default()),
        fast_semaphore(1, 3),
        Duration::from_secs(5),
        events_tx,
    );
    let report = retry
        .run_as("batch-next", "exec-next")
        .await
        .expect("job should run after the sweep");
    assert_eq!(report.status, ExecutionStatus::Succeeded);
}

/// Accepts everything and records appends per page.
#[derive(Default)]
struct RecordingWorkspace {
    created: AtomicUsize,
    appended: Mutex<Vec<(String, RenderedBlock)>>,
}

impl WorkspaceWriter for RecordingWorkspace {
    fn fetch_parent<'a>(
        &'a self,
        parent_reference: &'a str,
    ) -> BoxFuture<'a, Result<ParentContainer, UploadError>> {
        Box::pin(async move {
            Ok(ParentContainer::Page {
                id: parent_reference.to_string(),
            })
        })
    }

    fn create_child<'a>(
        &'a self,
        _parent: &'a ParentContainer,
        title: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>> {
        Box::pin(async move {
            let call = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{title}-page-{call}"))
        })
    }

    fn append_block<'a>(
        &'a self,
        page_reference: &'a str,
        block: &'a RenderedBlock,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            self.appended
                .lock()
                .expect("appended mutex")
                .push((page_reference.to_string(), block.clone()));
            Ok(())
        })
    }
}

#[tokio::test]
async fn staged_document_flows_from_arrival_to_remote_page() {
    let staging_dir = tempfile::tempdir().expect("tempdir");
    let history = staging_dir.path().join("history");
    fs::create_dir_all(&history).expect("mkdir");
    fs::write(history.join("parenturl.txt"), "parent-page-id\n").expect("write parent");
    fs::write(
        history.join("Rome.md"),
        "# Rome\n\nFounded on seven hills.\n\n- Forum\n- Colosseum\n",
    )
    .expect("write document");

    let store = SqliteStore::in_memory();
    let staging = Arc::new(FsStaging::new(staging_dir.path()));
    let workspace = Arc::new(RecordingWorkspace::default());
    let uploader = BlockUploader::new(
        workspace.clone(),
        store.clone(),
        staging.clone(),
        UploaderConfig {
            max_blocks: 2,
            retry_policy: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                jitter: Duration::ZERO,
            },
            chunk_budget: Duration::from_secs(30),
        },
    );

    let (ready_tx, ready_rx) = flume::unbounded();
    let (events_tx, events_rx) = flume::unbounded();
    let service = Arc::new(UploadService::new(
        store.clone(),
        Arc::new(uploader),
        fast_semaphore(1, 100),
        OrchestratorConfig::default(),
        events_tx,
        CancellationToken::new(),
    ));
    let jobs = tokio::spawn(service.run_triggered(ready_rx));

    let ingestor = BlockIngestor::new(store.clone(), staging.clone(), Arc::new(MarkdownRenderer))
        .with_batch_ready(ready_tx);
    let documents: Vec<StagedDocument> = staging.scan().expect("scan");
    assert_eq!(documents.len(), 1);
    let outcome = ingestor
        .ingest_with_redrive(&ArrivalEvent {
            source_location: documents[0].source_location.clone(),
            origin_container: "staging".to_string(),
            event_time: "2024-01-02T03:04:05.000Z".to_string(),
        })
        .await
        .expect("ingest");
    let RedriveOutcome::Ingested(report) = outcome else {
        panic!("document should ingest: {outcome:?}");
    };
    assert_eq!(report.source_location, "history/Rome.md");
    assert_eq!(report.stored, 4);

    drop(ingestor);
    jobs.await.expect("job loop should finish once arrivals stop");

    let appended = workspace.appended.lock().expect("appended mutex").clone();
    let texts: Vec<&str> = appended.iter().map(|(_, block)| block.plain_text()).collect();
    assert_eq!(texts, vec!["Rome", "Founded on seven hills.", "Forum", "Colosseum"]);
    assert!(appended.iter().all(|(page, _)| page == "Rome-page-1"));
    assert_eq!(workspace.created.load(Ordering::SeqCst), 1);

    let batch = report.batch_id.clone();
    let (remaining, mapping, status) = store.with_conn(|conn| {
        (
            count_blocks(conn, &batch).expect("count"),
            get_page_mapping(conn, &batch).expect("mapping"),
            get_page_status(conn, &batch).expect("status"),
        )
    });
    assert_eq!(remaining, 0);
    assert_eq!(
        mapping.map(|mapping| mapping.page_reference),
        Some("Rome-page-1".to_string())
    );
    assert_eq!(status.map(|status| status.status), Some(PageStatus::Complete));

    let event = events_rx.try_recv().expect("lifecycle event");
    assert_eq!(event.status, ExecutionStatus::Succeeded);
    assert_eq!(event.batch_id, batch);
}

/// Accepts an append, then fires shutdown before handing control back.
struct ShutdownDuringAppend {
    inner: Arc<RecordingWorkspace>,
    shutdown: CancellationToken,
}

impl WorkspaceWriter for ShutdownDuringAppend {
    fn fetch_parent<'a>(
        &'a self,
        parent_reference: &'a str,
    ) -> BoxFuture<'a, Result<ParentContainer, UploadError>> {
        self.inner.fetch_parent(parent_reference)
    }

    fn create_child<'a>(
        &'a self,
        parent: &'a ParentContainer,
        title: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>> {
        self.inner.create_child(parent, title)
    }

    fn append_block<'a>(
        &'a self,
        page_reference: &'a str,
        block: &'a RenderedBlock,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            let accepted = self.inner.append_block(page_reference, block).await;
            self.shutdown.cancel();
            tokio::time::sleep(Duration::from_millis(10)).await;
            accepted
        })
    }
}

#[tokio::test]
async fn shutdown_during_an_append_never_duplicates_the_block() {
    let staging_dir = tempfile::tempdir().expect("tempdir");
    let history = staging_dir.path().join("history");
    fs::create_dir_all(&history).expect("mkdir");
    fs::write(history.join("parenturl.txt"), "parent-page-id\n").expect("write parent");
    fs::write(history.join("Rome.md"), "# Rome\n\nFirst.\n\nSecond.\n").expect("write document");

    let store = SqliteStore::in_memory();
    let staging = Arc::new(FsStaging::new(staging_dir.path()));
    let ingestor = BlockIngestor::new(store.clone(), staging.clone(), Arc::new(MarkdownRenderer));
    let outcome = ingestor
        .ingest_with_redrive(&ArrivalEvent {
            source_location: "history/Rome.md".to_string(),
            origin_container: "staging".to_string(),
            event_time: "2024-01-02T03:04:05.000Z".to_string(),
        })
        .await
        .expect("ingest");
    let RedriveOutcome::Ingested(report) = outcome else {
        panic!("document should ingest: {outcome:?}");
    };
    assert_eq!(report.stored, 3);
    let batch = report.batch_id;

    let shutdown = CancellationToken::new();
    let workspace = Arc::new(RecordingWorkspace::default());
    let uploader = BlockUploader::new(
        ShutdownDuringAppend {
            inner: workspace.clone(),
            shutdown: shutdown.clone(),
        },
        store.clone(),
        staging,
        UploaderConfig {
            max_blocks: 10,
            retry_policy: RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                jitter: Duration::ZERO,
            },
            chunk_budget: Duration::from_secs(30),
        },
    )
    .with_shutdown(shutdown.clone());
    let (events_tx, events_rx) = flume::unbounded();
    let job = UploadOrchestrator::new(
        store.clone(),
        DistributedSemaphore::new(store.clone(), fast_semaphore(1, 3)),
        Arc::new(uploader),
        OrchestratorConfig::default(),
        shutdown,
    )
    .with_events(events_tx);

    let outcome = job.run_as(&batch, "exec-1").await.expect("job should report");

    assert_eq!(outcome.status, ExecutionStatus::Aborted);
    assert_eq!(outcome.job.success_block_count, 1);
    let appended = workspace.appended.lock().expect("appended mutex").len();
    assert_eq!(appended, 1);
    let remaining = store.with_conn(|conn| count_blocks(conn, &batch).expect("count"));
    assert_eq!(remaining, 2, "the accepted block is gone, the rest wait for the next run");
    assert_eq!(
        events_rx.try_recv().expect("lifecycle event").status,
        ExecutionStatus::Aborted
    );
}
