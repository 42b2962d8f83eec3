use crate::{
    cli::{Cli, Command, CommonArgs, DashboardArgs, IngestArgs, ServeArgs, SweepArgs, UploadArgs},
    config::Config,
    dashboard::{page_status_report, validate_range, DashboardTimezone},
    db::migrate,
    logging::{format_error_report, init_logging},
    server::setup_server_with_addr,
    staging::{ArrivalTracker, FsStaging, StagedDocument},
    state::AppState,
    upload_service::{
        block_uploader::{BlockUploader, ChunkWorker, HttpWorkspaceWriter},
        build_rate_limiter,
        ingest::{BlockIngestor, MarkdownRenderer, RedriveOutcome},
        types::{ArrivalEvent, ExecutionStatus, RetryPolicy, UploaderConfig},
        DistributedSemaphore, Error, OrchestratorConfig, PgStore, RecoverySweeper, SemaphoreConfig,
        SweepOutcome, UploadService,
    },
    workspace_client::WorkspaceClient,
};
use chrono::{DateTime, SecondsFormat, Utc};
use dotenv::dotenv;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// Runs the chosen subcommand and returns the process exit code.
///
/// 0 on success, 2 for invalid arguments or configuration, 1 for runtime failures.
pub async fn run(cli: Cli) -> i32 {
    dotenv().ok();

    let mode = cli.command.mode();
    let logging_context = init_logging(mode, &cli.command.common().log_level);
    let run_span = logging_context.run_span();

    async move {
        info!(event = "command_starting", mode, "starting command");
        let code = match cli.command {
            Command::Ingest(args) => run_ingest(args).await,
            Command::Upload(args) => run_upload(args).await,
            Command::Sweep(args) => run_sweep(args).await,
            Command::Serve(args) => run_serve(args).await,
            Command::Dashboard(args) => run_dashboard(args).await,
        };
        info!(event = "command_finished", mode, exit_code = code, "command finished");
        code
    }
    .instrument(run_span)
    .await
}

fn validate_chunk_settings(
    max_blocks: Option<i64>,
    chunk_timeout_secs: u64,
    lock_attempts: u32,
) -> Result<(), String> {
    if let Some(max_blocks) = max_blocks {
        if max_blocks <= 0 {
            return Err(format!("--max-blocks must be > 0, got {max_blocks}"));
        }
    }
    if chunk_timeout_secs == 0 {
        return Err("--chunk-timeout-secs must be > 0".to_string());
    }
    if lock_attempts == 0 {
        return Err("--lock-attempts must be > 0".to_string());
    }
    Ok(())
}

pub fn validate_upload_args(args: &UploadArgs) -> Result<(), String> {
    if args.batch_id.trim().is_empty() {
        return Err("--batch-id must be non-empty".to_string());
    }
    validate_chunk_settings(args.max_blocks, args.chunk_timeout_secs, args.lock_attempts)?;
    if args.job_timeout_secs < args.chunk_timeout_secs {
        return Err(format!(
            "--job-timeout-secs ({}) must be >= --chunk-timeout-secs ({})",
            args.job_timeout_secs, args.chunk_timeout_secs
        ));
    }
    Ok(())
}

pub fn validate_serve_args(args: &ServeArgs) -> Result<SocketAddr, String> {
    validate_chunk_settings(args.max_blocks, args.chunk_timeout_secs, args.lock_attempts)?;
    if args.poll_interval_secs == 0 {
        return Err("--poll-interval-secs must be > 0".to_string());
    }
    args.metrics_bind.parse::<SocketAddr>().map_err(|err| {
        format!(
            "invalid --metrics-bind address `{}`: {err}",
            args.metrics_bind
        )
    })
}

pub fn validate_sweep_args(args: &SweepArgs) -> Result<(), String> {
    match (&args.owner_id, args.reconcile) {
        (Some(owner_id), false) if owner_id.trim().is_empty() => {
            Err("--owner-id must be non-empty".to_string())
        }
        (Some(_), false) | (None, true) => Ok(()),
        _ => Err("exactly one of --owner-id or --reconcile is required".to_string()),
    }
}

pub fn validate_dashboard_args(args: &DashboardArgs) -> Result<DashboardTimezone, String> {
    validate_range(args.start, args.end).map_err(|err| err.to_string())?;
    DashboardTimezone::from_offset_minutes(args.tz_offset_minutes).map_err(|err| err.to_string())
}

/// Config from the environment plus the resolved database url, or exit code 2.
fn load_config(common: &CommonArgs) -> Result<(Config, String), i32> {
    let config = Config::from_env().map_err(|err| {
        eprintln!("{err}");
        2
    })?;
    let db_url = config
        .database_url(common.database_url.as_deref())
        .map_err(|err| {
            eprintln!("{err}");
            2
        })?;
    Ok((config, db_url))
}

fn report_failure(event: &'static str, context: &str, err: &(dyn StdError + 'static)) -> i32 {
    let error_report = format_error_report(err);
    error!(
        event,
        error = %err,
        error_debug = ?err,
        error_report = %error_report,
        "{context}"
    );
    eprintln!("{context}: {err}");
    eprintln!("{error_report}");
    1
}

async fn migrate_database(db_url: &str) -> Result<(), i32> {
    let db_url = db_url.to_string();
    let migrated = tokio::task::spawn_blocking(move || migrate(&db_url))
        .await
        .map_err(Error::from)
        .and_then(|result| result);
    migrated.map_err(|err| report_failure("migration_failed", "failed to migrate database", &err))
}

async fn scan_staging(staging: Arc<FsStaging>) -> Result<Vec<StagedDocument>, Error> {
    let scanned = tokio::task::spawn_blocking(move || staging.scan()).await?;
    Ok(scanned?)
}

/// One arrival per staged document, stamped with its modification time.
pub fn arrival_event(staging: &FsStaging, document: &StagedDocument) -> ArrivalEvent {
    let event_time = DateTime::<Utc>::from_timestamp_millis(document.modified_ms)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    ArrivalEvent {
        source_location: document.source_location.clone(),
        origin_container: staging.root().display().to_string(),
        event_time,
    }
}

fn semaphore_config(config: &Config, lock_attempts: u32) -> SemaphoreConfig {
    let defaults = SemaphoreConfig::default();
    SemaphoreConfig {
        lock_name: config.lock_name.clone(),
        limit: config.concurrency_limit,
        poll_policy: RetryPolicy {
            max_attempts: lock_attempts,
            ..defaults.poll_policy
        },
    }
}

/// Chunks stop starting new blocks a tenth of the timeout early.
fn uploader_config(max_blocks: i64, chunk_timeout: Duration) -> UploaderConfig {
    UploaderConfig {
        max_blocks,
        chunk_budget: chunk_timeout / 10 * 9,
        ..UploaderConfig::default()
    }
}

fn build_chunk_worker(
    config: &Config,
    token: &str,
    store: PgStore,
    staging_dir: &Path,
    uploader: UploaderConfig,
    shutdown: &CancellationToken,
) -> Result<Arc<dyn ChunkWorker>, Error> {
    let client = WorkspaceClient::new(
        config.workspace_api_url.clone(),
        token,
        &config.workspace_api_version,
        config.table_title_property.clone(),
    )?;
    let writer = HttpWorkspaceWriter::new(
        Arc::new(client),
        build_rate_limiter(config.workspace_rps),
    );
    let catalog = Arc::new(FsStaging::new(staging_dir));
    Ok(Arc::new(
        BlockUploader::new(writer, store, catalog, uploader).with_shutdown(shutdown.clone()),
    ))
}

/// Cancels `token` on SIGTERM or SIGINT.
async fn handle_shutdown_signals(token: CancellationToken) {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(err), _) | (_, Err(err)) => {
            error!(
                event = "signal_handler_failed",
                error = %err,
                "failed to register shutdown signal handlers"
            );
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "shutdown_signal", signal = "SIGTERM", "SIGTERM received, shutting down.");
        }
        _ = sigint.recv() => {
            info!(event = "shutdown_signal", signal = "SIGINT", "SIGINT received, shutting down.");
        }
        _ = token.cancelled() => return,
    }

    token.cancel();
}

pub async fn run_ingest(args: IngestArgs) -> i32 {
    if args.max_receive_count == 0 {
        eprintln!("--max-receive-count must be > 0");
        return 2;
    }
    let (_config, db_url) = match load_config(&args.common) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    if let Err(code) = migrate_database(&db_url).await {
        return code;
    }

    let staging = Arc::new(FsStaging::new(&args.staging_dir));
    let documents = match scan_staging(staging.clone()).await {
        Ok(documents) => documents,
        Err(err) => return report_failure("staging_scan_failed", "failed to scan staging", &err),
    };
    info!(
        event = "staging_scanned",
        staging_dir = %args.staging_dir.display(),
        documents = documents.len(),
        "found staged documents"
    );

    let ingestor = BlockIngestor::new(
        PgStore::new(db_url),
        staging.clone(),
        Arc::new(MarkdownRenderer),
    )
    .with_max_receive_count(args.max_receive_count);

    let mut dead_lettered = 0usize;
    for document in &documents {
        let event = arrival_event(&staging, document);
        match ingestor.ingest_with_redrive(&event).await {
            Ok(RedriveOutcome::Ingested(report)) => {
                println!("{}\t{}", report.batch_id, report.source_location);
            }
            Ok(RedriveOutcome::DeadLettered {
                attempts,
                last_error,
                ..
            }) => {
                dead_lettered += 1;
                eprintln!(
                    "{} dead-lettered after {attempts} attempts: {last_error}",
                    event.source_location
                );
            }
            Err(err) => return report_failure("ingest_failed", "ingestion failed", &err),
        }
    }

    if dead_lettered > 0 {
        warn!(
            event = "ingest_incomplete",
            dead_lettered, "some documents could not be ingested"
        );
        return 1;
    }
    0
}

pub async fn run_upload(args: UploadArgs) -> i32 {
    if let Err(err) = validate_upload_args(&args) {
        eprintln!("{err}");
        return 2;
    }
    let (config, db_url) = match load_config(&args.common) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let token = match config.require_token() {
        Ok(token) => token.to_string(),
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };
    if let Err(code) = migrate_database(&db_url).await {
        return code;
    }

    let store = PgStore::new(db_url);
    let shutdown = CancellationToken::new();
    let chunk_timeout = Duration::from_secs(args.chunk_timeout_secs);
    let worker = match build_chunk_worker(
        &config,
        &token,
        store.clone(),
        &args.staging_dir,
        uploader_config(args.max_blocks.unwrap_or(config.max_blocks), chunk_timeout),
        &shutdown,
    ) {
        Ok(worker) => worker,
        Err(err) => {
            return report_failure(
                "workspace_client_build_failed",
                "failed to build workspace client",
                &err,
            )
        }
    };

    let signal_handle = tokio::spawn(handle_shutdown_signals(shutdown.clone()));
    let (events_tx, events_rx) = flume::unbounded();
    let service = UploadService::new(
        store.clone(),
        worker,
        semaphore_config(&config, args.lock_attempts),
        OrchestratorConfig {
            chunk_timeout,
            job_timeout: Duration::from_secs(args.job_timeout_secs),
        },
        events_tx,
        shutdown.clone(),
    );

    let result = service.run_batch(&args.batch_id).await;
    // Closing the channel lets the sweeper drain the single event and stop.
    drop(service);
    RecoverySweeper::new(store)
        .run(events_rx, CancellationToken::new())
        .await;
    shutdown.cancel();
    let _ = signal_handle.await;

    match result {
        Ok(report) => {
            match serde_json::to_string(&report.job) {
                Ok(json) => println!("{json}"),
                Err(err) => warn!(event = "job_result_encode_failed", error = %err, "could not print job result"),
            }
            if report.status == ExecutionStatus::Succeeded {
                0
            } else {
                eprintln!(
                    "upload job {} ended {}: {}",
                    report.execution_id,
                    report.status.as_str(),
                    report.failure_message.as_deref().unwrap_or("no details")
                );
                1
            }
        }
        Err(err) => report_failure("upload_failed", "upload job failed", &err),
    }
}

pub async fn run_sweep(args: SweepArgs) -> i32 {
    if let Err(err) = validate_sweep_args(&args) {
        eprintln!("{err}");
        return 2;
    }
    let (config, db_url) = match load_config(&args.common) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    if let Err(code) = migrate_database(&db_url).await {
        return code;
    }

    let store = PgStore::new(db_url);
    let lock_name = args.lock_name.clone().unwrap_or(config.lock_name);

    if let Some(owner_id) = &args.owner_id {
        return match RecoverySweeper::new(store).clear_owner(&lock_name, owner_id).await {
            Ok(SweepOutcome::Cleared { current_lock_count }) => {
                println!("cleared {owner_id} from {lock_name}; current_lock_count={current_lock_count}");
                0
            }
            Ok(_) => {
                println!("{owner_id} holds no slot on {lock_name}");
                0
            }
            Err(err) => report_failure("lock_sweep_failed", "sweep failed", &err),
        };
    }

    let semaphore = DistributedSemaphore::new(
        store,
        SemaphoreConfig {
            lock_name: lock_name.clone(),
            ..SemaphoreConfig::default()
        },
    );
    match semaphore.reconcile().await {
        Ok(Some((before, after))) => {
            info!(
                event = "semaphore_reconciled",
                lock_name = %lock_name,
                before,
                after,
                "lock count reconciled to owner set"
            );
            println!("{lock_name}: current_lock_count {before} -> {after}");
            0
        }
        Ok(None) => {
            println!("{lock_name} has never been used");
            0
        }
        Err(err) => report_failure("semaphore_reconcile_failed", "reconcile failed", &err),
    }
}

pub async fn run_dashboard(args: DashboardArgs) -> i32 {
    let timezone = match validate_dashboard_args(&args) {
        Ok(timezone) => timezone,
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };
    let (_config, db_url) = match load_config(&args.common) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    match page_status_report(&PgStore::new(db_url), args.start, args.end, timezone).await {
        Ok(report) => {
            println!("{}", report.markdown);
            0
        }
        Err(err) => report_failure("dashboard_query_failed", "dashboard query failed", &err),
    }
}

/// Long-running mode: staging poller, upload jobs, recovery sweeper and the HTTP server.
pub async fn run_serve(args: ServeArgs) -> i32 {
    let metrics_addr = match validate_serve_args(&args) {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };
    let (config, db_url) = match load_config(&args.common) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let token = match config.require_token() {
        Ok(token) => token.to_string(),
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };
    if let Err(code) = migrate_database(&db_url).await {
        return code;
    }

    let store = PgStore::new(db_url);
    let shutdown = CancellationToken::new();
    let chunk_timeout = Duration::from_secs(args.chunk_timeout_secs);
    let worker = match build_chunk_worker(
        &config,
        &token,
        store.clone(),
        &args.staging_dir,
        uploader_config(args.max_blocks.unwrap_or(config.max_blocks), chunk_timeout),
        &shutdown,
    ) {
        Ok(worker) => worker,
        Err(err) => {
            return report_failure(
                "workspace_client_build_failed",
                "failed to build workspace client",
                &err,
            )
        }
    };

    let app_state = Arc::new(AppState::new(store.clone(), shutdown.clone()));
    let server_handle = match setup_server_with_addr(app_state, metrics_addr).await {
        Ok(handle) => handle,
        Err(err) => {
            return report_failure(
                "metrics_server_start_failed",
                "failed to start http endpoint",
                &err,
            )
        }
    };
    let signal_handle = tokio::spawn(handle_shutdown_signals(shutdown.clone()));

    let (ready_tx, ready_rx) = flume::unbounded();
    let (events_tx, events_rx) = flume::unbounded();
    let service = Arc::new(UploadService::new(
        store.clone(),
        worker,
        semaphore_config(&config, args.lock_attempts),
        OrchestratorConfig {
            chunk_timeout,
            ..OrchestratorConfig::default()
        },
        events_tx,
        shutdown.clone(),
    ));
    // The sweeper outlives shutdown: it stops once every job has reported.
    let sweeper_handle = {
        let sweeper = RecoverySweeper::new(store.clone());
        tokio::spawn(async move { sweeper.run(events_rx, CancellationToken::new()).await })
    };
    let jobs_handle = tokio::spawn(service.run_triggered(ready_rx));

    let staging = Arc::new(FsStaging::new(&args.staging_dir));
    let ingestor = BlockIngestor::new(store, staging.clone(), Arc::new(MarkdownRenderer))
        .with_batch_ready(ready_tx);
    let poll_result = poll_staging(
        &ingestor,
        staging,
        args.ingest_existing,
        Duration::from_secs(args.poll_interval_secs),
        &shutdown,
    )
    .await;

    shutdown.cancel();
    drop(ingestor);
    if let Err(err) = jobs_handle.await {
        error!(event = "upload_jobs_join_failed", error = %err, "upload job loop panicked");
    }
    if let Err(err) = sweeper_handle.await {
        error!(event = "sweeper_join_failed", error = %err, "recovery sweeper panicked");
    }
    let _ = signal_handle.await;
    let _ = server_handle.await;

    match poll_result {
        Ok(()) => {
            info!(event = "serve_stopped", "serve mode stopped");
            0
        }
        Err(err) => report_failure("staging_poll_failed", "staging poller failed", &err),
    }
}

/// Turns new or rewritten staged documents into arrivals until `shutdown` fires.
async fn poll_staging(
    ingestor: &BlockIngestor<PgStore>,
    staging: Arc<FsStaging>,
    ingest_existing: bool,
    interval: Duration,
    shutdown: &CancellationToken,
) -> Result<(), Error> {
    let mut tracker = if ingest_existing {
        ArrivalTracker::default()
    } else {
        ArrivalTracker::baseline(&scan_staging(staging.clone()).await?)
    };

    loop {
        match scan_staging(staging.clone()).await {
            Ok(documents) => {
                for document in tracker.take_new(&documents) {
                    let event = arrival_event(&staging, &document);
                    match ingestor.ingest_with_redrive(&event).await {
                        Ok(RedriveOutcome::Ingested(report)) => info!(
                            event = "arrival_ingested",
                            batch_id = %report.batch_id,
                            source_location = %report.source_location,
                            "new document queued for upload"
                        ),
                        Ok(RedriveOutcome::DeadLettered { attempts, .. }) => warn!(
                            event = "arrival_dead_lettered",
                            source_location = %event.source_location,
                            attempts,
                            "document could not be ingested"
                        ),
                        Err(err) => error!(
                            event = "arrival_failed",
                            source_location = %event.source_location,
                            error = %format_error_report(&err),
                            "arrival could not be ingested or recorded"
                        ),
                    }
                }
            }
            // Files can vanish between listing and stat; the next tick rescans.
            Err(err) => warn!(
                event = "staging_scan_failed",
                error = %err,
                "staging scan failed; retrying next tick"
            ),
        }

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;

    use super::{
        arrival_event, semaphore_config, uploader_config, validate_dashboard_args,
        validate_serve_args, validate_sweep_args, validate_upload_args,
    };
    use crate::config::Config;
    use crate::cli::{Cli, Command};
    use crate::dashboard::DashboardTimezone;
    use crate::staging::{FsStaging, StagedDocument};

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["upload_worker"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("args should parse").command
    }

    #[test]
    fn upload_validation_rejects_bad_values() {
        let Command::Upload(args) = parse(&[
            "upload",
            "--batch-id",
            " ",
            "--staging-dir",
            "/tmp",
        ]) else {
            panic!("expected upload");
        };
        assert!(validate_upload_args(&args).is_err());

        let Command::Upload(args) = parse(&[
            "upload",
            "--batch-id",
            "b1",
            "--staging-dir",
            "/tmp",
            "--max-blocks",
            "0",
        ]) else {
            panic!("expected upload");
        };
        assert!(validate_upload_args(&args)
            .expect_err("zero max blocks")
            .contains("--max-blocks"));

        let Command::Upload(args) = parse(&[
            "upload",
            "--batch-id",
            "b1",
            "--staging-dir",
            "/tmp",
            "--chunk-timeout-secs",
            "60",
            "--job-timeout-secs",
            "30",
        ]) else {
            panic!("expected upload");
        };
        assert!(validate_upload_args(&args).is_err());
    }

    #[test]
    fn serve_validation_parses_bind_address() {
        let Command::Serve(args) = parse(&["serve", "--staging-dir", "/tmp"]) else {
            panic!("expected serve");
        };
        let addr = validate_serve_args(&args).expect("defaults are valid");
        assert_eq!(addr.port(), 3000);

        let Command::Serve(args) = parse(&[
            "serve",
            "--staging-dir",
            "/tmp",
            "--metrics-bind",
            "not-an-addr",
        ]) else {
            panic!("expected serve");
        };
        assert!(validate_serve_args(&args)
            .expect_err("bad bind")
            .contains("--metrics-bind"));
    }

    #[test]
    fn sweep_needs_one_mode() {
        let Command::Sweep(args) = parse(&["sweep"]) else {
            panic!("expected sweep");
        };
        assert!(validate_sweep_args(&args).is_err());

        let Command::Sweep(args) = parse(&["sweep", "--reconcile"]) else {
            panic!("expected sweep");
        };
        assert!(validate_sweep_args(&args).is_ok());

        let Command::Sweep(args) = parse(&["sweep", "--owner-id", "exec-1"]) else {
            panic!("expected sweep");
        };
        assert!(validate_sweep_args(&args).is_ok());
    }

    #[test]
    fn dashboard_validation_checks_range_and_offset() {
        let Command::Dashboard(args) = parse(&["dashboard", "--start", "5", "--end", "1"]) else {
            panic!("expected dashboard");
        };
        assert!(validate_dashboard_args(&args).is_err());

        let Command::Dashboard(args) = parse(&["dashboard", "--start", "1", "--end", "5"]) else {
            panic!("expected dashboard");
        };
        assert_eq!(
            validate_dashboard_args(&args),
            Ok(DashboardTimezone::Utc)
        );
    }

    #[test]
    fn arrivals_carry_modification_time_as_iso_utc() {
        let staging = FsStaging::new(PathBuf::from("/srv/staging"));
        let event = arrival_event(
            &staging,
            &StagedDocument {
                source_location: "history/Rome.md".to_string(),
                modified_ms: 1_704_164_645_123,
            },
        );
        assert_eq!(event.source_location, "history/Rome.md");
        assert_eq!(event.origin_container, "/srv/staging");
        assert_eq!(event.event_time, "2024-01-02T03:04:05.123Z");
    }

    #[test]
    fn chunk_budget_leaves_headroom_before_the_timeout() {
        let config = uploader_config(50, Duration::from_secs(600));
        assert_eq!(config.max_blocks, 50);
        assert_eq!(config.chunk_budget, Duration::from_secs(540));
    }

    #[test]
    fn lock_attempts_flag_sets_the_poll_limit() {
        let config = Config::from_lookup(|key| match key {
            "LOCK_NAME" => Some("WikiLock".to_string()),
            "CONCURRENCY_LIMIT" => Some("2".to_string()),
            _ => None,
        })
        .expect("config");

        let semaphore = semaphore_config(&config, 7);

        assert_eq!(semaphore.lock_name, "WikiLock");
        assert_eq!(semaphore.limit, 2);
        assert_eq!(semaphore.poll_policy.max_attempts, 7);
    }
}
