use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::logging::format_error_report;
use crate::server::monitoring::UPLOAD_METRICS;
use crate::store::{upsert_page_status, PageStatus};

use super::block_uploader::ChunkWorker;
use super::error::Error;
use super::semaphore::{DistributedSemaphore, LockPhase};
use super::store_handle::StoreHandle;
use super::types::{ChunkStatus, ExecutionStatus, JobResult, LifecycleEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Hard limit for one worker invocation.
    pub chunk_timeout: Duration,
    /// Hard limit for the whole job, lock wait excluded.
    pub job_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_timeout: Duration::from_secs(600),
            job_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Outcome of one orchestrated job that got as far as holding the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub execution_id: String,
    pub batch_id: String,
    pub job: JobResult,
    pub status: ExecutionStatus,
    pub chunks: u32,
    /// `false` when the slot was left for the recovery sweeper.
    pub lock_released: bool,
    pub failure_message: Option<String>,
}

enum LoopOutcome {
    Drained,
    Failed(String),
    TimedOut(String),
    Aborted,
}

struct LoopTotals {
    chunks: u32,
    success_block_count: usize,
    fail_block_count: usize,
}

/// Drives the chunk worker for one batch while holding a semaphore slot.
pub struct UploadOrchestrator<S> {
    store: S,
    semaphore: DistributedSemaphore<S>,
    worker: Arc<dyn ChunkWorker>,
    config: OrchestratorConfig,
    events: Option<flume::Sender<LifecycleEvent>>,
    shutdown: CancellationToken,
}

impl<S> UploadOrchestrator<S>
where
    S: StoreHandle,
{
    pub fn new(
        store: S,
        semaphore: DistributedSemaphore<S>,
        worker: Arc<dyn ChunkWorker>,
        config: OrchestratorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            semaphore,
            worker,
            config,
            events: None,
            shutdown,
        }
    }

    /// Sends one `LifecycleEvent` per execution to `events`.
    pub fn with_events(mut self, events: flume::Sender<LifecycleEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self, batch_id: &str) -> Result<JobReport, Error> {
        let execution_id = Uuid::new_v4().to_string();
        self.run_as(batch_id, &execution_id).await
    }

    /// Runs the job with a caller-chosen execution id, which is also the semaphore owner id.
    pub async fn run_as(&self, batch_id: &str, execution_id: &str) -> Result<JobReport, Error> {
        if batch_id.trim().is_empty() {
            return Err(Error::InvalidEvent("batch_id must be non-empty".to_string()));
        }

        let mut phase = LockPhase::Unlocked;
        transition(&mut phase, LockPhase::Acquiring, execution_id);
        info!(
            event = "upload_job_started",
            execution_id,
            batch_id,
            lock_name = self.semaphore.lock_name(),
            "waiting for semaphore"
        );

        if let Err(err) = self.semaphore.acquire(execution_id, &self.shutdown).await {
            transition(&mut phase, LockPhase::Unlocked, execution_id);
            let status = match err {
                Error::Cancelled => ExecutionStatus::Aborted,
                _ => ExecutionStatus::Failed,
            };
            if let Some(metrics) = UPLOAD_METRICS.get() {
                metrics.jobs_failed_total.inc();
            }
            error!(
                event = "upload_job_lock_failed",
                execution_id,
                batch_id,
                status = status.as_str(),
                error = %format_error_report(&err),
                "could not acquire semaphore; no work attempted"
            );
            self.emit(execution_id, batch_id, status);
            return Err(err);
        }
        transition(&mut phase, LockPhase::Held, execution_id);

        self.record_status(batch_id, PageStatus::Uploading).await;
        let (outcome, totals) = self.drive(batch_id).await;

        let (status, lock_released, failure_message) = match outcome {
            LoopOutcome::Drained => {
                transition(&mut phase, LockPhase::Releasing, execution_id);
                match self.semaphore.release(execution_id).await {
                    Ok(_) => {
                        transition(&mut phase, LockPhase::Unlocked, execution_id);
                        (ExecutionStatus::Succeeded, true, None)
                    }
                    Err(err) => {
                        transition(&mut phase, LockPhase::Abandoned, execution_id);
                        (
                            ExecutionStatus::Failed,
                            false,
                            Some(format!("semaphore release failed: {err}")),
                        )
                    }
                }
            }
            LoopOutcome::Failed(message) => {
                transition(&mut phase, LockPhase::Releasing, execution_id);
                match self.semaphore.release(execution_id).await {
                    Ok(_) => {
                        transition(&mut phase, LockPhase::Unlocked, execution_id);
                        (ExecutionStatus::Failed, true, Some(message))
                    }
                    Err(err) => {
                        transition(&mut phase, LockPhase::Abandoned, execution_id);
                        (
                            ExecutionStatus::Failed,
                            false,
                            Some(format!("{message}; semaphore release failed: {err}")),
                        )
                    }
                }
            }
            LoopOutcome::TimedOut(message) => {
                transition(&mut phase, LockPhase::Abandoned, execution_id);
                (ExecutionStatus::TimedOut, false, Some(message))
            }
            LoopOutcome::Aborted => {
                transition(&mut phase, LockPhase::Abandoned, execution_id);
                (
                    ExecutionStatus::Aborted,
                    false,
                    Some("shutdown requested while the job held the lock".to_string()),
                )
            }
        };

        let job = JobResult {
            result: if status == ExecutionStatus::Succeeded {
                ChunkStatus::Success
            } else {
                ChunkStatus::Fail
            },
            success_block_count: totals.success_block_count,
            fail_block_count: totals.fail_block_count,
        };

        let page_status = match status {
            ExecutionStatus::Succeeded => PageStatus::Complete,
            ExecutionStatus::Failed => PageStatus::Failed,
            ExecutionStatus::TimedOut | ExecutionStatus::Aborted => PageStatus::Stalled,
        };
        self.record_status(batch_id, page_status).await;

        if let Some(metrics) = UPLOAD_METRICS.get() {
            match status {
                ExecutionStatus::Succeeded => metrics.jobs_succeeded_total.inc(),
                ExecutionStatus::Failed => metrics.jobs_failed_total.inc(),
                ExecutionStatus::TimedOut | ExecutionStatus::Aborted => {
                    metrics.jobs_abandoned_total.inc()
                }
            };
        }

        if status == ExecutionStatus::Succeeded {
            info!(
                event = "upload_job_finished",
                execution_id,
                batch_id,
                status = status.as_str(),
                chunks = totals.chunks,
                success_block_count = job.success_block_count,
                "batch drained"
            );
        } else {
            warn!(
                event = "upload_job_finished",
                execution_id,
                batch_id,
                status = status.as_str(),
                chunks = totals.chunks,
                success_block_count = job.success_block_count,
                fail_block_count = job.fail_block_count,
                lock_released,
                failure = failure_message.as_deref().unwrap_or(""),
                "upload job ended without draining the batch"
            );
        }
        self.emit(execution_id, batch_id, status);

        Ok(JobReport {
            execution_id: execution_id.to_string(),
            batch_id: batch_id.to_string(),
            job,
            status,
            chunks: totals.chunks,
            lock_released,
            failure_message,
        })
    }

    async fn drive(&self, batch_id: &str) -> (LoopOutcome, LoopTotals) {
        let deadline = Instant::now() + self.config.job_timeout;
        let mut totals = LoopTotals {
            chunks: 0,
            success_block_count: 0,
            fail_block_count: 0,
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let message = format!("job exceeded {:?}", self.config.job_timeout);
                return (LoopOutcome::TimedOut(message), totals);
            }
            let budget = remaining.min(self.config.chunk_timeout);

            if self.shutdown.is_cancelled() {
                return (LoopOutcome::Aborted, totals);
            }
            // Shutdown is not raced against the chunk; the worker stops at a block boundary.
            let chunk = tokio::time::timeout(
                budget,
                AssertUnwindSafe(self.worker.process_chunk(batch_id)).catch_unwind(),
            )
            .await;
            totals.chunks += 1;
            if let Some(metrics) = UPLOAD_METRICS.get() {
                metrics.chunks_total.inc();
            }

            let result = match chunk {
                Err(_) => {
                    let message = if budget < self.config.chunk_timeout {
                        format!("job exceeded {:?}", self.config.job_timeout)
                    } else {
                        format!("chunk exceeded {:?}", self.config.chunk_timeout)
                    };
                    return (LoopOutcome::TimedOut(message), totals);
                }
                Ok(Err(payload)) => {
                    let message = format!("worker panicked: {}", panic_message(payload.as_ref()));
                    error!(
                        event = "chunk_worker_panicked",
                        batch_id,
                        chunk = totals.chunks,
                        panic = %message,
                        "worker invocation panicked"
                    );
                    return (LoopOutcome::Failed(message), totals);
                }
                Ok(Ok(Err(err))) => {
                    let message = format!("worker invocation failed: {err}");
                    error!(
                        event = "chunk_invocation_failed",
                        batch_id,
                        chunk = totals.chunks,
                        error = %format_error_report(&err),
                        "worker invocation errored"
                    );
                    return (LoopOutcome::Failed(message), totals);
                }
                Ok(Ok(Ok(result))) => result,
            };

            totals.success_block_count += result.success_block_count;
            totals.fail_block_count += result.fail_block_count;
            debug!(
                event = "chunk_result",
                batch_id,
                chunk = totals.chunks,
                result = result.status.as_str(),
                processed_count = result.processed_count,
                "worker returned"
            );

            if result.status == ChunkStatus::Fail {
                let message = match &result.failure {
                    Some(failure) => format!(
                        "block {} failed after {} attempt(s): {}",
                        failure.block_index, failure.attempts, failure.error
                    ),
                    None => "worker reported FAIL".to_string(),
                };
                return (LoopOutcome::Failed(message), totals);
            }
            // A chunk cut short by shutdown can look drained.
            if self.shutdown.is_cancelled() {
                return (LoopOutcome::Aborted, totals);
            }
            if result.is_drained() {
                return (LoopOutcome::Drained, totals);
            }
        }
    }

    async fn record_status(&self, batch_id: &str, status: PageStatus) {
        let batch = batch_id.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let result = self
            .store
            .run(move |conn| Ok(upsert_page_status(conn, &batch, None, status, now)?))
            .await;
        if let Err(err) = result {
            warn!(
                event = "page_status_write_failed",
                batch_id,
                status = status.as_db_str(),
                error = %err,
                "could not record page status"
            );
        }
    }

    fn emit(&self, execution_id: &str, batch_id: &str, status: ExecutionStatus) {
        let Some(events) = &self.events else {
            return;
        };
        let event = LifecycleEvent {
            execution_id: execution_id.to_string(),
            batch_id: batch_id.to_string(),
            lock_name: self.semaphore.lock_name().to_string(),
            status,
        };
        if events.send(event).is_err() {
            warn!(
                event = "lifecycle_event_dropped",
                execution_id,
                batch_id,
                status = status.as_str(),
                "no lifecycle consumer is listening"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn transition(phase: &mut LockPhase, next: LockPhase, execution_id: &str) {
    debug_assert!(
        phase.can_transition_to(next),
        "invalid lock phase transition {:?} -> {:?}",
        phase,
        next
    );
    debug!(
        event = "lock_phase",
        execution_id,
        from = phase.as_str(),
        to = next.as_str(),
        "lock phase changed"
    );
    *phase = next;
}
