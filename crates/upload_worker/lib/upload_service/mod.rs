pub mod block_uploader;
pub mod dlq;
mod error;
pub mod ingest;
pub mod orchestrator;
pub mod semaphore;
mod store_handle;
pub mod sweeper;
pub mod types;

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use error::Error;
pub use orchestrator::{JobReport, OrchestratorConfig, UploadOrchestrator};
pub use semaphore::{DistributedSemaphore, SemaphoreConfig};
#[cfg(any(test, feature = "sqlite-tests"))]
pub use store_handle::SqliteStore;
pub use store_handle::{PgStore, StoreHandle};
pub use sweeper::{RecoverySweeper, SweepOutcome};

use block_uploader::ChunkWorker;
use types::{BatchReady, GlobalRateLimiter, LifecycleEvent};

use crate::logging::format_error_report;

/// Builds the process-wide limiter for workspace API calls. Zero falls back to 3 req/s.
pub fn build_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(3u32));
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Runs orchestrators for batches, sharing one worker, one lock configuration and one
/// lifecycle channel.
pub struct UploadService<S> {
    store: S,
    worker: Arc<dyn ChunkWorker>,
    semaphore_config: SemaphoreConfig,
    orchestrator_config: OrchestratorConfig,
    events: flume::Sender<LifecycleEvent>,
    shutdown: CancellationToken,
}

impl<S> UploadService<S>
where
    S: StoreHandle,
{
    pub fn new(
        store: S,
        worker: Arc<dyn ChunkWorker>,
        semaphore_config: SemaphoreConfig,
        orchestrator_config: OrchestratorConfig,
        events: flume::Sender<LifecycleEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            worker,
            semaphore_config,
            orchestrator_config,
            events,
            shutdown,
        }
    }

    pub fn orchestrator(&self) -> UploadOrchestrator<S> {
        UploadOrchestrator::new(
            self.store.clone(),
            DistributedSemaphore::new(self.store.clone(), self.semaphore_config.clone()),
            self.worker.clone(),
            self.orchestrator_config,
            self.shutdown.clone(),
        )
        .with_events(self.events.clone())
    }

    pub async fn run_batch(&self, batch_id: &str) -> Result<JobReport, Error> {
        self.orchestrator().run(batch_id).await
    }

    /// Starts one orchestrator per `BatchReady` until the channel closes or shutdown fires,
    /// then waits for the started jobs.
    ///
    /// Jobs contend for the semaphore; at most `limit` of them write at any time.
    pub async fn run_triggered(self: Arc<Self>, ready: flume::Receiver<BatchReady>) {
        let mut jobs = JoinSet::new();

        loop {
            let batch = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = ready.recv_async() => match received {
                    Ok(batch) => batch,
                    Err(_) => break,
                },
            };

            info!(
                event = "upload_job_triggered",
                batch_id = %batch.batch_id,
                source_location = %batch.source_location,
                "batch ready; starting orchestrator"
            );
            let service = self.clone();
            jobs.spawn(async move {
                if let Err(err) = service.run_batch(&batch.batch_id).await {
                    error!(
                        event = "upload_job_error",
                        batch_id = %batch.batch_id,
                        error = %format_error_report(&err),
                        "upload job could not run"
                    );
                }
            });

            while let Some(joined) = jobs.try_join_next() {
                log_join_error(joined);
            }
        }

        while let Some(joined) = jobs.join_next().await {
            log_join_error(joined);
        }
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!(
            event = "upload_job_panicked",
            error = %err,
            "upload job task failed to join"
        );
    }
}
