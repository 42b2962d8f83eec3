use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::logging::format_error_report;
use crate::server::monitoring::UPLOAD_METRICS;
use crate::store::force_clear_owner;

use super::error::Error;
use super::store_handle::StoreHandle;
use super::types::LifecycleEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The execution ended normally; nothing to repair.
    Ignored,
    /// The stale owner was removed and the count decremented.
    Cleared { current_lock_count: i64 },
    /// The owner held no slot any more (released already, or never acquired).
    NotHeld,
}

/// Clears semaphore slots left behind by executions that ended abnormally.
#[derive(Clone)]
pub struct RecoverySweeper<S> {
    store: S,
}

impl<S> RecoverySweeper<S>
where
    S: StoreHandle,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn handle(&self, event: &LifecycleEvent) -> Result<SweepOutcome, Error> {
        if !event.status.is_abnormal() {
            debug!(
                event = "lifecycle_event_ignored",
                execution_id = %event.execution_id,
                status = event.status.as_str(),
                "execution ended normally"
            );
            return Ok(SweepOutcome::Ignored);
        }
        self.clear_owner(&event.lock_name, &event.execution_id).await
    }

    /// Force-clears `owner_id` from `lock_name`. Also used by the manual sweep command.
    pub async fn clear_owner(&self, lock_name: &str, owner_id: &str) -> Result<SweepOutcome, Error> {
        if lock_name.is_empty() || owner_id.is_empty() {
            return Err(Error::InvalidEvent(
                "lock_name and execution_id must be non-empty".to_string(),
            ));
        }

        let lock = lock_name.to_string();
        let owner = owner_id.to_string();
        let cleared = self
            .store
            .run(move |conn| Ok(force_clear_owner(conn, &lock, &owner)?))
            .await?;

        if !cleared.removed {
            debug!(
                event = "lock_sweep_not_held",
                lock_name,
                owner_id,
                "owner already gone; nothing to clear"
            );
            return Ok(SweepOutcome::NotHeld);
        }

        if let Some(metrics) = UPLOAD_METRICS.get() {
            metrics.locks_swept_total.inc();
        }
        info!(
            event = "lock_swept",
            lock_name,
            owner_id,
            current_lock_count = cleared.current_lock_count,
            "cleared stale semaphore owner"
        );
        Ok(SweepOutcome::Cleared {
            current_lock_count: cleared.current_lock_count,
        })
    }

    /// Consumes lifecycle events until the channel closes or `cancel` fires.
    ///
    /// A failed sweep is logged and the loop keeps going.
    pub async fn run(&self, events: flume::Receiver<LifecycleEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv_async() => match received {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            if let Err(err) = self.handle(&event).await {
                error!(
                    event = "lock_sweep_failed",
                    execution_id = %event.execution_id,
                    lock_name = %event.lock_name,
                    error = %format_error_report(&err),
                    "recovery sweep failed; lock may stay held"
                );
            }
        }

        // Drain what is already queued so a shutdown does not skip repairs.
        while let Ok(event) = events.try_recv() {
            if let Err(err) = self.handle(&event).await {
                warn!(
                    event = "lock_sweep_failed",
                    execution_id = %event.execution_id,
                    error = %err,
                    "recovery sweep failed during drain"
                );
            }
        }
        debug!(event = "sweeper_stopped", "recovery sweeper stopped");
    }
}
