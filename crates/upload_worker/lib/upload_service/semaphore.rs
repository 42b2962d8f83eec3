use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::server::monitoring::UPLOAD_METRICS;
use crate::store::{
    force_clear_owner, get_semaphore, reconcile_semaphore_count, release_slot, try_acquire_slot,
    AcquireAttempt, ClearOutcome, SemaphoreState,
};

use super::block_uploader::compute_backoff_delay;
use super::error::Error;
use super::store_handle::StoreHandle;
use super::types::{RetryPolicy, DEFAULT_LOCK_NAME};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreConfig {
    pub lock_name: String,
    pub limit: i64,
    /// Backoff between attempts while every slot is taken. Its `max_attempts` is the number
    /// of conditional increments tried before giving up with `LockTimeout`.
    pub poll_policy: RetryPolicy,
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            limit: 1,
            poll_policy: RetryPolicy {
                max_attempts: 720,
                initial_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(5),
                jitter: Duration::from_millis(250),
            },
        }
    }
}

/// Per-job view of the lock.
///
/// `Abandoned` is entered when the holder stops without releasing; only the recovery sweeper
/// moves the slot on from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    Unlocked,
    Acquiring,
    Held,
    Releasing,
    Abandoned,
}

impl LockPhase {
    pub fn can_transition_to(self, next: LockPhase) -> bool {
        use LockPhase::*;
        matches!(
            (self, next),
            (Unlocked, Acquiring)
                | (Acquiring, Held)
                | (Acquiring, Unlocked)
                | (Held, Releasing)
                | (Held, Abandoned)
                | (Releasing, Unlocked)
                | (Releasing, Abandoned)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockPhase::Unlocked => "unlocked",
            LockPhase::Acquiring => "acquiring",
            LockPhase::Held => "held",
            LockPhase::Releasing => "releasing",
            LockPhase::Abandoned => "abandoned",
        }
    }
}

/// Proof of a held slot, returned by `acquire`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldSlot {
    pub lock_name: String,
    pub owner_id: String,
    pub attempts: u32,
    pub waited: Duration,
}

/// Counting lock over the durable store, shared by every process that writes to the workspace.
#[derive(Clone)]
pub struct DistributedSemaphore<S> {
    store: S,
    config: SemaphoreConfig,
}

impl<S> DistributedSemaphore<S>
where
    S: StoreHandle,
{
    pub fn new(store: S, config: SemaphoreConfig) -> Self {
        Self { store, config }
    }

    pub fn lock_name(&self) -> &str {
        &self.config.lock_name
    }

    /// Polls until `owner_id` holds a slot.
    ///
    /// Each attempt is one conditional increment; a full semaphore is retried with backoff.
    /// Fails with `LockTimeout` after `poll_policy.max_attempts` attempts and with `Cancelled`
    /// when `cancel` fires while waiting.
    pub async fn acquire(
        &self,
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<HeldSlot, Error> {
        let started = Instant::now();
        let max_attempts = self.config.poll_policy.max_attempts.max(1);
        let seed = owner_seed(owner_id);

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = {
                let lock_name = self.config.lock_name.clone();
                let owner = owner_id.to_string();
                let limit = self.config.limit;
                self.store
                    .run(move |conn| Ok(try_acquire_slot(conn, &lock_name, &owner, limit)?))
                    .await?
            };

            match outcome {
                AcquireAttempt::Acquired | AcquireAttempt::AlreadyHeld => {
                    let waited = started.elapsed();
                    if let Some(metrics) = UPLOAD_METRICS.get() {
                        metrics.last_lock_wait_seconds.set(waited.as_secs() as i64);
                    }
                    info!(
                        event = "semaphore_acquired",
                        lock_name = %self.config.lock_name,
                        owner_id,
                        attempt,
                        reentrant = outcome == AcquireAttempt::AlreadyHeld,
                        waited_ms = waited.as_millis() as u64,
                        "semaphore slot acquired"
                    );
                    return Ok(HeldSlot {
                        lock_name: self.config.lock_name.clone(),
                        owner_id: owner_id.to_string(),
                        attempts: attempt,
                        waited,
                    });
                }
                AcquireAttempt::Full { current_lock_count } => {
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = compute_backoff_delay(&self.config.poll_policy, attempt, seed);
                    debug!(
                        event = "semaphore_full",
                        lock_name = %self.config.lock_name,
                        owner_id,
                        attempt,
                        current_lock_count,
                        delay_ms = delay.as_millis() as u64,
                        "semaphore full; polling"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Some(metrics) = UPLOAD_METRICS.get() {
            metrics.lock_acquire_timeouts_total.inc();
        }
        warn!(
            event = "semaphore_acquire_timeout",
            lock_name = %self.config.lock_name,
            owner_id,
            attempts = max_attempts,
            waited_ms = started.elapsed().as_millis() as u64,
            "gave up waiting for a semaphore slot"
        );
        Err(Error::LockTimeout {
            lock_name: self.config.lock_name.clone(),
            attempts: max_attempts,
        })
    }

    /// Returns `owner_id`'s slot. `false` when it held none.
    pub async fn release(&self, owner_id: &str) -> Result<bool, Error> {
        let lock_name = self.config.lock_name.clone();
        let owner = owner_id.to_string();
        let released = self
            .store
            .run(move |conn| Ok(release_slot(conn, &lock_name, &owner)?))
            .await?;

        info!(
            event = "semaphore_released",
            lock_name = %self.config.lock_name,
            owner_id,
            released,
            "semaphore release finished"
        );
        Ok(released)
    }

    /// Removes `owner_id` without its cooperation.
    pub async fn force_clear(&self, owner_id: &str) -> Result<ClearOutcome, Error> {
        let lock_name = self.config.lock_name.clone();
        let owner = owner_id.to_string();
        Ok(self
            .store
            .run(move |conn| Ok(force_clear_owner(conn, &lock_name, &owner)?))
            .await?)
    }

    pub async fn reconcile(&self) -> Result<Option<(i64, i64)>, Error> {
        let lock_name = self.config.lock_name.clone();
        self.store
            .run(move |conn| Ok(reconcile_semaphore_count(conn, &lock_name)?))
            .await
    }

    pub async fn state(&self) -> Result<Option<SemaphoreState>, Error> {
        let lock_name = self.config.lock_name.clone();
        self.store
            .run(move |conn| Ok(get_semaphore(conn, &lock_name)?))
            .await
    }
}

fn owner_seed(owner_id: &str) -> u64 {
    owner_id
        .bytes()
        .fold(0u64, |hash, byte| hash.rotate_left(5) ^ u64::from(byte))
}
