use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::super::types::{RetryPolicy, UploadError};

/// Terminal state returned by the retry runner.
#[derive(Debug)]
pub struct RetryTerminal {
    pub error: UploadError,
    pub attempts: u32,
    pub exhausted_retryable: bool,
}

/// Runs one remote call under `policy`, sleeping between retryable failures.
///
/// `jitter_seed` spreads the retry schedule of different blocks apart. Returns the value and the
/// attempt number that produced it.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    jitter_seed: u64,
    mut op: F,
) -> Result<(T, u32), RetryTerminal>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UploadError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => error,
        };

        let retryable = error.is_retryable();
        if !retryable || attempt >= max_attempts {
            return Err(RetryTerminal {
                error,
                attempts: attempt,
                exhausted_retryable: retryable,
            });
        }

        let delay = compute_backoff_delay(policy, attempt, jitter_seed);
        debug!(
            event = "remote_call_retry",
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error_kind = ?error.kind,
            error = %error.message,
            "retrying transient remote failure"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}

/// Exponential backoff capped at `max_backoff`, plus deterministic jitter in `[0, jitter]`.
pub fn compute_backoff_delay(policy: &RetryPolicy, attempt: u32, jitter_seed: u64) -> Duration {
    let shift = attempt.saturating_sub(1).min(20);
    let exponential = policy.initial_backoff.saturating_mul(1u32 << shift);
    let capped = exponential.min(policy.max_backoff);

    let jitter_cap = policy.jitter.as_millis() as u64;
    let jitter = if jitter_cap == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(mix(jitter_seed, attempt) % (jitter_cap + 1))
    };

    capped.saturating_add(jitter)
}

fn mix(seed: u64, attempt: u32) -> u64 {
    let mut x = seed ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^ (x >> 33)
}
