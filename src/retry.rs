//! Retry utilities with exponential backoff and jitter.
//!
//! The reconcile loop uses [`retry_on_conflict`] to re-run a
//! fetch-modify-update closure when the API server rejects a write because
//! the object's resourceVersion went stale. Waiting goes through the
//! [`Sleeper`] trait so tests can record delays instead of sleeping.
//!
//! # Example
//!
//! ```ignore
//! use nginx_operator::retry::{retry_on_conflict, RetryConfig, TokioSleeper};
//!
//! retry_on_conflict(&RetryConfig::conflict(), &TokioSleeper, "update_deployment", || async {
//!     let mut current = client.get_deployment(ns, name).await?;
//!     current.spec = target.spec.clone();
//!     client.update_deployment(&current).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error, warn};

use crate::Error;

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Fraction of each delay added or removed at random (0.1 = +/-10%)
    pub jitter: f64,
}

impl RetryConfig {
    /// Short bounded backoff for optimistic-concurrency conflicts
    ///
    /// Ten attempts starting at 10ms, doubling, capped at 1s, +/-10% jitter.
    pub fn conflict() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Delay to wait before the next attempt, before jitter is applied
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Something that can wait for a duration
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

fn with_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..(1.0 + jitter));
    Duration::from_secs_f64(delay.as_secs_f64() * factor.max(0.0))
}

/// Execute an async operation, retrying while `should_retry` accepts the error.
///
/// Errors rejected by `should_retry` are returned after the first attempt.
/// When `max_attempts` is exhausted the last error is returned.
pub async fn retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => {
                debug!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed with non-retryable error"
                );
                return Err(e);
            }
            Err(e) => {
                if config.exhausted(attempt) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let jittered_delay = with_jitter(delay, config.jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                sleeper.sleep(jittered_delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

/// Re-run `operation` while it fails with [`Error::Conflict`].
///
/// The closure must re-read the object it modifies on every call; a retry
/// that reuses a stale resourceVersion will conflict again.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    operation_name: &str,
    operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    retry_if(config, sleeper, operation_name, Error::is_conflict, operation).await
}
