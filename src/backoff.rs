//! Retry driver with exponential backoff and full jitter.

use std::ops::ControlFlow;
use std::time::Duration;

use rand::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

/// Error with backoff-specific context.
#[derive(Debug, Error)]
pub enum BackoffError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Retry budget exhausted after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: usize, source: E },
}

impl<E> BackoffError<E>
where
    E: std::error::Error + 'static,
{
    /// The last error observed before giving up.
    pub fn into_inner(self) -> E {
        match self {
            Self::RetriesExhausted { source, .. } => source,
        }
    }
}

/// A transient error, or a wait mandated by the upstream (e.g. a
/// `Retry-After` on a 429). A mandated wait still consumes an attempt but
/// is honored when longer than the jittered delay.
#[derive(Debug)]
pub enum ErrorOrThrottle<E> {
    Error(E),
    Throttle { error: E, wait: Duration },
}

/// Backoff config.
///
/// Delay for attempt `n` (0-based) is drawn uniformly from
/// `[0, min(base_delay * 2^n, max_delay)]`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Upper bound of the first delay.
    pub base_delay: Duration,

    /// Cap applied to the exponential growth.
    pub max_delay: Duration,

    /// How many times a failed attempt is retried. The total number of
    /// attempts is therefore `max_retries + 1`.
    pub max_retries: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            max_retries: 3,
        }
    }
}

/// Tracks attempts for one logical request and produces jittered delays.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: usize,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            config: config.clone(),
            attempt: 0,
        }
    }

    /// Next delay, full jitter: uniform in `[0, min(base * 2^n, max)]`.
    fn next(&mut self) -> Duration {
        let exp = self.attempt.min(32) as u32;
        let cap = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.config.max_delay);
        self.attempt += 1;

        let mut rng = rand::thread_rng();
        cap.mul_f64(rng.gen::<f64>())
    }

    /// Drives `op` to completion, sleeping between transient failures.
    ///
    /// `op` returns [`ControlFlow::Break`] with the final outcome (success
    /// or a terminal error) or [`ControlFlow::Continue`] with a transient
    /// error to retry.
    pub async fn retry_with_backoff<F, F1, B, E>(
        &mut self,
        request_name: &str,
        mut op: F,
    ) -> Result<B, BackoffError<E>>
    where
        F: FnMut() -> F1 + Send,
        F1: std::future::Future<Output = ControlFlow<B, ErrorOrThrottle<E>>> + Send,
        B: Send,
        E: std::error::Error + Send + 'static,
    {
        loop {
            let (error, mandated) = match op().await {
                ControlFlow::Break(outcome) => {
                    return Ok(outcome);
                }
                ControlFlow::Continue(ErrorOrThrottle::Error(e)) => (e, None),
                ControlFlow::Continue(ErrorOrThrottle::Throttle { error, wait }) => {
                    (error, Some(wait))
                }
            };

            if self.attempt >= self.config.max_retries {
                warn!(
                    e=%error,
                    request_name,
                    attempts = self.attempt + 1,
                    "request failed, retries exhausted",
                );
                return Err(BackoffError::RetriesExhausted {
                    attempts: self.attempt + 1,
                    source: error,
                });
            }

            let mut delay = self.next();
            if let Some(wait) = mandated {
                delay = delay.max(wait);
            }

            info!(
                e=%error,
                request_name,
                delay_ms = delay.as_millis() as u64,
                "request failed, backing off",
            );
            tokio::time::sleep(delay).await;
        }
    }
}
