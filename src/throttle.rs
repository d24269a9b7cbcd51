//! Per-host admission control for upstream requests.
//!
//! Rate limits are advisory to the upstreams, not to callers: `acquire`
//! suspends until a token is available and never fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Token-bucket parameters, applied per host.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Maximum number of tokens a bucket can hold.
    pub capacity: f64,

    /// Tokens added per second. The default of 2.0 enforces a minimum
    /// spacing of 500 ms between requests to the same host.
    pub refill_per_sec: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            capacity: 1.0,
            refill_per_sec: 2.0,
        }
    }
}

/// Process-wide registry of per-host token buckets.
#[derive(Debug)]
pub struct Throttler {
    config: ThrottleConfig,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl Throttler {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until the host's bucket releases a token.
    ///
    /// Waiters for the same host are served FIFO; different hosts do not
    /// affect each other.
    pub async fn acquire(&self, host: &str) {
        let bucket = {
            let mut buckets = self.buckets.lock();
            Arc::clone(
                buckets
                    .entry(host.to_owned())
                    .or_insert_with(|| Arc::new(TokenBucket::new(self.config.clone()))),
            )
        };

        bucket.acquire(host).await;
    }
}

#[derive(Debug)]
struct TokenBucket {
    config: ThrottleConfig,
    // tokio's mutex queues waiters FIFO; sleeping while holding it is
    // what serializes same-host callers.
    state: tokio::sync::Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn new(config: ThrottleConfig) -> Self {
        let tokens = config.capacity;
        Self {
            config,
            state: tokio::sync::Mutex::new(BucketState {
                tokens,
                refilled_at: Instant::now(),
            }),
        }
    }

    async fn acquire(&self, host: &str) {
        let mut state = self.state.lock().await;

        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
            state.tokens =
                (state.tokens + elapsed * self.config.refill_per_sec).min(self.config.capacity);
            state.refilled_at = now;

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return;
            }

            let deficit = 1.0 - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.config.refill_per_sec);
            debug!(host, wait_ms = wait.as_millis() as u64, "throttled");
            tokio::time::sleep(wait).await;
        }
    }
}
