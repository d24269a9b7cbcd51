//! The resilient fetch pipeline: rate limit, circuit break, retry.
//!
//! Every attempt runs through the per-host token bucket and the
//! per-upstream circuit breaker before touching the wire. Only network
//! errors and 5xx feed the breaker; 404 and 429 never do, and 429 is
//! retried with backoff, honoring `Retry-After`.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::backoff::{Backoff, BackoffConfig, BackoffError, ErrorOrThrottle};
use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::throttle::{ThrottleConfig, Throttler};
use crate::upstream::transport::{self, HttpResponse, HttpTransport};
use crate::upstream::Upstream;

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum FetchError {
    #[error("Upstream returned 404 for {url}")]
    NotFound { url: String },

    #[error("Rate limited by {host}")]
    RateLimited { host: String },

    #[error("Network failure: {message}")]
    Network { message: String },

    #[error("Server error from {upstream}: {message}")]
    UpstreamServer { upstream: Upstream, message: String },

    #[error("Circuit open for {upstream}")]
    CircuitOpen { upstream: Upstream },
}

pub type Result<T, E = FetchError> = std::result::Result<T, E>;

/// Shared fetch pipeline. One instance per [`crate::Client`]; no global
/// state, so tests get independent limiters and breakers.
#[derive(Debug)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    throttle: Throttler,
    breakers: HashMap<Upstream, CircuitBreaker>,
    backoff_config: BackoffConfig,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        throttle_config: ThrottleConfig,
        breaker_config: BreakerConfig,
        backoff_config: BackoffConfig,
    ) -> Self {
        let breakers = Upstream::ALL
            .into_iter()
            .map(|u| (u, CircuitBreaker::new(u.as_str(), breaker_config.clone())))
            .collect();

        Self {
            transport,
            throttle: Throttler::new(throttle_config),
            breakers,
            backoff_config,
        }
    }

    /// Fetches `url`, applying admission control and the retry policy.
    /// `context` carries the canonical id for observability.
    pub async fn fetch(&self, url: &Url, context: &str) -> Result<HttpResponse> {
        let upstream = Upstream::for_url(url).ok_or_else(|| FetchError::Network {
            message: format!("no known upstream serves {url}"),
        })?;
        let breaker = &self.breakers[&upstream];

        let mut backoff = Backoff::new(&self.backoff_config);
        let outcome = backoff
            .retry_with_backoff(context, || async {
                self.throttle.acquire(upstream.host()).await;

                if !breaker.try_acquire() {
                    return ControlFlow::Break(Err(FetchError::CircuitOpen { upstream }));
                }

                let response = match self.transport.get(url, context).await {
                    Ok(response) => response,
                    Err(e) => {
                        breaker.record_failure();
                        return ControlFlow::Continue(ErrorOrThrottle::Error(classify(e)));
                    }
                };

                debug!(%url, context, status = response.status, "upstream response");

                match response.status {
                    200..=299 => {
                        breaker.record_success();
                        ControlFlow::Break(Ok(response))
                    }
                    404 => ControlFlow::Break(Err(FetchError::NotFound {
                        url: url.to_string(),
                    })),
                    429 => {
                        let error = FetchError::RateLimited {
                            host: upstream.host().to_owned(),
                        };
                        match response.retry_after {
                            Some(secs) => ControlFlow::Continue(ErrorOrThrottle::Throttle {
                                error,
                                wait: Duration::from_secs(secs),
                            }),
                            None => ControlFlow::Continue(ErrorOrThrottle::Error(error)),
                        }
                    }
                    status @ 500..=599 => {
                        breaker.record_failure();
                        ControlFlow::Continue(ErrorOrThrottle::Error(FetchError::UpstreamServer {
                            upstream,
                            message: format!("HTTP {status}"),
                        }))
                    }
                    status => ControlFlow::Break(Err(FetchError::Network {
                        message: format!("unexpected HTTP {status} from {}", upstream.host()),
                    })),
                }
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(BackoffError::RetriesExhausted { source, .. }) => Err(source),
        }
    }

    /// Breaker state for the `status` tool.
    pub fn breaker_state(&self, upstream: Upstream) -> BreakerState {
        self.breakers[&upstream].state()
    }
}

fn classify(e: transport::Error) -> FetchError {
    FetchError::Network {
        message: e.to_string(),
    }
}
