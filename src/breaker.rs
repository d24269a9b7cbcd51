//! Per-upstream circuit breaking.
//!
//! Closed/open/half-open state machine: `failure_threshold` consecutive
//! qualifying failures open the circuit; after `recovery_timeout` a single
//! probe is admitted, and its outcome decides between closing again and
//! re-opening. Only network errors and HTTP 5xx qualify; callers are
//! responsible for not recording 4xx outcomes here.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive qualifying failures before the circuit opens.
    pub failure_threshold: u32,

    /// Time the circuit stays open before admitting a probe.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Externally observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed {
        failures: u32,
    },
    Open {
        since: Instant,
    },
    HalfOpen {
        /// When the outstanding probe was admitted, if any.
        probe_started: Option<Instant>,
    },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    name: &'static str,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            config,
            name,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    /// Admission check before issuing a request. Returns `false` when the
    /// circuit short-circuits the call.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { .. } => true,
            State::Open { since } => {
                if since.elapsed() >= self.config.recovery_timeout {
                    info!(upstream = self.name, "circuit half-open, admitting probe");
                    *state = State::HalfOpen {
                        probe_started: Some(Instant::now()),
                    };
                    true
                } else {
                    false
                }
            }
            State::HalfOpen { probe_started } => match probe_started {
                None => {
                    *probe_started = Some(Instant::now());
                    true
                }
                // A probe that never reported back (e.g. the caller was
                // cancelled) must not wedge the breaker forever.
                Some(started) if started.elapsed() >= self.config.recovery_timeout => {
                    *probe_started = Some(Instant::now());
                    true
                }
                Some(_) => false,
            },
        }
    }

    /// Records a successful response.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match &*state {
            State::Closed { failures: 0 } => {}
            State::Closed { .. } => *state = State::Closed { failures: 0 },
            State::HalfOpen { .. } | State::Open { .. } => {
                info!(upstream = self.name, "circuit closed");
                *state = State::Closed { failures: 0 };
            }
        }
    }

    /// Records a qualifying failure (network error or HTTP 5xx).
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    warn!(
                        upstream = self.name,
                        failures, "failure threshold reached, circuit open",
                    );
                    *state = State::Open {
                        since: Instant::now(),
                    };
                }
            }
            State::HalfOpen { .. } => {
                warn!(upstream = self.name, "probe failed, circuit open");
                *state = State::Open {
                    since: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        match &*self.state.lock() {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test", BreakerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_exactly_threshold_failures() {
        let breaker = breaker();

        for _ in 0..4 {
            assert!(breaker.try_acquire());
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::Closed);
        }

        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_streak() {
        let breaker = breaker();

        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn single_probe_after_recovery_timeout() {
        let breaker = breaker();

        for _ in 0..5 {
            breaker.record_failure();
        }
        assert!(!breaker.try_acquire());

        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // second caller while the probe is outstanding
        assert!(!breaker.try_acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let breaker = breaker();

        for _ in 0..5 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(breaker.try_acquire());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
    }
}
