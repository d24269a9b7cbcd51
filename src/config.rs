//! Runtime configuration.
//!
//! Every knob has a builder setter on [`crate::ClientBuilder`];
//! [`Config::from_env`] additionally honors the recognized environment
//! variables. Unknown environment variables are ignored; unparseable
//! values fall back to the default with a warning.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::backoff::BackoffConfig;
use crate::breaker::BreakerConfig;
use crate::throttle::ThrottleConfig;

/// User-Agent sent with every upstream request.
pub const USER_AGENT: &str = concat!("flutter-mcp/", env!("CARGO_PKG_VERSION"));

/// Deadline applied to one externally initiated operation.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the cache database file.
    pub cache_path: PathBuf,

    pub backoff: BackoffConfig,
    pub throttle: ThrottleConfig,
    pub breaker: BreakerConfig,

    /// Deadline for a single `docs`/`search` operation.
    pub deadline: Duration,

    /// Verbose logging requested via `DEBUG`. The library does not install
    /// a subscriber; embedders read this to pick a filter.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            backoff: BackoffConfig::default(),
            throttle: ThrottleConfig::default(),
            breaker: BreakerConfig::default(),
            deadline: DEFAULT_DEADLINE,
            debug: false,
        }
    }
}

impl Config {
    /// Builds a config from the environment:
    ///
    /// - `CACHE_DIR` — directory holding `cache.db`
    /// - `DEBUG` — verbose logging
    /// - `MAX_RETRIES`, `BASE_RETRY_DELAY`, `MAX_RETRY_DELAY` (seconds)
    /// - `REQUESTS_PER_SECOND`
    /// - `FAILURE_THRESHOLD`, `RECOVERY_TIMEOUT` (seconds)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = read_var("CACHE_DIR") {
            config.cache_path = PathBuf::from(dir).join("cache.db");
        }
        if let Some(value) = read_var("DEBUG") {
            config.debug = !matches!(value.as_str(), "" | "0" | "false");
        }
        if let Some(n) = parse_var::<usize>("MAX_RETRIES") {
            config.backoff.max_retries = n;
        }
        if let Some(secs) = parse_var::<f64>("BASE_RETRY_DELAY") {
            config.backoff.base_delay = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = parse_var::<f64>("MAX_RETRY_DELAY") {
            config.backoff.max_delay = Duration::from_secs_f64(secs);
        }
        if let Some(rps) = parse_var::<f64>("REQUESTS_PER_SECOND") {
            if rps > 0.0 {
                config.throttle.refill_per_sec = rps;
            } else {
                warn!(rps, "ignoring non-positive REQUESTS_PER_SECOND");
            }
        }
        if let Some(n) = parse_var::<u32>("FAILURE_THRESHOLD") {
            if n > 0 {
                config.breaker.failure_threshold = n;
            } else {
                warn!("ignoring zero FAILURE_THRESHOLD");
            }
        }
        if let Some(secs) = parse_var::<u64>("RECOVERY_TIMEOUT") {
            config.breaker.recovery_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = read_var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(name, raw, "ignoring unparseable environment variable");
            None
        }
    }
}

/// `$XDG_CACHE_HOME/flutter-docs/cache.db` or the platform equivalent.
fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flutter-docs")
        .join("cache.db")
}
