//! Top-level client: resolve, fetch, process, cache, and serve
//! documentation requests.
//!
//! Must be constructed using [`ClientBuilder`]. All shared state — the
//! cache handle, per-host throttles, per-upstream breakers, and the
//! in-flight map — lives in one [`Core`] threaded through every
//! operation; nothing is process-global, so independent clients (and
//! tests) never interfere.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod error;
pub mod tools;

use crate::backoff::BackoffConfig;
use crate::breaker::{BreakerConfig, BreakerState};
use crate::cache::{CacheStats, CacheStore};
use crate::concepts;
use crate::config::{Config, USER_AGENT};
use crate::document::parser::{self, PackageMetadata};
use crate::document::tokens::{TokenCounter, TokenMode};
use crate::document::truncate::truncate;
use crate::document::{
    select_topic, Document, Source, Topic, DEFAULT_MAX_TOKENS, MIN_MAX_TOKENS, SEARCH_TTL_MS,
    VERSIONS_TTL_MS,
};
use crate::resolve::version::{self, VersionSpec};
use crate::resolve::{self, DocKind, ResolvedIdentifier};
use crate::search::{SearchOrchestrator, SearchOutcome, DEFAULT_LIMIT, MAX_LIMIT};
use crate::singleflight::SingleFlight;
use crate::throttle::ThrottleConfig;
use crate::upstream::{Fetcher, HttpTransport, ReqwestTransport, Upstream};

use error::{Error, Result};

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn HttpTransport>>,
    token_mode: TokenMode,
    in_memory_cache: bool,
}

impl ClientBuilder {
    /// Create a new [`ClientBuilder`] with compiled-in defaults.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            transport: None,
            token_mode: TokenMode::default(),
            in_memory_cache: false,
        }
    }

    /// Like [`ClientBuilder::new`], but honoring the recognized
    /// environment variables.
    pub fn from_env() -> Self {
        Self {
            config: Config::from_env(),
            ..Self::new()
        }
    }

    /// Sets the cache database location.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = path.into();
        self
    }

    /// Keeps the cache purely in memory. Mostly useful in tests.
    pub fn in_memory_cache(mut self) -> Self {
        self.in_memory_cache = true;
        self
    }

    /// Set up backoff configuration.
    pub fn backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.config.backoff = backoff_config;
        self
    }

    /// Set up per-host rate limiting.
    pub fn throttle_config(mut self, throttle_config: ThrottleConfig) -> Self {
        self.config.throttle = throttle_config;
        self
    }

    /// Set up circuit breaking.
    pub fn breaker_config(mut self, breaker_config: BreakerConfig) -> Self {
        self.config.breaker = breaker_config;
        self
    }

    /// Deadline applied to each `docs`/`search` operation.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = deadline;
        self
    }

    /// Token counting mode for budgets and accounting.
    pub fn token_mode(mut self, token_mode: TokenMode) -> Self {
        self.token_mode = token_mode;
        self
    }

    /// Replaces the HTTP transport; tests inject scripted transports here.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build [`Client`].
    pub fn build(self) -> Result<Client> {
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(USER_AGENT).map_err(|e| Error::Network {
                message: e.to_string(),
            })?),
        };

        let cache = if self.in_memory_cache {
            match CacheStore::open_in_memory() {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(e = %e, "in-memory cache unavailable, caching disabled");
                    None
                }
            }
        } else {
            match CacheStore::open(&self.config.cache_path) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(
                        e = %e,
                        path = %self.config.cache_path.display(),
                        "cache store unavailable, falling back to memory",
                    );
                    CacheStore::open_in_memory().ok()
                }
            }
        };

        let fetcher = Arc::new(Fetcher::new(
            transport,
            self.config.throttle.clone(),
            self.config.breaker.clone(),
            self.config.backoff.clone(),
        ));

        Ok(Client {
            core: Arc::new(Core {
                cache,
                search: SearchOrchestrator::new(Arc::clone(&fetcher)),
                fetcher,
                counter: TokenCounter::new(self.token_mode),
                inflight: SingleFlight::new(),
                started: Instant::now(),
                deadline: self.config.deadline,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

/// One documentation request.
#[derive(Debug, Clone)]
pub struct DocRequest {
    pub identifier: String,
    pub topic: Option<Topic>,
    pub max_tokens: Option<usize>,
}

impl DocRequest {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            topic: None,
            max_tokens: None,
        }
    }

    pub fn topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A served document plus its budget accounting.
#[derive(Debug, Clone, Serialize)]
pub struct DocsResponse {
    /// Canonical id the request resolved to.
    pub identifier: String,
    pub kind: DocKind,
    pub source_url: String,
    pub source: Source,
    pub content: String,
    pub token_count: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_tokens: Option<usize>,
    pub ttl_remaining_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamHealth {
    Operational,
    Degraded,
    Down,
}

impl From<BreakerState> for UpstreamHealth {
    fn from(state: BreakerState) -> Self {
        match state {
            BreakerState::Closed => Self::Operational,
            BreakerState::HalfOpen => Self::Degraded,
            BreakerState::Open => Self::Down,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: Health,
    pub cache: CacheHealth,
    pub upstreams: UpstreamsHealth,
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub entries: u64,
    pub size_bytes: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamsHealth {
    pub flutter_docs: UpstreamHealth,
    pub dart_docs: UpstreamHealth,
    pub pub_dev: UpstreamHealth,
}

/// Documentation client.
///
/// Cheap to clone; all clones share one [`Core`].
#[derive(Debug, Clone)]
pub struct Client {
    core: Arc<Core>,
}

#[derive(Debug)]
struct Core {
    cache: Option<CacheStore>,
    fetcher: Arc<Fetcher>,
    search: SearchOrchestrator,
    counter: TokenCounter,
    inflight: SingleFlight<Document, Error>,
    started: Instant,
    deadline: Duration,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Client {
    /// Resolves `request.identifier`, serves from cache when fresh, and
    /// otherwise fetches, parses, and caches the canonical document. The
    /// returned content is topic-filtered and fitted to the token budget.
    pub async fn docs(&self, request: DocRequest) -> Result<DocsResponse> {
        tokio::time::timeout(self.core.deadline, self.docs_inner(request))
            .await
            .map_err(|_| Error::Network {
                message: "operation deadline exceeded".to_owned(),
            })?
    }

    async fn docs_inner(&self, request: DocRequest) -> Result<DocsResponse> {
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens < MIN_MAX_TOKENS {
            return Err(Error::invalid_input(format!(
                "max_tokens must be at least {MIN_MAX_TOKENS}, got {max_tokens}"
            )));
        }

        // Canonical ids (as returned by search) resolve directly; anything
        // else goes through classification.
        let resolved = ResolvedIdentifier::from_canonical(request.identifier.trim())
            .or_else(|_| resolve::resolve(&request.identifier))?;

        let resolved = self.pin_version(resolved).await?;
        let canonical_id = resolved.canonical_id();

        if let Some(document) = self.core.cache_get(&canonical_id, now_ms()) {
            debug!(canonical_id, "cache hit");
            return Ok(self.respond(document, resolved.kind, &request, max_tokens));
        }

        let core = Arc::clone(&self.core);
        let produced = {
            let work_resolved = resolved.clone();
            let work_id = canonical_id.clone();
            self.core
                .inflight
                .run(&canonical_id, move || {
                    Core::produce_document(core, work_resolved, work_id).boxed()
                })
                .await
                .map_err(Error::from)?
        };

        Ok(self.respond(produced, resolved.kind, &request, max_tokens))
    }

    /// For packages with (or without) a version constraint: resolve it
    /// against the published versions and pin the canonical id to the
    /// winner.
    async fn pin_version(&self, resolved: ResolvedIdentifier) -> Result<ResolvedIdentifier> {
        if resolved.kind != DocKind::PubPackage {
            return Ok(resolved);
        }
        // Already pinned (e.g. a canonical id from a previous response).
        if let Some(VersionSpec::Exact(_)) = resolved.version_spec {
            return Ok(resolved);
        }

        let metadata = self.core.package_metadata(&resolved.name).await?;
        let published = metadata.parsed_versions();
        let version = version::resolve(resolved.version_spec.as_ref(), &published)
            .map_err(|e| Error::version_not_satisfiable(&resolved.name, e))?;

        Ok(ResolvedIdentifier {
            version_spec: Some(VersionSpec::Exact(version)),
            ..resolved
        })
    }

    fn respond(
        &self,
        document: Document,
        kind: DocKind,
        request: &DocRequest,
        max_tokens: usize,
    ) -> DocsResponse {
        let content = match request.topic {
            Some(topic) => select_topic(&document.content, topic),
            None => document.content.clone(),
        };
        let outcome = truncate(&content, max_tokens, &self.core.counter);

        DocsResponse {
            identifier: document.canonical_id.clone(),
            kind,
            source_url: document.source_url.clone(),
            source: document.source,
            token_count: outcome.token_count,
            truncated: outcome.truncated,
            original_tokens: outcome.truncated.then_some(outcome.original_tokens),
            ttl_remaining_ms: document.ttl_remaining_ms(now_ms()),
            content: outcome.content,
        }
    }

    /// Parallel multi-source search with ranking and de-duplication.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<SearchOutcome> {
        tokio::time::timeout(self.core.deadline, self.search_inner(query, limit))
            .await
            .map_err(|_| Error::Network {
                message: "operation deadline exceeded".to_owned(),
            })?
    }

    async fn search_inner(&self, query: &str, limit: Option<usize>) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let cache_key = format!("search:{}", query.to_lowercase());
        if let Some(document) = self.core.cache_get(&cache_key, now_ms()) {
            if let Ok(mut outcome) = serde_json::from_str::<SearchOutcome>(&document.content) {
                outcome.results.truncate(limit);
                return Ok(outcome);
            }
        }

        let outcome = self.core.search.search(query, MAX_LIMIT).await;
        if outcome.all_sources_failed() {
            return Err(Error::Network {
                message: "all search sources failed".to_owned(),
            });
        }

        // partial outcomes are not cached; a failed source should get
        // another chance on the next call
        if !outcome.partial {
            if let Ok(content) = serde_json::to_string(&outcome) {
                let token_count = self.core.counter.count(&content);
                self.core.cache_put(&Document {
                    canonical_id: cache_key,
                    content,
                    token_count,
                    source: Source::Live,
                    source_url: format!("search:{query}"),
                    fetched_at_ms: now_ms(),
                    ttl_ms: SEARCH_TTL_MS,
                });
            }
        }

        let mut limited = outcome;
        limited.results.truncate(limit);
        Ok(limited)
    }

    /// Health snapshot: cache stats, per-upstream breaker state, uptime.
    pub fn status(&self) -> StatusReport {
        let stats = self.core.cache_stats();
        let health = |u: Upstream| UpstreamHealth::from(self.core.fetcher.breaker_state(u));

        let upstreams = UpstreamsHealth {
            flutter_docs: health(Upstream::FlutterDocs),
            dart_docs: health(Upstream::DartDocs),
            pub_dev: health(Upstream::PubDev),
        };

        let states = [
            upstreams.flutter_docs,
            upstreams.dart_docs,
            upstreams.pub_dev,
        ];
        let status = if states.iter().all(|s| *s == UpstreamHealth::Down) {
            Health::Unhealthy
        } else if states.iter().any(|s| *s != UpstreamHealth::Operational) {
            Health::Degraded
        } else {
            Health::Healthy
        };

        StatusReport {
            status,
            cache: CacheHealth {
                entries: stats.entries,
                size_bytes: stats.total_bytes,
                hit_rate: stats.hit_rate,
            },
            upstreams,
            uptime_ms: self.core.started.elapsed().as_millis() as u64,
        }
    }

    /// Drops every cached entry matching the predicate.
    pub fn purge_cache<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let Some(store) = self.core.cache.as_ref() else {
            return 0;
        };
        match store.purge(predicate) {
            Ok(n) => n,
            Err(e) => {
                warn!(e = %e, "cache purge failed");
                0
            }
        }
    }
}

impl Core {
    /// The cache-miss path: fetch, parse, count, write. Runs under
    /// single-flight, so at most one instance per canonical id.
    async fn produce_document(
        self: Arc<Self>,
        resolved: ResolvedIdentifier,
        canonical_id: String,
    ) -> Result<Document> {
        match resolved.kind {
            DocKind::FlutterClass | DocKind::DartClass => {
                let url = resolved
                    .source_url()
                    .ok_or_else(|| Error::invalid_input("identifier has no upstream URL"))?;
                let response = self.fetcher.fetch(&url, &canonical_id).await.map_err(|e| {
                    Error::from_fetch(e, &canonical_id, resolve::widget_suggestions(&resolved.name))
                })?;

                let content = parser::parse_class_html(&response.body_text(), &resolved.name, &url);
                Ok(self.finish_document(
                    canonical_id,
                    content,
                    url.to_string(),
                    resolved.kind.ttl_ms(),
                ))
            }

            DocKind::PubPackage => {
                let metadata = self.package_metadata(&resolved.name).await?;
                let published = metadata.parsed_versions();
                let version = version::resolve(resolved.version_spec.as_ref(), &published)
                    .map_err(|e| Error::version_not_satisfiable(&resolved.name, e))?;

                let page_url = resolved
                    .package_page_url()
                    .ok_or_else(|| Error::invalid_input("identifier has no package page"))?;

                // A missing or failing README degrades to a metadata-only
                // document rather than failing the request.
                let readme = match self.fetcher.fetch(&page_url, &canonical_id).await {
                    Ok(response) => Some(response.body_text()),
                    Err(e) => {
                        warn!(package = resolved.name, e = %e, "README unavailable, degrading");
                        None
                    }
                };

                let content =
                    parser::assemble_package_doc(&metadata, &version, readme.as_deref(), &page_url);
                let source_url = resolved
                    .source_url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| page_url.to_string());

                Ok(self.finish_document(canonical_id, content, source_url, resolved.kind.ttl_ms()))
            }

            DocKind::Concept => {
                let concept = concepts::by_name(&resolved.name).ok_or_else(|| Error::NotFound {
                    identifier: canonical_id.clone(),
                    url: String::new(),
                    suggestions: concepts::CONCEPTS.iter().map(|c| c.name.to_owned()).collect(),
                })?;
                Ok(self.finish_document(
                    canonical_id,
                    concept.body.to_owned(),
                    format!("local:concepts/{}", concept.name),
                    resolved.kind.ttl_ms(),
                ))
            }
        }
    }

    /// Published-versions lookup, cached for an hour and de-duplicated
    /// under its own fingerprint.
    async fn package_metadata(self: &Arc<Self>, name: &str) -> Result<PackageMetadata> {
        let key = format!("pub_versions:{name}");
        if let Some(document) = self.cache_get(&key, now_ms()) {
            if let Ok(metadata) = serde_json::from_str(&document.content) {
                return Ok(metadata);
            }
        }

        let url = url::Url::parse(&format!("https://pub.dev/api/packages/{name}"))
            .map_err(|e| Error::invalid_input(format!("invalid package name '{name}': {e}")))?;

        let core = Arc::clone(self);
        let document = {
            let key_owned = key.clone();
            let name = name.to_owned();
            self.inflight
                .run(&key, move || {
                    async move {
                        let response = core
                            .fetcher
                            .fetch(&url, &key_owned)
                            .await
                            .map_err(|e| Error::from_fetch(e, &name, Vec::new()))?;
                        let content = response.body_text();

                        // reject malformed payloads before they reach the cache
                        serde_json::from_str::<PackageMetadata>(&content).map_err(|e| {
                            Error::Network {
                                message: format!("malformed pub.dev metadata: {e}"),
                            }
                        })?;

                        Ok(core.finish_document(key_owned, content, url.to_string(), VERSIONS_TTL_MS))
                    }
                    .boxed()
                })
                .await
                .map_err(Error::from)?
        };

        serde_json::from_str(&document.content).map_err(|e| Error::Network {
            message: format!("malformed pub.dev metadata: {e}"),
        })
    }

    fn finish_document(
        &self,
        canonical_id: String,
        content: String,
        source_url: String,
        ttl_ms: i64,
    ) -> Document {
        let token_count = self.counter.count(&content);
        let document = Document {
            canonical_id,
            content,
            token_count,
            source: Source::Live,
            source_url,
            fetched_at_ms: now_ms(),
            ttl_ms,
        };
        self.cache_put(&document);
        document
    }

    /// Cache read that degrades on store failure instead of propagating.
    fn cache_get(&self, key: &str, now_ms: i64) -> Option<Document> {
        let store = self.cache.as_ref()?;
        match store.get(key, now_ms) {
            Ok(document) => document,
            Err(e) => {
                warn!(key, e = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Cache write that degrades on store failure.
    fn cache_put(&self, document: &Document) {
        if let Some(store) = self.cache.as_ref() {
            if let Err(e) = store.put(document) {
                warn!(key = document.canonical_id, e = %e, "cache write failed, continuing");
            }
        }
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache
            .as_ref()
            .and_then(|store| store.stats().ok())
            .unwrap_or(CacheStats {
                entries: 0,
                total_bytes: 0,
                hit_rate: 0.0,
            })
    }
}
