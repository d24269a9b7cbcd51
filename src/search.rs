//! Unified search: parallel fan-out across sources, lexical ranking,
//! de-duplication.
//!
//! Four sources are queried concurrently — the Flutter API index, the
//! Dart API index, pub.dev search, and the local concept map — each under
//! its own timeout. A failed or slow source degrades the response to
//! `partial: true` instead of failing it, as long as at least one source
//! answered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::concepts::CONCEPTS;
use crate::resolve::{edit_distance_at_most, DocKind};
use crate::upstream::{FetchError, Fetcher};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 30;

const SOURCE_TIMEOUT: Duration = Duration::from_secs(3);

/// Source weights applied to the lexical score.
const WEIGHT_FLUTTER: f64 = 1.0;
const WEIGHT_PUB: f64 = 0.9;
const WEIGHT_DART: f64 = 0.8;
const WEIGHT_CONCEPTS: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Canonical id, usable directly as a `docs` identifier.
    pub id: String,
    pub kind: DocKind,
    pub title: String,
    pub description: String,
    /// Weighted lexical relevance in `[0, 1]`.
    pub relevance: f64,
    pub doc_size: DocSize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub partial: bool,
    pub failed_sources: Vec<String>,
    /// Matches found across all sources before the limit was applied.
    pub total_found: usize,
}

impl SearchOutcome {
    /// True when not a single source produced results.
    pub fn all_sources_failed(&self) -> bool {
        self.failed_sources.len() == 4
    }
}

#[derive(Debug)]
pub struct SearchOrchestrator {
    fetcher: Arc<Fetcher>,
}

impl SearchOrchestrator {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn search(&self, query: &str, limit: usize) -> SearchOutcome {
        let limit = limit.clamp(1, MAX_LIMIT);
        let query = query.trim().to_lowercase();

        let (flutter, dart, pub_dev) = tokio::join!(
            tokio::time::timeout(SOURCE_TIMEOUT, self.class_index(Index::Flutter, &query)),
            tokio::time::timeout(SOURCE_TIMEOUT, self.class_index(Index::Dart, &query)),
            tokio::time::timeout(SOURCE_TIMEOUT, self.pub_search(&query)),
        );
        let concepts: Result<Vec<SearchResult>, FetchError> = Ok(concept_hits(&query));

        let mut failed_sources = Vec::new();
        let mut hits = Vec::new();

        for (name, outcome) in [
            ("flutter", flatten(flutter)),
            ("dart", flatten(dart)),
            ("pub", flatten(pub_dev)),
            ("concepts", concepts),
        ] {
            match outcome {
                Ok(source_hits) => hits.extend(source_hits),
                Err(e) => {
                    warn!(source = name, e = %e, "search source failed");
                    failed_sources.push(name.to_owned());
                }
            }
        }

        let mut merged = dedup_by_id(hits);
        let total_found = merged.len();
        merged.truncate(limit);

        SearchOutcome {
            results: merged,
            partial: !failed_sources.is_empty(),
            failed_sources,
            total_found,
        }
    }

    async fn class_index(
        &self,
        index: Index,
        query: &str,
    ) -> Result<Vec<SearchResult>, FetchError> {
        let url = Url::parse(index.url()).map_err(|e| FetchError::Network {
            message: e.to_string(),
        })?;
        let response = self.fetcher.fetch(&url, "search").await?;

        let entries: Vec<serde_json::Value> =
            serde_json::from_slice(&response.body).map_err(|e| FetchError::Network {
                message: format!("malformed {} index: {e}", index.source_name()),
            })?;

        let mut hits = Vec::new();
        for entry in &entries {
            let Some(name) = entry.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(href) = entry.get("href").and_then(|v| v.as_str()) else {
                continue;
            };
            if !href.ends_with("-class.html") {
                continue;
            }
            let Some(library) = index.library_from_href(href) else {
                continue;
            };

            let score = lexical_score(query, name, &[]);
            if score == 0.0 {
                continue;
            }

            let description = entry
                .get("desc")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned();

            hits.push(SearchResult {
                id: format!("{}:{library}.{name}", index.kind().as_str()),
                kind: index.kind(),
                title: name.to_owned(),
                description,
                relevance: score * index.weight(),
                doc_size: DocSize::Large,
            });
        }

        Ok(hits)
    }

    async fn pub_search(&self, query: &str) -> Result<Vec<SearchResult>, FetchError> {
        let mut url = Url::parse("https://pub.dev/api/search").map_err(|e| FetchError::Network {
            message: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("q", query);

        let response = self.fetcher.fetch(&url, "search").await?;

        #[derive(Deserialize)]
        struct PubSearch {
            #[serde(default)]
            packages: Vec<PubHit>,
        }
        #[derive(Deserialize)]
        struct PubHit {
            package: String,
        }

        let parsed: PubSearch =
            serde_json::from_slice(&response.body).map_err(|e| FetchError::Network {
                message: format!("malformed pub.dev search response: {e}"),
            })?;

        Ok(parsed
            .packages
            .into_iter()
            .filter_map(|hit| {
                let score = lexical_score(query, &hit.package, &[]);
                (score > 0.0).then(|| SearchResult {
                    id: format!("pub_package:{}", hit.package),
                    kind: DocKind::PubPackage,
                    title: hit.package.clone(),
                    description: String::new(),
                    relevance: score * WEIGHT_PUB,
                    doc_size: DocSize::Medium,
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Index {
    Flutter,
    Dart,
}

impl Index {
    fn url(&self) -> &'static str {
        match self {
            Self::Flutter => "https://api.flutter.dev/flutter/index.json",
            Self::Dart => "https://api.dart.dev/stable/index.json",
        }
    }

    fn source_name(&self) -> &'static str {
        match self {
            Self::Flutter => "flutter",
            Self::Dart => "dart",
        }
    }

    fn kind(&self) -> DocKind {
        match self {
            Self::Flutter => DocKind::FlutterClass,
            Self::Dart => DocKind::DartClass,
        }
    }

    fn weight(&self) -> f64 {
        match self {
            Self::Flutter => WEIGHT_FLUTTER,
            Self::Dart => WEIGHT_DART,
        }
    }

    /// `widgets/Container-class.html -> widgets`,
    /// `dart-async/Future-class.html -> dart:async`.
    fn library_from_href(&self, href: &str) -> Option<String> {
        let dir = href.split('/').next()?;
        if dir.is_empty() {
            return None;
        }
        match self {
            Self::Flutter => Some(dir.to_owned()),
            Self::Dart => Some(dir.replacen('-', ":", 1)),
        }
    }
}

fn concept_hits(query: &str) -> Vec<SearchResult> {
    CONCEPTS
        .iter()
        .filter_map(|concept| {
            let score = lexical_score(query, concept.name, concept.keywords);
            (score > 0.0).then(|| SearchResult {
                id: format!("concept:{}", concept.name),
                kind: DocKind::Concept,
                title: concept.title.to_owned(),
                description: concept.description.to_owned(),
                relevance: score * WEIGHT_CONCEPTS,
                doc_size: DocSize::Small,
            })
        })
        .collect()
}

fn flatten<T>(
    outcome: Result<Result<T, FetchError>, tokio::time::error::Elapsed>,
) -> Result<T, FetchError> {
    match outcome {
        Ok(inner) => inner,
        Err(_) => Err(FetchError::Network {
            message: "source timed out".to_owned(),
        }),
    }
}

/// Lexical score of `name` against the lowercased `query`:
/// exact 1.0, prefix 0.7, substring 0.4, fuzzy (edit distance ≤ 2 on
/// identifier tokens) 0.3, otherwise no match.
fn lexical_score(query: &str, name: &str, extra_tokens: &[&str]) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let name_lc = name.to_lowercase();

    if name_lc == query {
        return 1.0;
    }
    if name_lc.starts_with(query) {
        return 0.7;
    }
    if name_lc.contains(query) {
        return 0.4;
    }

    let fuzzy = identifier_tokens(name)
        .chain(extra_tokens.iter().map(|t| t.to_string()))
        .any(|token| edit_distance_at_most(query, &token.to_lowercase(), 2).is_some());
    if fuzzy {
        return 0.3;
    }

    0.0
}

/// Splits an identifier into lowercase tokens on case boundaries and
/// separators: `ListView -> [listview, list, view]`.
fn identifier_tokens(name: &str) -> impl Iterator<Item = String> + '_ {
    let whole = name.to_lowercase();
    let mut parts = vec![whole];

    let mut current = String::new();
    for c in name.chars() {
        if c == '_' || c == '-' || c == '.' || c == ':' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current.push(c.to_ascii_lowercase());
        } else {
            current.push(c.to_ascii_lowercase());
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts.into_iter()
}

/// Keeps the best-scoring hit per canonical id, sorted by descending
/// relevance with a stable tie-break on the id.
fn dedup_by_id(hits: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut best: HashMap<String, SearchResult> = HashMap::new();
    for hit in hits {
        match best.get(&hit.id) {
            Some(existing) if existing.relevance >= hit.relevance => {}
            _ => {
                best.insert(hit.id.clone(), hit);
            }
        }
    }

    let mut merged: Vec<SearchResult> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}
