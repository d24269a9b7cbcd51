//! The canonical document model.
//!
//! Every upstream response is normalized into a section-structured
//! Markdown document with a fixed section order; topic filtering and
//! token-budgeted truncation operate on that canonical form.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

pub mod parser;
pub mod tokens;
pub mod truncate;

/// Default output token budget.
pub const DEFAULT_MAX_TOKENS: usize = 10_000;

/// Smallest accepted output token budget.
pub const MIN_MAX_TOKENS: usize = 500;

/// TTL for cached search result entries.
pub const SEARCH_TTL_MS: i64 = 3_600_000;

/// TTL for cached published-versions lists.
pub const VERSIONS_TTL_MS: i64 = 3_600_000;

/// A canonical document as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub canonical_id: String,
    /// Section-labelled Markdown.
    pub content: String,
    /// Token count of `content`, computed once at write.
    pub token_count: usize,
    pub source: Source,
    pub source_url: String,
    pub fetched_at_ms: i64,
    pub ttl_ms: i64,
}

impl Document {
    /// Milliseconds until this document expires, clamped at zero.
    pub fn ttl_remaining_ms(&self, now_ms: i64) -> i64 {
        (self.fetched_at_ms + self.ttl_ms - now_ms).max(0)
    }
}

/// Where a returned document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Live,
    Cache,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cache => "cache",
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of section selectors accepted by the `docs` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Summary,
    Constructors,
    Properties,
    Methods,
    Examples,
    GettingStarted,
    Changelog,
    Api,
    Installation,
}

impl Topic {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(Self::Summary),
            "constructors" => Some(Self::Constructors),
            "properties" => Some(Self::Properties),
            "methods" => Some(Self::Methods),
            "examples" => Some(Self::Examples),
            "getting-started" => Some(Self::GettingStarted),
            "changelog" => Some(Self::Changelog),
            "api" => Some(Self::Api),
            "installation" => Some(Self::Installation),
            _ => None,
        }
    }

    /// The `## ` heading this topic selects.
    pub fn heading(&self) -> &'static str {
        match self {
            Self::Summary => "Description",
            Self::Constructors => "Constructors",
            Self::Properties => "Properties",
            Self::Methods => "Methods",
            Self::Examples => "Examples",
            Self::GettingStarted => "Getting Started",
            Self::Changelog => "Changelog",
            Self::Api => "API",
            Self::Installation => "Installation",
        }
    }
}

/// Truncation priority of a document block. Lower priorities are dropped
/// first; `Critical` content is never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

/// Selects one section of a canonical document, keeping the title line.
/// An empty match returns the title plus a one-line note.
pub fn select_topic(content: &str, topic: Topic) -> String {
    let mut out = String::new();

    for line in content.lines() {
        if line.starts_with("# ") {
            out.push_str(line);
            out.push('\n');
            break;
        }
    }

    let wanted = format!("## {}", topic.heading());
    let mut keeping = false;
    let mut matched = false;

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            keeping = heading.trim() == topic.heading();
            if keeping {
                matched = true;
                out.push('\n');
            }
            if !keeping {
                continue;
            }
        }
        if keeping {
            out.push_str(line);
            out.push('\n');
        }
    }

    if !matched {
        out.push_str(&format!("\n_No {} section available._\n", wanted.trim_start_matches("## ")));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Container\n\n## Description\nA convenience widget.\n\n## Constructors\n### Container\nCreates it.\n\n## Properties\n### alignment\nAligns the child.\n";

    #[test]
    fn topic_filter_keeps_title_and_section() {
        let out = select_topic(DOC, Topic::Constructors);
        assert!(out.starts_with("# Container\n"));
        assert!(out.contains("## Constructors"));
        assert!(out.contains("### Container"));
        assert!(!out.contains("## Description"));
        assert!(!out.contains("## Properties"));
    }

    #[test]
    fn missing_topic_yields_note() {
        let out = select_topic(DOC, Topic::Changelog);
        assert!(out.starts_with("# Container\n"));
        assert!(out.contains("_No Changelog section available._"));
    }

    #[test]
    fn topic_names_parse() {
        assert_eq!(Topic::parse("getting-started"), Some(Topic::GettingStarted));
        assert_eq!(Topic::parse("summary"), Some(Topic::Summary));
        assert_eq!(Topic::parse("bogus"), None);
    }

    #[test]
    fn ttl_remaining_clamps() {
        let doc = Document {
            canonical_id: "k".into(),
            content: String::new(),
            token_count: 0,
            source: Source::Live,
            source_url: String::new(),
            fetched_at_ms: 1_000,
            ttl_ms: 500,
        };
        assert_eq!(doc.ttl_remaining_ms(1_200), 300);
        assert_eq!(doc.ttl_remaining_ms(9_000), 0);
    }
}
