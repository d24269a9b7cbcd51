//! MCP tool surface: `docs`, `search`, `status`, and the legacy aliases.
//!
//! The transport (stdio/HTTP/SSE framing) lives outside this crate; this
//! module is the contract layer mapping tool names + JSON arguments to
//! client calls and rendering results or typed error envelopes. Unknown
//! tools and unknown argument fields are rejected as `InvalidInput`.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::error::Error;
use crate::client::{Client, DocRequest};
use crate::document::Topic;
use crate::search::SearchOutcome;

/// Mention syntax recognized by `process_flutter_mentions`:
/// `@flutter_mcp identifier[:version]`.
const MENTION_PATTERN: &str = r"@flutter_mcp\s+([A-Za-z0-9_:.^<>=~@-]+)";

#[derive(Debug, Clone)]
pub struct ToolHandler {
    client: Client,
    mention: Regex,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocsArgs {
    identifier: String,
    topic: Option<String>,
    max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FlutterDocsArgs {
    class_name: String,
    library: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PubPackageArgs {
    package_name: String,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MentionArgs {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyArgs {}

impl ToolHandler {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            // the pattern is a compile-time constant
            mention: Regex::new(MENTION_PATTERN).expect("static regex"),
        }
    }

    /// Tool names this handler accepts, current and legacy.
    pub fn tool_names() -> &'static [&'static str] {
        &[
            "docs",
            "search",
            "status",
            "get_flutter_docs",
            "get_pub_package_info",
            "search_flutter_docs",
            "process_flutter_mentions",
            "health_check",
        ]
    }

    /// Dispatches one tool call. Always returns a JSON value: either the
    /// tool's result object or an error envelope.
    pub async fn handle(&self, tool: &str, arguments: Value) -> Value {
        match tool {
            "docs" => self.docs(arguments).await,
            "search" | "search_flutter_docs" => self.search(arguments).await,
            "status" | "health_check" => self.status(arguments),
            "get_flutter_docs" => self.legacy_flutter_docs(arguments).await,
            "get_pub_package_info" => self.legacy_pub_info(arguments).await,
            "process_flutter_mentions" => self.process_mentions(arguments).await,
            unknown => Error::invalid_input(format!("unknown tool '{unknown}'")).envelope(),
        }
    }

    async fn docs(&self, arguments: Value) -> Value {
        let args: DocsArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(envelope) => return envelope,
        };

        let topic = match args.topic.as_deref().map(parse_topic).transpose() {
            Ok(topic) => topic,
            Err(envelope) => return envelope,
        };

        let mut request = DocRequest::new(args.identifier);
        if let Some(topic) = topic {
            request.topic = Some(topic);
        }
        if let Some(max_tokens) = args.max_tokens {
            request.max_tokens = Some(max_tokens as usize);
        }

        self.run_docs(request).await
    }

    async fn run_docs(&self, request: DocRequest) -> Value {
        match self.client.docs(request).await {
            Ok(response) => serde_json::to_value(&response)
                .unwrap_or_else(|e| Error::invalid_input(e.to_string()).envelope()),
            Err(e) => e.envelope(),
        }
    }

    async fn search(&self, arguments: Value) -> Value {
        let args: SearchArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(envelope) => return envelope,
        };

        match self
            .client
            .search(&args.query, args.limit.map(|l| l as usize))
            .await
        {
            Ok(outcome) => search_value(&args.query, outcome),
            Err(e) => e.envelope(),
        }
    }

    fn status(&self, arguments: Value) -> Value {
        if !arguments.is_null() {
            if let Err(envelope) = parse_args::<EmptyArgs>(arguments) {
                return envelope;
            }
        }
        serde_json::to_value(self.client.status())
            .unwrap_or_else(|e| Error::invalid_input(e.to_string()).envelope())
    }

    /// `get_flutter_docs(class_name, library)` → `docs("{library}.{class_name}")`.
    async fn legacy_flutter_docs(&self, arguments: Value) -> Value {
        let args: FlutterDocsArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(envelope) => return envelope,
        };

        let identifier = match args.library {
            Some(library) => format!("{library}.{}", args.class_name),
            None => args.class_name,
        };
        self.run_docs(DocRequest::new(identifier)).await
    }

    /// `get_pub_package_info(package_name, version?)` → `docs("pub:{name}[:{version}]")`.
    async fn legacy_pub_info(&self, arguments: Value) -> Value {
        let args: PubPackageArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(envelope) => return envelope,
        };

        let identifier = match args.version {
            Some(version) => format!("pub:{}:{version}", args.package_name),
            None => format!("pub:{}", args.package_name),
        };
        self.run_docs(DocRequest::new(identifier)).await
    }

    /// Extracts `@flutter_mcp {id}[:version]` mentions and fetches docs for
    /// each. The result maps canonical ids to docs payloads (or error
    /// envelopes); duplicate mentions collapse into one entry.
    async fn process_mentions(&self, arguments: Value) -> Value {
        let args: MentionArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(envelope) => return envelope,
        };

        let mut mentions: Vec<String> = Vec::new();
        for capture in self.mention.captures_iter(&args.text) {
            let raw = capture[1].trim_end_matches(['.', ',', ';', '!', '?']);
            if !raw.is_empty() && !mentions.iter().any(|m| m == raw) {
                mentions.push(raw.to_owned());
            }
        }

        let mut results: BTreeMap<String, Value> = BTreeMap::new();
        for mention in mentions {
            let value = self.run_docs(DocRequest::new(mention.clone())).await;
            let key = value
                .get("identifier")
                .and_then(|v| v.as_str())
                .unwrap_or(mention.as_str())
                .to_owned();
            results.entry(key).or_insert(value);
        }

        json!({ "mentions": results })
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, Value> {
    serde_json::from_value(arguments)
        .map_err(|e| Error::invalid_input(format!("invalid arguments: {e}")).envelope())
}

fn parse_topic(raw: &str) -> Result<Topic, Value> {
    Topic::parse(raw).ok_or_else(|| {
        Error::InvalidInput {
            message: format!("unknown topic '{raw}'"),
            suggestions: vec![
                "summary".into(),
                "constructors".into(),
                "properties".into(),
                "methods".into(),
                "examples".into(),
                "getting-started".into(),
                "changelog".into(),
                "api".into(),
                "installation".into(),
            ],
        }
        .envelope()
    })
}

fn search_value(query: &str, outcome: SearchOutcome) -> Value {
    let mut value = json!({
        "query": query,
        "results": outcome.results,
        "partial": outcome.partial,
        "total_found": outcome.total_found,
    });
    if !outcome.failed_sources.is_empty() {
        value
            .as_object_mut()
            .expect("search value is an object")
            .insert("failed_sources".into(), json!(outcome.failed_sources));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;

    fn handler() -> ToolHandler {
        ToolHandler::new(ClientBuilder::new().in_memory_cache().build().unwrap())
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_input() {
        let value = handler().handle("bogus_tool", Value::Null).await;
        assert_eq!(value["error"], true);
        assert_eq!(value["error_type"], "InvalidInput");
    }

    #[tokio::test]
    async fn unknown_argument_fields_are_rejected() {
        let value = handler()
            .handle("docs", json!({ "identifier": "Container", "shiny": true }))
            .await;
        assert_eq!(value["error_type"], "InvalidInput");
    }

    #[tokio::test]
    async fn unknown_topic_is_rejected_with_suggestions() {
        let value = handler()
            .handle("docs", json!({ "identifier": "Container", "topic": "everything" }))
            .await;
        assert_eq!(value["error_type"], "InvalidInput");
        assert!(value["suggestions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s.as_str() == Some("summary")));
    }

    #[tokio::test]
    async fn health_check_aliases_status() {
        let value = handler().handle("health_check", Value::Null).await;
        assert_eq!(value["status"], "healthy");
        assert!(value["upstreams"]["flutter_docs"].is_string());
        assert!(value["uptime_ms"].is_u64());
    }

    #[tokio::test]
    async fn concept_docs_round_trip_through_the_facade() {
        let value = handler()
            .handle("docs", json!({ "identifier": "concept:navigation" }))
            .await;
        assert_eq!(value["identifier"], "concept:navigation");
        assert_eq!(value["kind"], "concept");
        assert_eq!(value["source"], "live");
        assert!(value["content"].as_str().unwrap().contains("Navigator"));
    }

    #[test]
    fn mention_pattern_extracts_ids() {
        let re = Regex::new(MENTION_PATTERN).unwrap();
        let text = "Check @flutter_mcp Container. and @flutter_mcp pub:provider:^6.0.0, thanks.";
        let ids: Vec<&str> = re
            .captures_iter(text)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        assert_eq!(ids, vec!["Container.", "pub:provider:^6.0.0"]);
        // trailing punctuation is stripped during processing
        assert_eq!(ids[0].trim_end_matches([',', '.']), "Container");
    }
}
