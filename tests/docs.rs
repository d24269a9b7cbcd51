mod test_helpers;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use flutter_mcp::client::error::Error;
use flutter_mcp::client::DocRequest;
use flutter_mcp::document::tokens::TokenCounter;
use flutter_mcp::document::{Source, Topic};
use flutter_mcp::resolve::DocKind;

use crate::test_helpers::*;

#[tokio::test]
async fn flutter_class_happy_path_then_cache() {
    maybe_start_logging();

    let transport = Arc::new(
        MockTransport::new().route("widgets/Container-class.html", 200, &class_page("Container", 3)),
    );
    let client = client_with(Arc::clone(&transport));

    let first = client.docs(DocRequest::new("Container")).await.unwrap();
    assert_eq!(
        first.source_url,
        "https://api.flutter.dev/flutter/widgets/Container-class.html"
    );
    assert_eq!(first.kind, DocKind::FlutterClass);
    assert_eq!(first.source, Source::Live);
    assert!(first.content.starts_with("# Container"));
    assert!(first.content.contains("## Constructors"));
    assert!(first.content.contains("## Properties"));
    assert!(first.ttl_remaining_ms > 0);

    let second = client.docs(DocRequest::new("Container")).await.unwrap();
    assert_eq!(second.source, Source::Cache);
    assert_eq!(second.content, first.content);

    assert_eq!(transport.requests_matching("Container-class.html"), 1);
}

#[tokio::test]
async fn token_count_matches_returned_content() {
    let transport = Arc::new(
        MockTransport::new().route("widgets/Container-class.html", 200, &class_page("Container", 3)),
    );
    let client = client_with(transport);

    let response = client.docs(DocRequest::new("Container")).await.unwrap();
    let counter = TokenCounter::default();
    assert_eq!(counter.count(&response.content), response.token_count);
}

#[tokio::test]
async fn topic_filter_selects_one_section() {
    let transport = Arc::new(
        MockTransport::new().route("widgets/Container-class.html", 200, &class_page("Container", 3)),
    );
    let client = client_with(transport);

    let response = client
        .docs(DocRequest::new("Container").topic(Topic::Constructors))
        .await
        .unwrap();

    assert!(response.content.starts_with("# Container"));
    assert!(response.content.contains("## Constructors"));
    assert!(!response.content.contains("## Properties"));
    assert!(!response.content.contains("## Description"));
}

#[tokio::test]
async fn caret_constraint_resolves_to_highest_match() {
    maybe_start_logging();

    let meta = package_meta("provider", &["5.0.0", "6.0.0", "6.0.5", "6.1.2", "7.0.0-beta"]);
    let transport = Arc::new(
        MockTransport::new()
            .route("/api/packages/provider", 200, &meta)
            .route("pub.dev/packages/provider", 200, &package_readme("provider")),
    );
    let client = client_with(transport);

    let response = client
        .docs(DocRequest::new("pub:provider:^6.0.0"))
        .await
        .unwrap();

    assert_eq!(response.identifier, "pub_package:provider@6.1.2");
    assert_eq!(response.kind, DocKind::PubPackage);
    assert!(response.content.starts_with("# provider 6.1.2"));
    assert!(response.content.contains("## Installation"));
    assert!(response.content.contains("## Getting Started"));
}

#[tokio::test]
async fn unsatisfiable_range_lists_closest_versions() {
    let meta = package_meta(
        "dio",
        &[
            "1.0.0", "2.0.0", "3.0.0", "4.0.0", "4.0.1", "4.0.2", "4.0.3", "4.0.4", "4.0.5",
            "4.0.6", "5.0.0", "5.4.0",
        ],
    );
    let transport = Arc::new(MockTransport::new().route("/api/packages/dio", 200, &meta));
    let client = client_with(transport);

    let err = client
        .docs(DocRequest::new("pub:dio:>=99.0.0"))
        .await
        .unwrap_err();

    assert_matches!(err, Error::VersionNotSatisfiable { .. });
    let suggestions = err.suggestions();
    assert!(suggestions.len() <= 10);
    assert_eq!(suggestions[0], "5.4.0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_requests_share_one_fetch() {
    maybe_start_logging();

    let transport = Arc::new(
        MockTransport::new().route("material/Scaffold-class.html", 200, &class_page("Scaffold", 5)),
    );
    let client = client_with(Arc::clone(&transport));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.docs(DocRequest::new("Scaffold")).await.unwrap()
        }));
    }

    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await.unwrap());
    }

    assert_eq!(transport.requests_matching("Scaffold-class.html"), 1);
    let (content, tokens) = (&responses[0].content, responses[0].token_count);
    for response in &responses {
        assert_eq!(&response.content, content);
        assert_eq!(response.token_count, tokens);
    }
}

#[tokio::test]
async fn truncation_honors_budget_and_keeps_structure() {
    let transport = Arc::new(
        MockTransport::new().route("widgets/ListView-class.html", 200, &class_page("ListView", 80)),
    );
    let client = client_with(transport);

    let full = client.docs(DocRequest::new("ListView")).await.unwrap();
    assert!(full.token_count > 2_000, "fixture too small: {}", full.token_count);

    let trimmed = client
        .docs(DocRequest::new("ListView").max_tokens(800))
        .await
        .unwrap();

    assert!(trimmed.truncated);
    assert!(trimmed.token_count <= 800, "{} > 800", trimmed.token_count);
    assert_eq!(trimmed.original_tokens, Some(full.token_count));
    assert!(trimmed.content.starts_with("# ListView"));
    assert!(trimmed.content.contains("## Description"));
    assert!(trimmed.content.contains("build(BuildContext context)"));
    assert!(trimmed.content.contains("_Truncated"));

    // code fences stay balanced after cutting
    assert_eq!(trimmed.content.matches("```").count() % 2, 0);
}

#[tokio::test(start_paused = true)]
async fn circuit_opens_after_five_failures_and_recovers() {
    maybe_start_logging();

    let page = class_page("Container", 2);
    let transport = Arc::new(MockTransport::new().route_script(
        "widgets/Container-class.html",
        &[
            (502, ""),
            (502, ""),
            (502, ""),
            (502, ""),
            (502, ""),
            (200, &page),
        ],
    ));
    let client = client_with(Arc::clone(&transport));

    // call 1: four attempts, all 502
    let err = client.docs(DocRequest::new("Container")).await.unwrap_err();
    assert_matches!(err, Error::UpstreamServerError { .. });
    assert_eq!(transport.requests_matching("Container-class.html"), 4);

    // call 2: fifth qualifying failure opens the circuit
    let err = client.docs(DocRequest::new("Container")).await.unwrap_err();
    assert_matches!(err, Error::UpstreamServerError { .. });
    assert_eq!(transport.requests_matching("Container-class.html"), 5);

    // call 3: short-circuited, no HTTP issued
    let err = client.docs(DocRequest::new("Container")).await.unwrap_err();
    assert_matches!(err, Error::UpstreamServerError { .. });
    assert_eq!(transport.requests_matching("Container-class.html"), 5);

    // after the recovery timeout a single probe goes through and closes
    // the circuit
    tokio::time::advance(Duration::from_secs(60)).await;
    let response = client.docs(DocRequest::new("Container")).await.unwrap();
    assert_eq!(response.source, Source::Live);
    assert_eq!(transport.requests_matching("Container-class.html"), 6);
}

#[tokio::test]
async fn package_without_readme_degrades_to_metadata_only() {
    let meta = package_meta("internal_tool", &["1.0.0"]);
    // no route for the package page: the README fetch sees a 404
    let transport = Arc::new(MockTransport::new().route("/api/packages/internal_tool", 200, &meta));
    let client = client_with(transport);

    let response = client.docs(DocRequest::new("pub:internal_tool")).await.unwrap();

    assert_eq!(response.kind, DocKind::PubPackage);
    assert!(response.content.starts_with("# internal_tool 1.0.0"));
    assert!(response.content.contains("## Installation"));
    assert!(response.content.contains("## Changelog"));
    assert!(!response.content.contains("## Getting Started"));
}

#[tokio::test]
async fn not_found_carries_suggestions() {
    // resolver classifies it as a widget, upstream 404s
    let transport = Arc::new(MockTransport::new());
    let client = client_with(transport);

    let err = client.docs(DocRequest::new("ListView")).await.unwrap_err();
    assert_matches!(err, Error::NotFound { .. });
    assert!(err.suggestions().contains(&"ListView".to_owned()));
}

#[tokio::test]
async fn canonical_ids_are_accepted_as_identifiers() {
    let transport = Arc::new(
        MockTransport::new().route("widgets/Container-class.html", 200, &class_page("Container", 2)),
    );
    let client = client_with(Arc::clone(&transport));

    let response = client
        .docs(DocRequest::new("flutter_class:widgets.Container"))
        .await
        .unwrap();
    assert_eq!(response.identifier, "flutter_class:widgets.Container");

    // both spellings share one cache row
    let again = client.docs(DocRequest::new("Container")).await.unwrap();
    assert_eq!(again.source, Source::Cache);
    assert_eq!(transport.requests_matching("Container-class.html"), 1);
}

#[tokio::test]
async fn versions_list_is_cached_across_version_specs() {
    let meta = package_meta("provider", &["6.0.0", "6.1.2"]);
    let transport = Arc::new(
        MockTransport::new()
            .route("/api/packages/provider", 200, &meta)
            .route("pub.dev/packages/provider", 200, &package_readme("provider")),
    );
    let client = client_with(Arc::clone(&transport));

    client.docs(DocRequest::new("pub:provider:^6.0.0")).await.unwrap();
    client.docs(DocRequest::new("pub:provider:latest")).await.unwrap();

    // one metadata fetch serves both constraint resolutions
    assert_eq!(transport.requests_matching("/api/packages/provider"), 1);
}
