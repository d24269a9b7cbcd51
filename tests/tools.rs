mod test_helpers;

use std::sync::Arc;

use serde_json::json;

use flutter_mcp::client::tools::ToolHandler;

use crate::test_helpers::*;

fn handler_with(transport: Arc<MockTransport>) -> ToolHandler {
    ToolHandler::new(client_with(transport))
}

#[tokio::test]
async fn docs_tool_returns_contract_fields() {
    maybe_start_logging();

    let transport = Arc::new(
        MockTransport::new().route("widgets/Container-class.html", 200, &class_page("Container", 2)),
    );
    let handler = handler_with(transport);

    let value = handler
        .handle("docs", json!({ "identifier": "Container" }))
        .await;

    assert_eq!(value["identifier"], "flutter_class:widgets.Container");
    assert_eq!(value["kind"], "flutter_class");
    assert_eq!(value["source"], "live");
    assert_eq!(
        value["source_url"],
        "https://api.flutter.dev/flutter/widgets/Container-class.html"
    );
    assert_eq!(value["truncated"], false);
    assert!(value["token_count"].is_u64());
    assert!(value["ttl_remaining_ms"].is_i64() || value["ttl_remaining_ms"].is_u64());
    assert!(value.get("original_tokens").is_none());
}

#[tokio::test]
async fn legacy_flutter_docs_maps_to_docs() {
    let transport = Arc::new(
        MockTransport::new().route("material/AppBar-class.html", 200, &class_page("AppBar", 2)),
    );
    let handler = handler_with(Arc::clone(&transport));

    let value = handler
        .handle(
            "get_flutter_docs",
            json!({ "class_name": "AppBar", "library": "material" }),
        )
        .await;

    assert_eq!(value["identifier"], "flutter_class:material.AppBar");
    assert_eq!(transport.requests_matching("material/AppBar-class.html"), 1);
}

#[tokio::test]
async fn legacy_pub_info_maps_to_docs() {
    let meta = package_meta("provider", &["6.0.0", "6.1.2"]);
    let transport = Arc::new(
        MockTransport::new()
            .route("/api/packages/provider", 200, &meta)
            .route("pub.dev/packages/provider", 200, &package_readme("provider")),
    );
    let handler = handler_with(transport);

    let value = handler
        .handle(
            "get_pub_package_info",
            json!({ "package_name": "provider", "version": "^6.0.0" }),
        )
        .await;

    assert_eq!(value["identifier"], "pub_package:provider@6.1.2");
    assert_eq!(value["kind"], "pub_package");
}

#[tokio::test]
async fn legacy_search_alias_works() {
    let transport = Arc::new(
        MockTransport::new()
            .route(
                "api.flutter.dev/flutter/index.json",
                200,
                &dartdoc_index(&[("Container", "widgets/Container-class.html")]),
            )
            .route("api.dart.dev/stable/index.json", 200, "[]")
            .route("pub.dev/api/search", 200, r#"{"packages":[]}"#),
    );
    let handler = handler_with(transport);

    let value = handler
        .handle("search_flutter_docs", json!({ "query": "container" }))
        .await;

    assert_eq!(value["query"], "container");
    assert_eq!(value["results"][0]["id"], "flutter_class:widgets.Container");
    assert_eq!(value["partial"], false);
}

#[tokio::test]
async fn mentions_collapse_duplicates_per_canonical_id() {
    let meta = package_meta("provider", &["6.0.0", "6.1.2"]);
    let transport = Arc::new(
        MockTransport::new()
            .route("widgets/Container-class.html", 200, &class_page("Container", 2))
            .route("/api/packages/provider", 200, &meta)
            .route("pub.dev/packages/provider", 200, &package_readme("provider")),
    );
    let handler = handler_with(Arc::clone(&transport));

    let text = "Compare @flutter_mcp Container with @flutter_mcp Container, \
                then check @flutter_mcp pub:provider:^6.0.0.";
    let value = handler
        .handle("process_flutter_mentions", json!({ "text": text }))
        .await;

    let mentions = value["mentions"].as_object().unwrap();
    assert_eq!(mentions.len(), 2);
    assert!(mentions.contains_key("flutter_class:widgets.Container"));
    assert!(mentions.contains_key("pub_package:provider@6.1.2"));

    // duplicate mentions did not trigger extra fetches
    assert_eq!(transport.requests_matching("Container-class.html"), 1);
}

#[tokio::test]
async fn errors_arrive_as_envelopes() {
    let transport = Arc::new(MockTransport::new());
    let handler = handler_with(transport);

    let value = handler
        .handle("docs", json!({ "identifier": "Container" }))
        .await;

    assert_eq!(value["error"], true);
    assert_eq!(value["error_type"], "NotFound");
    assert!(value["message"].as_str().unwrap().contains("Not found"));
    assert!(value.get("timestamp").is_some());
}
