#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

use flutter_mcp::client::{Client, ClientBuilder};
use flutter_mcp::upstream::transport::{self, HttpResponse, HttpTransport};

pub fn maybe_start_logging() {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Sentinel status that makes the mock fail with a connection error
/// instead of producing a response.
pub const CONNECT_ERROR: u16 = 0;

#[derive(Debug)]
struct Route {
    pattern: String,
    /// Responses served in order; the last one is sticky.
    responses: Vec<(u16, String)>,
    served: usize,
}

/// Scripted [`HttpTransport`]: the first route whose pattern is a
/// substring of the URL answers; unknown URLs get a 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sticky response for URLs containing `pattern`.
    pub fn route(self, pattern: &str, status: u16, body: &str) -> Self {
        self.routes.lock().push(Route {
            pattern: pattern.to_owned(),
            responses: vec![(status, body.to_owned())],
            served: 0,
        });
        self
    }

    /// Registers a scripted sequence; the last response is sticky.
    pub fn route_script(self, pattern: &str, script: &[(u16, &str)]) -> Self {
        self.routes.lock().push(Route {
            pattern: pattern.to_owned(),
            responses: script.iter().map(|(s, b)| (*s, (*b).to_owned())).collect(),
            served: 0,
        });
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn requests_matching(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|url| url.contains(pattern))
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &Url, _context: &str) -> transport::Result<HttpResponse> {
        let url = url.to_string();
        self.requests.lock().push(url.clone());

        let mut routes = self.routes.lock();
        for route in routes.iter_mut() {
            if url.contains(&route.pattern) {
                let index = route.served.min(route.responses.len() - 1);
                route.served += 1;
                let (status, body) = route.responses[index].clone();

                if status == CONNECT_ERROR {
                    return Err(transport::Error::Connect("scripted failure".to_owned()));
                }
                return Ok(HttpResponse {
                    status,
                    body: Bytes::from(body),
                    retry_after: None,
                });
            }
        }

        Ok(HttpResponse {
            status: 404,
            body: Bytes::new(),
            retry_after: None,
        })
    }
}

pub fn client_with(transport: Arc<MockTransport>) -> Client {
    ClientBuilder::new()
        .in_memory_cache()
        .transport(transport)
        .build()
        .expect("client builds")
}

/// A dartdoc-shaped class page. `padding_members` inflates the page for
/// truncation scenarios.
pub fn class_page(name: &str, padding_members: usize) -> String {
    let mut properties = String::from(
        r#"<dt><code>child Widget?</code></dt>
<dd>The widget below this widget in the tree.</dd>"#,
    );
    for i in 0..padding_members {
        properties.push_str(&format!(
            r#"
<dt><code>decoration{i} Decoration?</code></dt>
<dd>A synthetic member used to make this reference page long enough to
exercise the budgeted truncation paths, with prose that keeps going for a
handful of clauses so the word counter has something substantial to add
up for member number {i}.</dd>"#
        ));
    }

    format!(
        r#"<html><head><title>{name} class</title>
<script>var tracked = true;</script><style>.hidden {{}}</style></head>
<body>
<header>api.flutter.dev</header>
<nav class="breadcrumbs">Flutter &gt; widgets &gt; {name}</nav>
<div class="sidebar">sidebar noise</div>
<main>
<h1>{name} class</h1>
<section class="desc">
<p>A widget in the Flutter framework. It composes lower-level widgets and
participates in layout, painting, and hit testing.</p>
<pre><code class="language-dart">{name}(
  child: const Text('hello'),
)</code></pre>
</section>
<section class="summary" id="constructors">
<h2>Constructors</h2>
<dl>
<dt><code>{name}({{Key? key, Widget? child}})</code></dt>
<dd>Creates a {name} widget.</dd>
</dl>
</section>
<section class="summary" id="instance-properties">
<h2>Properties</h2>
<dl>{properties}</dl>
</section>
<section class="summary" id="instance-methods">
<h2>Methods</h2>
<dl>
<dt><code>build(BuildContext context) Widget</code></dt>
<dd>Describes the part of the user interface represented by this widget.</dd>
<dt><code>debugFillProperties(DiagnosticPropertiesBuilder properties) void</code></dt>
<dd>Add additional properties associated with the node.</dd>
</dl>
</section>
<section class="summary" id="inherited-methods">
<dl>
<dt><code>createElement()</code></dt><dd>inherited</dd>
<dt><code>toStringShort()</code></dt><dd>inherited</dd>
</dl>
</section>
</main>
<footer class="footer">© flutter.dev</footer>
</body></html>"#
    )
}

/// pub.dev `/api/packages/{name}` metadata with the given versions; the
/// last entry is `latest`.
pub fn package_meta(name: &str, versions: &[&str]) -> String {
    let latest = versions.last().expect("at least one version");
    let versions_json: Vec<String> = versions
        .iter()
        .map(|v| {
            format!(
                r#"{{"version":"{v}","pubspec":{{"description":"A test package."}},"published":"2024-01-01T00:00:00Z"}}"#
            )
        })
        .collect();

    format!(
        r#"{{"name":"{name}","latest":{{"version":"{latest}","pubspec":{{"description":"A test package.","homepage":"https://example.com/{name}"}},"published":"2024-01-01T00:00:00Z"}},"versions":[{}]}}"#,
        versions_json.join(",")
    )
}

pub fn package_readme(name: &str) -> String {
    format!(
        r#"<html><body>
<nav>pub.dev chrome</nav>
<section class="detail-tab-readme-content">
<h1>{name}</h1>
<p>Getting started with <code>{name}</code> is straightforward.</p>
<pre><code class="language-dart">import 'package:{name}/{name}.dart';</code></pre>
</section>
</body></html>"#
    )
}

/// A dartdoc `index.json` with class entries.
pub fn dartdoc_index(entries: &[(&str, &str)]) -> String {
    let items: Vec<String> = entries
        .iter()
        .map(|(name, href)| {
            format!(r#"{{"name":"{name}","qualifiedName":"{name}","href":"{href}","desc":""}}"#)
        })
        .collect();
    format!("[{}]", items.join(","))
}

/// A pub.dev search payload.
pub fn pub_search_results(packages: &[&str]) -> String {
    let items: Vec<String> = packages
        .iter()
        .map(|p| format!(r#"{{"package":"{p}"}}"#))
        .collect();
    format!(r#"{{"packages":[{}]}}"#, items.join(","))
}
