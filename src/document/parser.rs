//! Upstream payloads to canonical Markdown.
//!
//! Class reference pages (dartdoc HTML) and pub.dev packages (JSON
//! metadata merged with the scraped README) are both normalized into the
//! same section order: title, Description, Constructors/Installation,
//! Properties/Getting Started, Methods/API, Examples, Changelog.

use std::fmt::Write as _;

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use semver::Version;
use serde::Deserialize;
use url::Url;

/// Tags removed wholesale before rendering.
const CHROME_TAGS: &[&str] = &["script", "style", "nav", "header", "footer"];

/// Class substrings that mark navigation chrome.
const CHROME_CLASSES: &[&str] = &["sidebar", "breadcrumbs", "footer"];

fn selector(css: &str) -> Selector {
    // selectors are compile-time constants; a parse failure is a bug
    Selector::parse(css).expect("static selector")
}

/// Renders a dartdoc class page into the canonical document.
pub fn parse_class_html(html: &str, name: &str, base: &Url) -> String {
    let dom = Html::parse_document(html);

    let mut out = String::new();
    let _ = writeln!(out, "# {name}");

    let (description, examples) = extract_description(&dom, base);
    if !description.is_empty() {
        out.push_str("\n## Description\n");
        out.push_str(&description);
    }

    for (id, heading) in [
        ("constructors", "Constructors"),
        ("instance-properties", "Properties"),
        ("instance-methods", "Methods"),
    ] {
        let members = extract_members(&dom, id, base);
        if members.is_empty() {
            continue;
        }
        let _ = write!(out, "\n## {heading}\n");
        for member in members {
            out.push_str(&member);
        }

        if id == "instance-methods" {
            let inherited = extract_inherited(&dom);
            if !inherited.is_empty() {
                out.push_str("\n### Inherited members\n");
                for name in inherited {
                    let _ = writeln!(out, "- {name}");
                }
            }
        }
    }

    if !examples.is_empty() {
        out.push_str("\n## Examples\n");
        for example in examples {
            out.push('\n');
            out.push_str(&example);
        }
    }

    out
}

/// Description prose and the code samples embedded in it. Samples move to
/// the Examples section so prose and code can be truncated independently.
fn extract_description(dom: &Html, base: &Url) -> (String, Vec<String>) {
    let candidates = [
        selector("section.desc"),
        selector("#description"),
        selector("section.markdown"),
    ];

    let desc = candidates
        .iter()
        .find_map(|sel| dom.select(sel).next())
        .or_else(|| dom.select(&selector("main p")).next())
        .or_else(|| dom.select(&selector("body p")).next());

    let Some(desc) = desc else {
        return (String::new(), Vec::new());
    };

    let mut prose = String::new();
    let mut examples = Vec::new();

    if desc.value().name() == "p" {
        render_block(desc, base, &mut prose);
        return (prose, examples);
    }

    for child in desc.children() {
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        if el.value().name() == "pre" {
            let mut fenced = String::new();
            render_pre(el, &mut fenced);
            examples.push(fenced);
        } else {
            render_block(el, base, &mut prose);
        }
    }

    (prose, examples)
}

/// `<dl>` member lists under `section#{id}`: each `<dt>` holds a
/// signature, the following `<dd>` its one-paragraph doc.
fn extract_members(dom: &Html, id: &str, base: &Url) -> Vec<String> {
    let Some(section) = dom.select(&selector(&format!("#{id}"))).next() else {
        return Vec::new();
    };

    let mut members = Vec::new();
    let mut signature: Option<String> = None;

    for dl in section.select(&selector("dl")) {
        for child in dl.children() {
            let Some(el) = ElementRef::wrap(child) else {
                continue;
            };
            match el.value().name() {
                "dt" => {
                    if let Some(sig) = signature.take() {
                        members.push(format_member(&sig, ""));
                    }
                    signature = Some(collapse_whitespace(&el.text().collect::<String>()));
                }
                "dd" => {
                    let mut doc = String::new();
                    render_inline(el, base, &mut doc);
                    if let Some(sig) = signature.take() {
                        members.push(format_member(&sig, doc.trim()));
                    }
                }
                _ => {}
            }
        }
    }
    if let Some(sig) = signature.take() {
        members.push(format_member(&sig, ""));
    }

    members
}

fn format_member(signature: &str, doc: &str) -> String {
    let name = signature
        .split(|c: char| c == '(' || c == ' ' || c == '<')
        .find(|part| !part.is_empty())
        .unwrap_or(signature);

    let mut out = String::new();
    let _ = writeln!(out, "\n### {name}");
    let _ = writeln!(out, "```dart\n{signature}\n```");
    if !doc.is_empty() {
        let _ = writeln!(out, "{doc}");
    }
    out
}

fn extract_inherited(dom: &Html) -> Vec<String> {
    let mut names = Vec::new();
    for id in ["inherited-properties", "inherited-methods"] {
        if let Some(section) = dom.select(&selector(&format!("#{id}"))).next() {
            for dt in section.select(&selector("dt")) {
                let text = collapse_whitespace(&dt.text().collect::<String>());
                if let Some(name) = text.split(['(', ' ']).find(|p| !p.is_empty()) {
                    names.push(name.to_owned());
                }
            }
        }
    }
    names
}

// ---------------------------------------------------------------------------
// pub.dev

/// `/api/packages/{name}` payload, reduced to what we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub latest: Option<PackageVersion>,
    #[serde(default)]
    pub versions: Vec<PackageVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    #[serde(default)]
    pub pubspec: Pubspec,
    pub published: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pubspec {
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
}

impl PackageMetadata {
    /// Published versions that parse as semver, unordered.
    pub fn parsed_versions(&self) -> Vec<Version> {
        self.versions
            .iter()
            .filter_map(|v| Version::parse(&v.version).ok())
            .collect()
    }

    fn version_entry(&self, version: &Version) -> Option<&PackageVersion> {
        let wanted = version.to_string();
        self.versions
            .iter()
            .find(|v| v.version == wanted)
            .or(self.latest.as_ref())
    }
}

/// Merges package metadata with the scraped README. A missing README
/// degrades to a metadata-only document.
pub fn assemble_package_doc(
    meta: &PackageMetadata,
    version: &Version,
    readme_html: Option<&str>,
    page_url: &Url,
) -> String {
    let entry = meta.version_entry(version);
    let pubspec = entry.map(|e| &e.pubspec);

    let mut out = String::new();
    let _ = writeln!(out, "# {} {version}", meta.name);

    out.push_str("\n## Description\n");
    match pubspec.and_then(|p| p.description.as_deref()) {
        Some(description) => {
            let _ = writeln!(out, "{}", collapse_whitespace(description));
        }
        None => out.push_str("_No description published._\n"),
    }
    if let Some(homepage) = pubspec.and_then(|p| p.homepage.as_deref()) {
        let _ = writeln!(out, "\nHomepage: <{homepage}>");
    }
    if let Some(repository) = pubspec.and_then(|p| p.repository.as_deref()) {
        let _ = writeln!(out, "\nRepository: <{repository}>");
    }

    out.push_str("\n## Installation\n");
    let _ = writeln!(
        out,
        "```yaml\ndependencies:\n  {}: ^{version}\n```",
        meta.name
    );

    if let Some(html) = readme_html {
        let readme = extract_readme(html, page_url);
        if !readme.is_empty() {
            out.push_str("\n## Getting Started\n");
            out.push_str(&readme);
        }
    }

    out.push_str("\n## API\n");
    let _ = writeln!(
        out,
        "[API reference](https://pub.dev/documentation/{}/{version}/)",
        meta.name
    );

    let changelog = changelog_entries(meta);
    if !changelog.is_empty() {
        out.push_str("\n## Changelog\n");
        for line in changelog {
            let _ = writeln!(out, "- {line}");
        }
    }

    out
}

/// Last three published versions, newest first.
fn changelog_entries(meta: &PackageMetadata) -> Vec<String> {
    let mut versions: Vec<(Version, Option<&str>)> = meta
        .versions
        .iter()
        .filter_map(|v| {
            Version::parse(&v.version)
                .ok()
                .map(|parsed| (parsed, v.published.as_deref()))
        })
        .collect();
    versions.sort_by(|a, b| b.0.cmp(&a.0));

    versions
        .into_iter()
        .take(3)
        .map(|(version, published)| match published {
            Some(ts) => {
                let date = ts.split('T').next().unwrap_or(ts);
                format!("{version} — published {date}")
            }
            None => version.to_string(),
        })
        .collect()
}

fn extract_readme(html: &str, base: &Url) -> String {
    let dom = Html::parse_document(html);

    let candidates = [
        selector("section.detail-tab-readme-content"),
        selector(".markdown-body"),
        selector("main"),
        selector("body"),
    ];
    let Some(root) = candidates.iter().find_map(|sel| dom.select(sel).next()) else {
        return String::new();
    };

    let mut out = String::new();
    render_block(root, base, &mut out);
    out.trim().to_owned() + "\n"
}

// ---------------------------------------------------------------------------
// HTML -> Markdown

fn is_chrome(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    if CHROME_TAGS.contains(&value.name()) {
        return true;
    }
    value.attr("class").is_some_and(|classes| {
        classes
            .split_whitespace()
            .any(|class| CHROME_CLASSES.iter().any(|chrome| class.contains(chrome)))
    })
}

/// Block-level rendering: paragraphs, headings, lists, code fences.
fn render_block(el: ElementRef<'_>, base: &Url, out: &mut String) {
    if is_chrome(&el) {
        return;
    }

    match el.value().name() {
        "p" => {
            let mut text = String::new();
            render_inline(el, base, &mut text);
            let text = text.trim();
            if !text.is_empty() {
                let _ = writeln!(out, "{text}");
            }
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let mut text = String::new();
            render_inline(el, base, &mut text);
            let text = text.trim();
            if !text.is_empty() {
                // README headings are demoted below the canonical H2s
                let _ = writeln!(out, "\n### {text}");
            }
        }
        "pre" => {
            render_pre(el, out);
        }
        "ul" | "ol" => {
            for item in el.children().filter_map(ElementRef::wrap) {
                if item.value().name() == "li" {
                    let mut text = String::new();
                    render_inline(item, base, &mut text);
                    let text = text.trim();
                    if !text.is_empty() {
                        let _ = writeln!(out, "- {text}");
                    }
                }
            }
        }
        "blockquote" => {
            let mut text = String::new();
            render_inline(el, base, &mut text);
            let text = text.trim();
            if !text.is_empty() {
                let _ = writeln!(out, "> {text}");
            }
        }
        _ => {
            for child in el.children() {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_block(child_el, base, out);
                } else if let Node::Text(text) = child.value() {
                    let text = collapse_whitespace(&text.text);
                    if !text.trim().is_empty() {
                        let _ = writeln!(out, "{}", text.trim());
                    }
                }
            }
        }
    }
}

/// Fenced code block with a language hint when one is discoverable.
fn render_pre(el: ElementRef<'_>, out: &mut String) {
    let language = el
        .select(&selector("code"))
        .next()
        .and_then(|code| code.value().attr("class"))
        .and_then(|classes| {
            classes
                .split_whitespace()
                .find_map(|class| class.strip_prefix("language-"))
        })
        .unwrap_or("dart");

    let code: String = el.text().collect();
    let code = code.trim_matches('\n');
    let _ = writeln!(out, "```{language}\n{code}\n```");
}

/// Inline rendering: anchors become `[text](absolute)`, emphasis and
/// inline code keep their Markdown forms, whitespace collapses.
fn render_inline(el: ElementRef<'_>, base: &Url, out: &mut String) {
    if is_chrome(&el) {
        return;
    }

    match el.value().name() {
        "a" => {
            let mut text = String::new();
            for child in el.children() {
                render_inline_node(child, base, &mut text);
            }
            let text = text.trim();
            match el.value().attr("href").and_then(|href| base.join(href).ok()) {
                Some(href) if !text.is_empty() => {
                    let _ = write!(out, "[{text}]({href})");
                }
                _ => out.push_str(text),
            }
        }
        "code" => {
            let text: String = el.text().collect();
            let _ = write!(out, "`{}`", text.trim());
        }
        "strong" | "b" => {
            let mut text = String::new();
            for child in el.children() {
                render_inline_node(child, base, &mut text);
            }
            let _ = write!(out, "**{}**", text.trim());
        }
        "em" | "i" => {
            let mut text = String::new();
            for child in el.children() {
                render_inline_node(child, base, &mut text);
            }
            let _ = write!(out, "*{}*", text.trim());
        }
        "br" => out.push('\n'),
        _ => {
            for child in el.children() {
                render_inline_node(child, base, out);
            }
        }
    }
}

fn render_inline_node(node: NodeRef<'_, Node>, base: &Url, out: &mut String) {
    if let Some(el) = ElementRef::wrap(node) {
        render_inline(el, base, out);
    } else if let Node::Text(text) = node.value() {
        push_collapsed(&text.text, out);
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_collapsed(text: &str, out: &mut String) {
    let collapsed = collapse_whitespace(text);
    if collapsed.is_empty() {
        if text.chars().any(char::is_whitespace) && !out.ends_with([' ', '\n']) && !out.is_empty() {
            out.push(' ');
        }
        return;
    }
    if text.starts_with(char::is_whitespace) && !out.ends_with([' ', '\n']) && !out.is_empty() {
        out.push(' ');
    }
    out.push_str(&collapsed);
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}
