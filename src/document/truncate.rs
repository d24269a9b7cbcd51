//! Token-budgeted truncation that preserves document structure.
//!
//! Blocks carry one of five priorities. Whole priority tiers are dropped
//! lowest-first, then `Medium` blocks are shed from the back, then `High`
//! member docs are reduced to their signatures. `Critical` content (title,
//! description, primary constructor signature) is never removed outright;
//! if it alone exceeds the budget the document is cut on line boundaries,
//! dangling code fences are closed and open braces balanced.

use std::collections::BTreeSet;

use super::tokens::TokenCounter;
use super::Priority;

/// Members whose signatures survive truncation longest.
const CANONICAL_MEMBERS: &[&str] = &[
    "build",
    "child",
    "children",
    "controller",
    "createState",
    "didChangeDependencies",
    "didUpdateWidget",
    "dispose",
    "initState",
    "itemBuilder",
    "itemCount",
    "onChanged",
    "onPressed",
    "onTap",
    "setState",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateOutcome {
    pub content: String,
    pub truncated: bool,
    pub original_tokens: usize,
    pub token_count: usize,
    pub sections_kept: Vec<String>,
    pub sections_dropped: Vec<String>,
}

#[derive(Debug)]
struct Block {
    priority: Priority,
    lines: Vec<String>,
    code: bool,
}

#[derive(Debug)]
struct Section {
    heading: String,
    blocks: Vec<Block>,
}

#[derive(Debug)]
struct Parsed {
    title: String,
    sections: Vec<Section>,
}

/// Fits `content` into `max_tokens`, measured with `counter`.
pub fn truncate(content: &str, max_tokens: usize, counter: &TokenCounter) -> TruncateOutcome {
    let original_tokens = counter.count(content);
    let parsed = parse(content);
    let all_sections: Vec<String> = parsed.sections.iter().map(|s| s.heading.clone()).collect();

    if original_tokens <= max_tokens {
        return TruncateOutcome {
            content: content.to_owned(),
            truncated: false,
            original_tokens,
            token_count: original_tokens,
            sections_kept: all_sections,
            sections_dropped: Vec::new(),
        };
    }

    let mut doc = parsed;
    let mut shortened: BTreeSet<String> = BTreeSet::new();

    // Stage 1: shed whole tiers, lowest priority first.
    for tier in [Priority::Minimal, Priority::Low] {
        drop_tier(&mut doc, tier, &mut shortened);
        if fits(&doc, max_tokens, counter, &shortened) {
            return finish(doc, original_tokens, counter, &shortened, &all_sections);
        }
    }

    // Stage 2: shed Medium blocks from the back, keeping the leading ones
    // that still fit.
    while !fits(&doc, max_tokens, counter, &shortened) {
        if !drop_last_of(&mut doc, Priority::Medium, &mut shortened) {
            break;
        }
    }
    if fits(&doc, max_tokens, counter, &shortened) {
        return finish(doc, original_tokens, counter, &shortened, &all_sections);
    }

    // Stage 3: reduce High blocks to their signature.
    for section in &mut doc.sections {
        for block in &mut section.blocks {
            if block.priority == Priority::High && trim_to_signature(block) {
                shortened.insert(section.heading.clone());
            }
        }
    }
    if fits(&doc, max_tokens, counter, &shortened) {
        return finish(doc, original_tokens, counter, &shortened, &all_sections);
    }

    // Stage 4: only Critical (and trimmed High) content remains and it is
    // still over budget. Cut on line boundaries from the end.
    for section in &doc.sections {
        shortened.insert(section.heading.clone());
    }
    let footer = footer_line(&shortened);
    let body = render(&doc);
    let cut = cut_lines(&body, max_tokens, counter, &footer);
    let content = format!("{cut}\n{footer}\n");
    let token_count = counter.count(&content);

    let kept_sections: BTreeSet<&str> = content
        .lines()
        .filter_map(|l| l.strip_prefix("## "))
        .map(str::trim)
        .collect();

    TruncateOutcome {
        token_count,
        truncated: true,
        original_tokens,
        sections_kept: all_sections
            .iter()
            .filter(|s| kept_sections.contains(s.as_str()))
            .cloned()
            .collect(),
        sections_dropped: all_sections
            .iter()
            .filter(|s| !kept_sections.contains(s.as_str()))
            .cloned()
            .collect(),
        content,
    }
}

fn drop_tier(doc: &mut Parsed, tier: Priority, shortened: &mut BTreeSet<String>) {
    for section in &mut doc.sections {
        let before = section.blocks.len();
        section.blocks.retain(|b| b.priority != tier);
        if section.blocks.len() != before {
            shortened.insert(section.heading.clone());
        }
    }
}

fn drop_last_of(doc: &mut Parsed, tier: Priority, shortened: &mut BTreeSet<String>) -> bool {
    for section in doc.sections.iter_mut().rev() {
        if let Some(pos) = section.blocks.iter().rposition(|b| b.priority == tier) {
            section.blocks.remove(pos);
            shortened.insert(section.heading.clone());
            return true;
        }
    }
    false
}

/// Keeps the member heading and its signature fence, dropping prose.
fn trim_to_signature(block: &mut Block) -> bool {
    let mut keep = Vec::new();
    let mut in_fence = false;
    let mut fence_done = false;

    for line in &block.lines {
        let is_fence = line.trim_start().starts_with("```");
        if fence_done && !in_fence {
            break;
        }
        keep.push(line.clone());
        if is_fence {
            if in_fence {
                fence_done = true;
            }
            in_fence = !in_fence;
        }
    }

    if keep.len() != block.lines.len() {
        block.lines = keep;
        true
    } else {
        false
    }
}

fn fits(doc: &Parsed, max_tokens: usize, counter: &TokenCounter, shortened: &BTreeSet<String>) -> bool {
    let footer = footer_line(shortened);
    let candidate = format!("{}\n{footer}\n", render(doc));
    counter.count(&candidate) <= max_tokens
}

fn finish(
    doc: Parsed,
    original_tokens: usize,
    counter: &TokenCounter,
    shortened: &BTreeSet<String>,
    all_sections: &[String],
) -> TruncateOutcome {
    let footer = footer_line(shortened);
    let content = format!("{}\n{footer}\n", render(&doc));

    let kept: Vec<String> = doc
        .sections
        .iter()
        .filter(|s| !s.blocks.is_empty())
        .map(|s| s.heading.clone())
        .collect();

    TruncateOutcome {
        token_count: counter.count(&content),
        truncated: true,
        original_tokens,
        sections_dropped: all_sections.iter().filter(|s| !kept.contains(s)).cloned().collect(),
        sections_kept: kept,
        content,
    }
}

fn footer_line(shortened: &BTreeSet<String>) -> String {
    let sections = if shortened.is_empty() {
        "none".to_owned()
    } else {
        shortened.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    format!("---\n_Truncated to fit the token budget. Sections shortened: {sections}._")
}

fn render(doc: &Parsed) -> String {
    let mut out = String::new();
    out.push_str(&doc.title);
    out.push('\n');

    for section in &doc.sections {
        if section.blocks.is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str("## ");
        out.push_str(&section.heading);
        out.push('\n');
        for block in &section.blocks {
            out.push('\n');
            for line in &block.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

/// Largest prefix of `body` (in lines) that fits alongside `footer`,
/// with dangling code fences closed and braces balanced.
fn cut_lines(body: &str, max_tokens: usize, counter: &TokenCounter, footer: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();

    let assemble = |n: usize| -> String {
        let kept = &lines[..n];
        let mut out = kept.join("\n");

        // fence state over the kept prefix
        let mut in_fence = false;
        let mut stack: Vec<char> = Vec::new();
        for line in kept {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                if !in_fence {
                    stack.clear();
                }
                continue;
            }
            if in_fence {
                for c in line.chars() {
                    match c {
                        '{' | '[' | '(' => stack.push(c),
                        '}' => {
                            if stack.last() == Some(&'{') {
                                stack.pop();
                            }
                        }
                        ']' => {
                            if stack.last() == Some(&'[') {
                                stack.pop();
                            }
                        }
                        ')' => {
                            if stack.last() == Some(&'(') {
                                stack.pop();
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if in_fence {
            out.push_str("\n// …");
            while let Some(open) = stack.pop() {
                out.push('\n');
                out.push(match open {
                    '{' => '}',
                    '[' => ']',
                    _ => ')',
                });
            }
            out.push_str("\n```");
        }
        out
    };

    let fits_at = |n: usize| -> bool {
        let candidate = format!("{}\n{footer}\n", assemble(n));
        counter.count(&candidate) <= max_tokens
    };

    // at least the title line survives
    let (mut lo, mut hi) = (1usize, lines.len());
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if fits_at(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    assemble(lo)
}

fn parse(content: &str) -> Parsed {
    let mut lines = content.lines().peekable();
    let mut title = String::new();
    let mut sections: Vec<Section> = Vec::new();

    while let Some(line) = lines.next() {
        if line.starts_with("# ") && title.is_empty() {
            title = line.to_owned();
            continue;
        }
        if let Some(heading) = line.strip_prefix("## ") {
            let heading = heading.trim().to_owned();
            let mut body = Vec::new();
            while let Some(next) = lines.peek() {
                if next.starts_with("## ") || next.starts_with("# ") {
                    break;
                }
                body.push(lines.next().unwrap().to_owned());
            }
            let blocks = parse_section(&heading, &body);
            sections.push(Section { heading, blocks });
        }
    }

    Parsed { title, sections }
}

fn parse_section(heading: &str, body: &[String]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut example_fences = 0usize;
    let mut member_index = 0usize;

    let mut i = 0;
    while i < body.len() {
        let line = &body[i];

        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        if let Some(member) = line.strip_prefix("### ") {
            let member = member.trim().to_owned();
            let start = i;
            i += 1;
            // head: heading + signature fence + one doc line
            let mut head_end = i;
            let mut in_fence = false;
            let mut fence_closed = false;
            while head_end < body.len()
                && !body[head_end].starts_with("### ")
                && !body[head_end].starts_with("## ")
            {
                let is_fence = body[head_end].trim_start().starts_with("```");
                if is_fence {
                    if in_fence {
                        fence_closed = true;
                        head_end += 1;
                        break;
                    }
                    in_fence = true;
                } else if !in_fence && !fence_closed {
                    // member without a signature fence: head is the
                    // heading alone
                    break;
                }
                head_end += 1;
            }
            // one-line doc after the signature
            let mut doc_end = head_end;
            if doc_end < body.len()
                && !body[doc_end].trim().is_empty()
                && !body[doc_end].starts_with('#')
                && !body[doc_end].trim_start().starts_with("```")
            {
                doc_end += 1;
            }
            // rest of the member prose
            let mut rest_end = doc_end;
            while rest_end < body.len() && !body[rest_end].starts_with("### ") {
                rest_end += 1;
            }

            let (head_priority, prose_priority) = member_priorities(heading, &member, member_index);
            member_index += 1;

            let head: Vec<String> = body[start..doc_end]
                .iter()
                .filter(|l| !l.trim().is_empty())
                .cloned()
                .collect();
            blocks.push(Block {
                priority: head_priority,
                lines: head,
                code: false,
            });

            let prose: Vec<String> = body[doc_end..rest_end]
                .iter()
                .filter(|l| !l.trim().is_empty())
                .cloned()
                .collect();
            if !prose.is_empty() {
                blocks.push(Block {
                    priority: prose_priority,
                    lines: prose,
                    code: false,
                });
            }

            i = rest_end;
            continue;
        }

        if line.trim_start().starts_with("```") {
            let start = i;
            i += 1;
            while i < body.len() && !body[i].trim_start().starts_with("```") {
                i += 1;
            }
            if i < body.len() {
                i += 1; // closing fence
            }
            example_fences += 1;
            blocks.push(Block {
                priority: fence_priority(heading, example_fences),
                lines: body[start..i].to_vec(),
                code: true,
            });
            continue;
        }

        // contiguous prose run
        let start = i;
        while i < body.len()
            && !body[i].trim().is_empty()
            && !body[i].starts_with('#')
            && !body[i].trim_start().starts_with("```")
        {
            i += 1;
        }
        blocks.push(Block {
            priority: prose_priority(heading),
            lines: body[start..i].to_vec(),
            code: false,
        });
    }

    blocks
}

fn member_priorities(section: &str, member: &str, index: usize) -> (Priority, Priority) {
    if member.to_lowercase().contains("inherited") {
        return (Priority::Minimal, Priority::Minimal);
    }
    match section {
        "Constructors" => {
            if index == 0 {
                (Priority::Critical, Priority::Low)
            } else {
                (Priority::Medium, Priority::Low)
            }
        }
        "Properties" | "Methods" => {
            if CANONICAL_MEMBERS.contains(&member) {
                (Priority::High, Priority::Low)
            } else {
                (Priority::Medium, Priority::Low)
            }
        }
        _ => (Priority::Medium, Priority::Low),
    }
}

fn fence_priority(section: &str, ordinal: usize) -> Priority {
    match section {
        "Examples" => {
            if ordinal <= 2 {
                Priority::Medium
            } else {
                Priority::Low
            }
        }
        "Description" => Priority::Critical,
        "Installation" => Priority::High,
        _ => Priority::Medium,
    }
}

fn prose_priority(section: &str) -> Priority {
    let lower = section.to_lowercase();
    if lower.contains("see also") || lower.contains("related") || lower.contains("inherited") {
        return Priority::Minimal;
    }
    match section {
        "Description" => Priority::Critical,
        "Installation" => Priority::High,
        "Getting Started" | "API" => Priority::Medium,
        "Examples" => Priority::Low,
        "Changelog" => Priority::Low,
        _ => Priority::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> TokenCounter {
        TokenCounter::default()
    }

    fn sample_doc() -> String {
        let mut doc = String::from("# ListView\n\n## Description\nA scrollable list of widgets arranged linearly.\n\n## Constructors\n### ListView\n```dart\nListView({Key? key, Axis scrollDirection = Axis.vertical})\n```\nCreates a scrollable, linear array of widgets.\n\n### ListView.builder\n```dart\nListView.builder({required IndexedWidgetBuilder itemBuilder})\n```\nCreates a scrollable, linear array of widgets built on demand.\n\n## Properties\n");
        for i in 0..40 {
            doc.push_str(&format!(
                "### property{i}\n```dart\nWidget property{i}\n```\nSome long prose about property {i} that goes on and on with plenty of words to inflate the count for the truncation exercise.\n\n"
            ));
        }
        doc.push_str("## Methods\n### build\n```dart\nWidget build(BuildContext context)\n```\nDescribes the part of the user interface represented by this widget.\n\n### debugFillProperties\n```dart\nvoid debugFillProperties(DiagnosticPropertiesBuilder properties)\n```\nAdd additional properties associated with the node.\n\n### Inherited from ScrollView\nSee the base class for shared scrolling behavior and many inherited members.\n\n## Examples\n```dart\nListView(children: const [Text('a'), Text('b')])\n```\n```dart\nListView.builder(itemBuilder: (context, index) => Text('$index'))\n```\n```dart\nListView.separated(separatorBuilder: (context, index) => const Divider())\n```\n\n## See also\n- GridView\n- CustomScrollView\n");
        doc
    }

    #[test]
    fn under_budget_is_untouched() {
        let doc = "# Row\n\n## Description\nShort.\n";
        let out = truncate(doc, 10_000, &counter());
        assert!(!out.truncated);
        assert_eq!(out.content, doc);
        assert_eq!(out.token_count, out.original_tokens);
        assert!(out.sections_dropped.is_empty());
    }

    #[test]
    fn over_budget_sets_metadata() {
        let doc = sample_doc();
        let out = truncate(&doc, 800, &counter());
        assert!(out.truncated);
        assert!(out.token_count <= 800, "{} > 800", out.token_count);
        assert!(out.original_tokens > 800);
        assert!(out.content.starts_with("# ListView"));
        assert!(out.content.contains("## Description"));
        assert!(out.content.contains("Widget build(BuildContext context)"));
        assert!(out.content.contains("_Truncated"));
    }

    #[test]
    fn minimal_sections_go_first() {
        let doc = sample_doc();
        let full = counter().count(&doc);
        let out = truncate(&doc, full - 50, &counter());
        assert!(out.truncated);
        assert!(!out.content.contains("## See also"));
        assert!(!out.content.contains("Inherited from ScrollView"));
        // high-value content survives a mild trim
        assert!(out.content.contains("## Constructors"));
    }

    #[test]
    fn tight_budget_keeps_valid_fences() {
        let doc = sample_doc();
        let out = truncate(&doc, 500, &counter());
        assert!(out.truncated);
        assert!(out.token_count <= 500, "{} > 500", out.token_count);

        let fences = out.content.matches("```").count();
        assert_eq!(fences % 2, 0, "unbalanced fences in:\n{}", out.content);
        assert!(out.content.starts_with("# ListView"));
    }

    #[test]
    fn cut_code_closes_braces() {
        let body = "# T\n\n## Description\n```dart\nvoid main() {\n  runApp(\n    MyApp(\n```";
        let cut = cut_lines(body, 10_000, &counter(), "");
        // already-complete prefix: nothing to close beyond the fence
        assert!(cut.contains("```"));

        let long = format!(
            "# T\n\n## Description\n```dart\nvoid main() {{\n{}\n}}\n```",
            (0..400).map(|i| format!("  line{i}(arg, {{")).collect::<Vec<_>>().join("\n")
        );
        let cut = cut_lines(&long, 60, &counter(), "");
        assert!(cut.contains("// …"));
        assert_eq!(cut.matches("```").count() % 2, 0);
    }

    #[test]
    fn render_parse_is_idempotent() {
        let doc = sample_doc();
        let once = render(&parse(&doc));
        let twice = render(&parse(&once));
        assert_eq!(once, twice);
    }
}
