//! Curated concept map: local documentation for cross-cutting Flutter
//! topics that have no single upstream page. Served without any network
//! round-trip and ranked alongside upstream hits in search.

/// One curated concept.
#[derive(Debug, Clone, Copy)]
pub struct Concept {
    /// Stable name used in the canonical id (`concept:{name}`).
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Extra tokens that should match this concept in search.
    pub keywords: &'static [&'static str],
    /// Canonical Markdown body.
    pub body: &'static str,
}

pub static CONCEPTS: &[Concept] = &[
    Concept {
        name: "state-management",
        title: "State management",
        description: "Approaches to managing application state in Flutter.",
        keywords: &["state", "provider", "riverpod", "bloc", "setstate", "inherited"],
        body: "# State management\n\n## Description\nFlutter is declarative: the UI is rebuilt from state. Ephemeral state \
lives in a `StatefulWidget`; app state is usually lifted into an \
approach such as `InheritedWidget`, provider, riverpod, or bloc.\n\n## Getting Started\n- Start with `setState` for widget-local state.\n- Reach for `pub:provider` or `pub:riverpod` when state is shared.\n- `pub:bloc` separates business logic behind event/state streams.\n",
    },
    Concept {
        name: "navigation",
        title: "Navigation and routing",
        description: "Moving between screens with Navigator and Router.",
        keywords: &["navigator", "router", "route", "go_router", "deep", "link"],
        body: "# Navigation and routing\n\n## Description\nThe `Navigator` manages a stack of routes; the `Router` API adds \
declarative, deep-linkable navigation.\n\n## Getting Started\n- `Navigator.push` / `Navigator.pop` for imperative flows.\n- `pub:go_router` wraps the Router API for URL-based navigation.\n",
    },
    Concept {
        name: "layouts",
        title: "Layouts",
        description: "Composing rows, columns, and constraint-based layout.",
        keywords: &["layout", "row", "column", "flex", "constraints", "stack"],
        body: "# Layouts\n\n## Description\nLayout in Flutter is constraint-based: constraints go down, sizes come \
up, the parent sets the position. `Row`, `Column`, `Stack`, and \
`Expanded` cover most arrangements.\n\n## Getting Started\n- Use `Row`/`Column` with `Expanded` and `Flexible` children.\n- `LayoutBuilder` adapts to the incoming constraints.\n",
    },
    Concept {
        name: "theming",
        title: "Theming",
        description: "App-wide visual styling with ThemeData.",
        keywords: &["theme", "themedata", "material", "dark", "color", "typography"],
        body: "# Theming\n\n## Description\n`ThemeData` configures colors, typography, and component styles \
app-wide; widgets read it through `Theme.of(context)`.\n\n## Getting Started\n- Set `theme` and `darkTheme` on `MaterialApp`.\n- Prefer `ColorScheme.fromSeed` for Material 3 palettes.\n",
    },
    Concept {
        name: "animations",
        title: "Animations",
        description: "Implicit and explicit animation APIs.",
        keywords: &["animation", "tween", "controller", "implicit", "explicit", "hero"],
        body: "# Animations\n\n## Description\nImplicit animations (`AnimatedContainer`, `AnimatedOpacity`) tween \
property changes automatically; explicit animations drive an \
`AnimationController` for full control.\n\n## Getting Started\n- Start implicit; move to `AnimationController` + `Tween` when you \
need curves, repetition, or coordination.\n",
    },
    Concept {
        name: "async-programming",
        title: "Asynchronous programming",
        description: "Futures, Streams, and async/await in Dart.",
        keywords: &["async", "await", "future", "stream", "isolate", "concurrency"],
        body: "# Asynchronous programming\n\n## Description\nDart is single-threaded with an event loop: `Future` for one value, \
`Stream` for many, `Isolate` for CPU-bound work off the main thread.\n\n## Getting Started\n- `FutureBuilder` and `StreamBuilder` bridge async values into widgets.\n- See `dart:async.Future` and `dart:async.Stream` for the core types.\n",
    },
    Concept {
        name: "testing",
        title: "Testing",
        description: "Unit, widget, and integration testing.",
        keywords: &["test", "widgettester", "mock", "integration", "golden"],
        body: "# Testing\n\n## Description\nFlutter ships three test layers: unit tests for plain Dart, widget \
tests with `WidgetTester`, and integration tests driving a device.\n\n## Getting Started\n- `flutter_test` is bundled; `pub:mocktail` covers mocking.\n- Golden tests pin down pixel output for widgets.\n",
    },
    Concept {
        name: "platform-channels",
        title: "Platform channels",
        description: "Calling host-platform code from Dart.",
        keywords: &["platform", "channel", "methodchannel", "native", "ffi", "plugin"],
        body: "# Platform channels\n\n## Description\n`MethodChannel` passes asynchronous messages between Dart and \
platform code; `dart:ffi` binds C libraries directly.\n\n## Getting Started\n- Define a channel name shared by both sides.\n- Prefer an existing plugin from pub.dev before writing your own.\n",
    },
];

/// Looks up a concept by its canonical name.
pub fn by_name(name: &str) -> Option<&'static Concept> {
    CONCEPTS.iter().find(|c| c.name == name)
}
