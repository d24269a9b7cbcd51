//! Identifier classification and upstream URL derivation.
//!
//! A raw identifier string (`"Container"`, `"material.AppBar"`,
//! `"dart:async.Future"`, `"pub:provider:^6.0.0"`) is classified into a
//! [`ResolvedIdentifier`] whose canonical form is the primary cache key.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub mod version;

use version::{SpecError, VersionSpec};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("cannot resolve identifier '{input}'")]
    InvalidIdentifier {
        input: String,
        suggestions: Vec<String>,
    },

    #[error(transparent)]
    InvalidSpec(#[from] SpecError),

    #[error("malformed canonical id '{0}'")]
    MalformedCanonical(String),
}

/// What a resolved identifier points at. Each variant carries its own URL
/// derivation and parser selection downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    FlutterClass,
    DartClass,
    PubPackage,
    Concept,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlutterClass => "flutter_class",
            Self::DartClass => "dart_class",
            Self::PubPackage => "pub_package",
            Self::Concept => "concept",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "flutter_class" => Some(Self::FlutterClass),
            "dart_class" => Some(Self::DartClass),
            "pub_package" => Some(Self::PubPackage),
            "concept" => Some(Self::Concept),
            _ => None,
        }
    }

    /// Cache TTL for documents of this kind.
    pub fn ttl_ms(&self) -> i64 {
        match self {
            Self::FlutterClass | Self::DartClass => 86_400_000,
            Self::PubPackage => 43_200_000,
            // curated content has no upstream to drift from
            Self::Concept => 86_400_000,
        }
    }
}

impl Display for DocKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentifier {
    pub kind: DocKind,
    pub library: Option<String>,
    pub name: String,
    /// Only valid for `PubPackage`.
    pub version_spec: Option<VersionSpec>,
}

const FLUTTER_LIBRARIES: &[&str] = &[
    "widgets",
    "material",
    "cupertino",
    "painting",
    "rendering",
    "animation",
    "services",
    "foundation",
];

const DART_LIBRARIES: &[&str] = &[
    "async",
    "collection",
    "convert",
    "core",
    "developer",
    "ffi",
    "io",
    "isolate",
    "math",
    "typed_data",
];

/// Curated widget names and the library their class page lives in.
/// Kept sorted by name for binary search.
static KNOWN_WIDGETS: &[(&str, &str)] = &[
    ("AlertDialog", "material"),
    ("Align", "widgets"),
    ("AnimatedBuilder", "widgets"),
    ("AnimatedContainer", "widgets"),
    ("AnimatedOpacity", "widgets"),
    ("AppBar", "material"),
    ("AspectRatio", "widgets"),
    ("BackdropFilter", "widgets"),
    ("BottomNavigationBar", "material"),
    ("BottomSheet", "material"),
    ("Builder", "widgets"),
    ("Card", "material"),
    ("Center", "widgets"),
    ("Checkbox", "material"),
    ("Chip", "material"),
    ("CircularProgressIndicator", "material"),
    ("ClipOval", "widgets"),
    ("ClipRRect", "widgets"),
    ("Column", "widgets"),
    ("ConstrainedBox", "widgets"),
    ("Container", "widgets"),
    ("CupertinoActivityIndicator", "cupertino"),
    ("CupertinoAlertDialog", "cupertino"),
    ("CupertinoButton", "cupertino"),
    ("CupertinoDatePicker", "cupertino"),
    ("CupertinoNavigationBar", "cupertino"),
    ("CupertinoPageScaffold", "cupertino"),
    ("CupertinoPicker", "cupertino"),
    ("CupertinoSlider", "cupertino"),
    ("CupertinoSwitch", "cupertino"),
    ("CupertinoTabBar", "cupertino"),
    ("CupertinoTextField", "cupertino"),
    ("CustomPaint", "widgets"),
    ("CustomScrollView", "widgets"),
    ("DataTable", "material"),
    ("DecoratedBox", "widgets"),
    ("Dialog", "material"),
    ("Dismissible", "widgets"),
    ("Divider", "material"),
    ("DragTarget", "widgets"),
    ("Draggable", "widgets"),
    ("Drawer", "material"),
    ("DropdownButton", "material"),
    ("ElevatedButton", "material"),
    ("Expanded", "widgets"),
    ("ExpansionTile", "material"),
    ("FittedBox", "widgets"),
    ("Flexible", "widgets"),
    ("FloatingActionButton", "material"),
    ("Flow", "widgets"),
    ("Focus", "widgets"),
    ("Form", "widgets"),
    ("FormField", "widgets"),
    ("FutureBuilder", "widgets"),
    ("GestureDetector", "widgets"),
    ("GridView", "widgets"),
    ("Hero", "widgets"),
    ("Icon", "widgets"),
    ("IconButton", "material"),
    ("Image", "widgets"),
    ("IndexedStack", "widgets"),
    ("InkWell", "material"),
    ("LayoutBuilder", "widgets"),
    ("LinearProgressIndicator", "material"),
    ("ListTile", "material"),
    ("ListView", "widgets"),
    ("MediaQuery", "widgets"),
    ("Navigator", "widgets"),
    ("Offstage", "widgets"),
    ("Opacity", "widgets"),
    ("OutlinedButton", "material"),
    ("Padding", "widgets"),
    ("PageView", "widgets"),
    ("Placeholder", "widgets"),
    ("PopupMenuButton", "material"),
    ("Positioned", "widgets"),
    ("Radio", "material"),
    ("RefreshIndicator", "material"),
    ("ReorderableListView", "material"),
    ("RepaintBoundary", "widgets"),
    ("RichText", "widgets"),
    ("Row", "widgets"),
    ("SafeArea", "widgets"),
    ("Scaffold", "material"),
    ("Semantics", "widgets"),
    ("ShaderMask", "widgets"),
    ("SingleChildScrollView", "widgets"),
    ("SizedBox", "widgets"),
    ("Slider", "material"),
    ("SnackBar", "material"),
    ("Spacer", "widgets"),
    ("Stack", "widgets"),
    ("State", "widgets"),
    ("StatefulWidget", "widgets"),
    ("StatelessWidget", "widgets"),
    ("Stepper", "material"),
    ("StreamBuilder", "widgets"),
    ("Switch", "material"),
    ("TabBar", "material"),
    ("TabBarView", "material"),
    ("Table", "widgets"),
    ("Text", "widgets"),
    ("TextButton", "material"),
    ("TextField", "material"),
    ("TextFormField", "material"),
    ("Tooltip", "material"),
    ("Transform", "widgets"),
    ("ValueListenableBuilder", "widgets"),
    ("Visibility", "widgets"),
    ("Wrap", "widgets"),
];

fn known_widget_library(name: &str) -> Option<&'static str> {
    KNOWN_WIDGETS
        .binary_search_by(|(n, _)| n.cmp(&name))
        .ok()
        .map(|i| KNOWN_WIDGETS[i].1)
}

/// Classifies a raw identifier. Rules are evaluated in order:
///
/// 1. `pub:` prefix → package, with optional `:version_spec`
/// 2. `dart:` prefix → Dart class
/// 3. `library:Name` with a known Dart library → Dart class
/// 4. `library.Name` with a known Flutter library → Flutter class
/// 5. curated widget name → Flutter class
/// 6. fall-through → package
pub fn resolve(identifier: &str) -> Result<ResolvedIdentifier, ResolveError> {
    let input = identifier.trim();
    if input.is_empty() {
        return Err(ResolveError::InvalidIdentifier {
            input: identifier.to_owned(),
            suggestions: Vec::new(),
        });
    }

    if let Some(rest) = input.strip_prefix("pub:") {
        return resolve_package(rest, input);
    }

    if let Some(rest) = input.strip_prefix("dart:") {
        return resolve_dart(rest, input);
    }

    if let Some((prefix, rest)) = input.split_once(':') {
        if DART_LIBRARIES.contains(&prefix) {
            return resolve_dart(&format!("{prefix}.{rest}"), input);
        }
        return Err(ResolveError::InvalidIdentifier {
            input: input.to_owned(),
            suggestions: Vec::new(),
        });
    }

    if let Some((library, name)) = input.split_once('.') {
        if FLUTTER_LIBRARIES.contains(&library) && !name.is_empty() && !name.contains('.') {
            return Ok(ResolvedIdentifier {
                kind: DocKind::FlutterClass,
                library: Some(library.to_owned()),
                name: name.to_owned(),
                version_spec: None,
            });
        }
        return Err(ResolveError::InvalidIdentifier {
            input: input.to_owned(),
            suggestions: library_suggestions(library),
        });
    }

    if let Some(library) = known_widget_library(input) {
        return Ok(ResolvedIdentifier {
            kind: DocKind::FlutterClass,
            library: Some(library.to_owned()),
            name: input.to_owned(),
            version_spec: None,
        });
    }

    resolve_package(input, input)
}

fn resolve_package(rest: &str, whole: &str) -> Result<ResolvedIdentifier, ResolveError> {
    let (name, spec) = match rest.split_once(':') {
        Some((name, spec)) => (name, Some(VersionSpec::parse(spec)?)),
        None => (rest, None),
    };

    if !is_valid_package_name(name) {
        return Err(ResolveError::InvalidIdentifier {
            input: whole.to_owned(),
            suggestions: widget_suggestions(name),
        });
    }

    Ok(ResolvedIdentifier {
        kind: DocKind::PubPackage,
        library: None,
        name: name.to_owned(),
        version_spec: spec,
    })
}

fn resolve_dart(rest: &str, whole: &str) -> Result<ResolvedIdentifier, ResolveError> {
    let Some((library, name)) = rest.rsplit_once('.') else {
        return Err(ResolveError::InvalidIdentifier {
            input: whole.to_owned(),
            suggestions: vec![format!("dart:{rest}.<ClassName>")],
        });
    };
    if library.is_empty() || name.is_empty() {
        return Err(ResolveError::InvalidIdentifier {
            input: whole.to_owned(),
            suggestions: Vec::new(),
        });
    }

    Ok(ResolvedIdentifier {
        kind: DocKind::DartClass,
        library: Some(format!("dart:{library}")),
        name: name.to_owned(),
        version_spec: None,
    })
}

fn is_valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Widget names within edit distance 2 of the query, closest first.
pub(crate) fn widget_suggestions(query: &str) -> Vec<String> {
    let mut scored: Vec<(usize, &str)> = KNOWN_WIDGETS
        .iter()
        .filter_map(|(name, _)| {
            edit_distance_at_most(&query.to_lowercase(), &name.to_lowercase(), 2)
                .map(|d| (d, *name))
        })
        .collect();
    scored.sort();
    scored.into_iter().map(|(_, n)| n.to_owned()).take(5).collect()
}

fn library_suggestions(library: &str) -> Vec<String> {
    FLUTTER_LIBRARIES
        .iter()
        .filter_map(|lib| {
            edit_distance_at_most(library, lib, 2).map(|_| format!("{lib}.<ClassName>"))
        })
        .collect()
}

/// Bounded Levenshtein distance; `None` when the distance exceeds `max`.
pub(crate) fn edit_distance_at_most(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut current);
    }

    (prev[b.len()] <= max).then_some(prev[b.len()])
}

impl ResolvedIdentifier {
    /// Stable form `kind:[library.]name[@version_spec]`, the primary
    /// cache-key prefix.
    pub fn canonical_id(&self) -> String {
        let mut out = String::new();
        out.push_str(self.kind.as_str());
        out.push(':');
        if let Some(library) = &self.library {
            out.push_str(library);
            out.push('.');
        }
        out.push_str(&self.name);
        if let Some(spec) = &self.version_spec {
            out.push('@');
            out.push_str(&spec.to_string());
        }
        out
    }

    /// Inverse of [`canonical_id`](Self::canonical_id).
    pub fn from_canonical(canonical: &str) -> Result<Self, ResolveError> {
        let malformed = || ResolveError::MalformedCanonical(canonical.to_owned());

        let (kind, rest) = canonical.split_once(':').ok_or_else(malformed)?;
        let kind = DocKind::parse(kind).ok_or_else(malformed)?;

        let (rest, version_spec) = match rest.rsplit_once('@') {
            Some((rest, spec)) => (rest, Some(VersionSpec::parse(spec)?)),
            None => (rest, None),
        };
        if version_spec.is_some() && kind != DocKind::PubPackage {
            return Err(malformed());
        }

        let (library, name) = match kind {
            DocKind::PubPackage | DocKind::Concept => (None, rest),
            DocKind::FlutterClass | DocKind::DartClass => {
                let (library, name) = rest.rsplit_once('.').ok_or_else(malformed)?;
                (Some(library.to_owned()), name)
            }
        };
        if name.is_empty() || library.as_deref().is_some_and(str::is_empty) {
            return Err(malformed());
        }

        Ok(Self {
            kind,
            library,
            name: name.to_owned(),
            version_spec,
        })
    }

    /// Authoritative upstream URL for this identifier; `None` for curated
    /// concepts, which have no upstream.
    pub fn source_url(&self) -> Option<Url> {
        let url = match self.kind {
            DocKind::FlutterClass => {
                let library = self.library.as_deref().unwrap_or("widgets");
                format!(
                    "https://api.flutter.dev/flutter/{library}/{}-class.html",
                    self.name
                )
            }
            DocKind::DartClass => {
                let library = self.library.as_deref().unwrap_or("dart:core");
                let dashed = library.replace(':', "-");
                format!(
                    "https://api.dart.dev/stable/{dashed}/{}-class.html",
                    self.name
                )
            }
            DocKind::PubPackage => format!("https://pub.dev/api/packages/{}", self.name),
            DocKind::Concept => return None,
        };

        // The formats above always produce absolute https URLs.
        Url::parse(&url).ok()
    }

    /// pub.dev HTML page carrying the rendered README.
    pub fn package_page_url(&self) -> Option<Url> {
        match self.kind {
            DocKind::PubPackage => {
                Url::parse(&format!("https://pub.dev/packages/{}", self.name)).ok()
            }
            _ => None,
        }
    }
}

impl Display for ResolvedIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_id())
    }
}
