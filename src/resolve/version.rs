//! Version constraint parsing and resolution against published versions.

use std::fmt::{self, Display, Formatter};

use semver::Version;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid version spec '{0}'")]
    Invalid(String),

    #[error("conflicting bounds in range '{0}'")]
    ConflictingBounds(String),
}

#[derive(Debug, Error)]
#[error("no published version satisfies '{requested}'")]
pub struct NotSatisfiable {
    pub requested: String,

    /// Up to 10 highest published versions, for suggestions.
    pub closest: Vec<Version>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Latest,
    Stable,
    Dev,
    Beta,
    Alpha,
}

impl Keyword {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Stable => "stable",
            Self::Dev => "dev",
            Self::Beta => "beta",
            Self::Alpha => "alpha",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "latest" => Some(Self::Latest),
            "stable" => Some(Self::Stable),
            "dev" => Some(Self::Dev),
            "beta" => Some(Self::Beta),
            "alpha" => Some(Self::Alpha),
            _ => None,
        }
    }
}

/// A version constraint as written after a package identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Exact(Version),
    Caret(Version),
    Range {
        lower: Option<(Version, bool)>,
        upper: Option<(Version, bool)>,
    },
    Keyword(Keyword),
}

impl VersionSpec {
    /// Grammar:
    ///
    /// - exact: `1.2.3`, `1.2.3-beta.1`
    /// - caret: `^1.2.3`
    /// - range: one or two of `>= > <= <` + version, space-separated
    /// - keywords: `latest`, `stable`, `dev`, `beta`, `alpha`
    pub fn parse(input: &str) -> Result<Self, SpecError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SpecError::Invalid(input.to_owned()));
        }

        if let Some(keyword) = Keyword::parse(input) {
            return Ok(Self::Keyword(keyword));
        }

        if let Some(rest) = input.strip_prefix('^') {
            let version = parse_version(rest, input)?;
            return Ok(Self::Caret(version));
        }

        if input.starts_with('>') || input.starts_with('<') {
            return Self::parse_range(input);
        }

        let version = parse_version(input, input)?;
        Ok(Self::Exact(version))
    }

    fn parse_range(input: &str) -> Result<Self, SpecError> {
        let mut lower: Option<(Version, bool)> = None;
        let mut upper: Option<(Version, bool)> = None;

        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() || parts.len() > 2 {
            return Err(SpecError::Invalid(input.to_owned()));
        }

        for part in parts {
            let (op, rest, is_lower) = if let Some(rest) = part.strip_prefix(">=") {
                (true, rest, true)
            } else if let Some(rest) = part.strip_prefix("<=") {
                (true, rest, false)
            } else if let Some(rest) = part.strip_prefix('>') {
                (false, rest, true)
            } else if let Some(rest) = part.strip_prefix('<') {
                (false, rest, false)
            } else {
                return Err(SpecError::Invalid(input.to_owned()));
            };

            let bound = (parse_version(rest, input)?, op);
            let slot = if is_lower { &mut lower } else { &mut upper };
            if slot.is_some() {
                return Err(SpecError::ConflictingBounds(input.to_owned()));
            }
            *slot = Some(bound);
        }

        Ok(Self::Range { lower, upper })
    }

    /// Whether `version` satisfies this constraint.
    ///
    /// Pre-release versions never satisfy a caret or range constraint
    /// unless the constraint itself names a pre-release of the same
    /// `major.minor.patch` (so `^6.0.0` does not pull in `7.0.0-beta`).
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            Self::Exact(target) => version == target,
            Self::Caret(target) => {
                let upper = caret_upper(target);
                if !prerelease_admissible(version, std::slice::from_ref(target)) {
                    return false;
                }
                version >= target && *version < upper
            }
            Self::Range { lower, upper } => {
                let bounds: Vec<&Version> = lower
                    .iter()
                    .chain(upper.iter())
                    .map(|(v, _)| v)
                    .collect();
                if !version.pre.is_empty()
                    && !bounds
                        .iter()
                        .any(|b| !b.pre.is_empty() && same_release(b, version))
                {
                    return false;
                }

                if let Some((bound, inclusive)) = lower {
                    let ok = if *inclusive {
                        version >= bound
                    } else {
                        version > bound
                    };
                    if !ok {
                        return false;
                    }
                }
                if let Some((bound, inclusive)) = upper {
                    let ok = if *inclusive {
                        version <= bound
                    } else {
                        version < bound
                    };
                    if !ok {
                        return false;
                    }
                }
                true
            }
            Self::Keyword(keyword) => match keyword {
                Keyword::Latest => true,
                Keyword::Stable => version.pre.is_empty(),
                Keyword::Dev | Keyword::Beta | Keyword::Alpha => version
                    .pre
                    .as_str()
                    .split('.')
                    .any(|part| part == keyword.as_str()),
            },
        }
    }
}

impl Display for VersionSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Caret(v) => write!(f, "^{v}"),
            Self::Range { lower, upper } => {
                let mut wrote = false;
                if let Some((v, inclusive)) = lower {
                    write!(f, "{}{v}", if *inclusive { ">=" } else { ">" })?;
                    wrote = true;
                }
                if let Some((v, inclusive)) = upper {
                    if wrote {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}{v}", if *inclusive { "<=" } else { "<" })?;
                }
                Ok(())
            }
            Self::Keyword(k) => f.write_str(k.as_str()),
        }
    }
}

fn parse_version(s: &str, whole: &str) -> Result<Version, SpecError> {
    let version = Version::parse(s).map_err(|_| SpecError::Invalid(whole.to_owned()))?;
    if !version.build.is_empty() {
        return Err(SpecError::Invalid(whole.to_owned()));
    }
    Ok(version)
}

fn same_release(a: &Version, b: &Version) -> bool {
    a.major == b.major && a.minor == b.minor && a.patch == b.patch
}

fn prerelease_admissible(version: &Version, anchors: &[Version]) -> bool {
    version.pre.is_empty()
        || anchors
            .iter()
            .any(|a| !a.pre.is_empty() && same_release(a, version))
}

/// Exclusive upper bound of a caret constraint:
/// `^1.2.3 -> 2.0.0`, `^0.2.3 -> 0.3.0`, `^0.0.3 -> 0.0.4`.
fn caret_upper(v: &Version) -> Version {
    if v.major > 0 {
        Version::new(v.major + 1, 0, 0)
    } else if v.minor > 0 {
        Version::new(0, v.minor + 1, 0)
    } else {
        Version::new(0, 0, v.patch + 1)
    }
}

/// Picks the highest published version satisfying `spec`.
///
/// With no spec, the highest stable version wins; a package that only ever
/// published pre-releases resolves to its highest one.
pub fn resolve(
    spec: Option<&VersionSpec>,
    published: &[Version],
) -> Result<Version, NotSatisfiable> {
    let best = match spec {
        Some(spec) => published.iter().filter(|v| spec.satisfies(v)).max(),
        None => published
            .iter()
            .filter(|v| v.pre.is_empty())
            .max()
            .or_else(|| published.iter().max()),
    };

    best.cloned().ok_or_else(|| {
        let mut closest: Vec<Version> = published.to_vec();
        closest.sort();
        closest.reverse();
        closest.truncate(10);
        NotSatisfiable {
            requested: spec.map(|s| s.to_string()).unwrap_or_else(|| "latest".into()),
            closest,
        }
    })
}
