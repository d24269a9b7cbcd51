//! The public error taxonomy and its JSON envelope.
//!
//! Errors are values, never cached, and carry identifier-aware
//! suggestions where we have them. Variants are `Clone` so a single
//! failure can be shared across attached single-flight callers.

use serde_json::{json, Value};
use thiserror::Error;

use crate::resolve::version::NotSatisfiable;
use crate::resolve::ResolveError;
use crate::upstream::FetchError;

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("Not found: {identifier}")]
    NotFound {
        identifier: String,
        url: String,
        suggestions: Vec<String>,
    },

    #[error("Network failure: {message}")]
    Network { message: String },

    #[error("Rate limited by {host}, retries exhausted")]
    RateLimited { host: String },

    #[error("No published version of {package} satisfies '{requested}'")]
    VersionNotSatisfiable {
        package: String,
        requested: String,
        available: Vec<String>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        suggestions: Vec<String>,
    },

    #[error("Upstream server error from {upstream}: {message}")]
    UpstreamServerError { upstream: String, message: String },

    #[error("Cache failure: {message}")]
    Cache { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    /// Stable kind string surfaced as `error_type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Network { .. } => "Network",
            Self::RateLimited { .. } => "RateLimited",
            Self::VersionNotSatisfiable { .. } => "VersionNotSatisfiable",
            Self::InvalidInput { .. } => "InvalidInput",
            Self::UpstreamServerError { .. } => "UpstreamServerError",
            Self::Cache { .. } => "CacheError",
        }
    }

    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::NotFound { suggestions, .. } | Self::InvalidInput { suggestions, .. } => {
                suggestions
            }
            Self::VersionNotSatisfiable { available, .. } => available,
            _ => &[],
        }
    }

    fn context(&self) -> Option<Value> {
        match self {
            Self::NotFound { url, .. } => Some(json!({ "url": url })),
            Self::RateLimited { host } => Some(json!({ "host": host })),
            Self::VersionNotSatisfiable {
                package, requested, ..
            } => Some(json!({ "package": package, "requested": requested })),
            Self::UpstreamServerError { upstream, .. } => Some(json!({ "upstream": upstream })),
            _ => None,
        }
    }

    /// The self-describing envelope returned through the tool surface.
    pub fn envelope(&self) -> Value {
        let mut envelope = json!({
            "error": true,
            "error_type": self.error_type(),
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let map = envelope.as_object_mut().expect("envelope is an object");
        if !self.suggestions().is_empty() {
            map.insert("suggestions".into(), json!(self.suggestions()));
        }
        if let Some(context) = self.context() {
            map.insert("context".into(), context);
        }

        envelope
    }

    /// Attaches identifier context to a pipeline failure.
    pub(crate) fn from_fetch(e: FetchError, identifier: &str, suggestions: Vec<String>) -> Self {
        match e {
            FetchError::NotFound { url } => Self::NotFound {
                identifier: identifier.to_owned(),
                url,
                suggestions,
            },
            FetchError::RateLimited { host } => Self::RateLimited { host },
            FetchError::Network { message } => Self::Network { message },
            FetchError::UpstreamServer { upstream, message } => Self::UpstreamServerError {
                upstream: upstream.to_string(),
                message,
            },
            FetchError::CircuitOpen { upstream } => Self::UpstreamServerError {
                upstream: upstream.to_string(),
                message: "circuit open, request short-circuited".to_owned(),
            },
        }
    }

    pub(crate) fn version_not_satisfiable(package: &str, e: NotSatisfiable) -> Self {
        Self::VersionNotSatisfiable {
            package: package.to_owned(),
            requested: e.requested,
            available: e.closest.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        let suggestions = match &e {
            ResolveError::InvalidIdentifier { suggestions, .. } => suggestions.clone(),
            _ => Vec::new(),
        };
        Self::InvalidInput {
            message: e.to_string(),
            suggestions,
        }
    }
}

impl From<std::sync::Arc<Error>> for Error {
    fn from(e: std::sync::Arc<Error>) -> Self {
        (*e).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let error = Error::NotFound {
            identifier: "Containr".into(),
            url: "https://api.flutter.dev/flutter/widgets/Containr-class.html".into(),
            suggestions: vec!["Container".into()],
        };
        let envelope = error.envelope();

        assert_eq!(envelope["error"], true);
        assert_eq!(envelope["error_type"], "NotFound");
        assert_eq!(envelope["suggestions"][0], "Container");
        assert!(envelope["context"]["url"].as_str().unwrap().contains("Containr"));
        assert!(envelope.get("timestamp").is_some());
    }

    #[test]
    fn envelope_omits_empty_suggestions() {
        let envelope = Error::Network {
            message: "dns".into(),
        }
        .envelope();
        assert!(envelope.get("suggestions").is_none());
    }

    #[test]
    fn version_errors_surface_available() {
        use semver::Version;
        let error = Error::version_not_satisfiable(
            "dio",
            NotSatisfiable {
                requested: ">=99.0.0".into(),
                closest: vec![Version::new(5, 4, 0), Version::new(5, 3, 0)],
            },
        );
        assert_eq!(error.error_type(), "VersionNotSatisfiable");
        assert_eq!(error.suggestions(), &["5.4.0".to_owned(), "5.3.0".to_owned()]);
    }
}
