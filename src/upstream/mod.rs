//! Upstream documentation sources and the resilient fetch pipeline.

use std::fmt::{self, Display, Formatter};

pub mod fetcher;
pub mod transport;

pub use fetcher::{FetchError, Fetcher};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

/// The external documentation sources this crate talks to. One host each,
/// so the per-host rate limiter and circuit breaker key off the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    FlutterDocs,
    DartDocs,
    PubDev,
}

impl Upstream {
    pub const ALL: [Upstream; 3] = [Self::FlutterDocs, Self::DartDocs, Self::PubDev];

    pub fn host(&self) -> &'static str {
        match self {
            Self::FlutterDocs => "api.flutter.dev",
            Self::DartDocs => "api.dart.dev",
            Self::PubDev => "pub.dev",
        }
    }

    /// Key used in the `status` tool output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlutterDocs => "flutter_docs",
            Self::DartDocs => "dart_docs",
            Self::PubDev => "pub_dev",
        }
    }

    /// Maps a URL back to the upstream serving it.
    pub fn for_url(url: &url::Url) -> Option<Self> {
        let host = url.host_str()?;
        Self::ALL.into_iter().find(|u| u.host() == host)
    }
}

impl Display for Upstream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
