//! A resilient documentation core for Flutter, Dart, and pub.dev.
//!
//! `flutter-mcp` resolves heterogeneous identifiers (`"Container"`,
//! `"material.AppBar"`, `"dart:async.Future"`, `"pub:provider:^6.0.0"`)
//! to their authoritative upstream pages, fetches them behind per-host
//! rate limiting, retry with jittered backoff and per-upstream circuit
//! breaking, normalizes HTML/JSON into a canonical sectioned Markdown
//! document, caches it durably with token accounting, and fits responses
//! into a token budget with structure-preserving truncation.
//!
//! The MCP transport itself is not part of this crate; embedders wire
//! [`client::tools::ToolHandler`] into whatever framing they use.
//!
//! ```no_run
//! use flutter_mcp::client::{ClientBuilder, DocRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::from_env().build()?;
//!
//! let response = client
//!     .docs(DocRequest::new("Container").max_tokens(4_000))
//!     .await?;
//! assert!(response.content.starts_with("# Container"));
//!
//! let hits = client.search("state management", None).await?;
//! println!("{} results", hits.total_found);
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(clippy::clone_on_ref_ptr, clippy::todo, clippy::dbg_macro)]

pub mod backoff;
pub mod breaker;
pub mod cache;
pub mod client;
pub mod concepts;
pub mod config;
pub mod document;
pub mod resolve;
pub mod search;
pub mod singleflight;
pub mod throttle;
pub mod upstream;

pub use crate::client::{Client, ClientBuilder, DocRequest, DocsResponse};
pub use crate::document::{Document, Source, Topic};
pub use crate::resolve::{DocKind, ResolvedIdentifier};
