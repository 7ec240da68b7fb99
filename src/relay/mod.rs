//! HTTP relay engine.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → target.rs (scheme check, reattach query, percent-decode)
//!     → headers.rs (outbound headers + connection directive)
//!     → executor.rs (clear cookie jar, send via shared client)
//!     → headers.rs (return headers reconciled with the directive)
//!     → streamed or buffered response
//! ```
//!
//! # Design Decisions
//! - Validation and header transformation never suspend; only the send and
//!   the body transfer do
//! - The shared client (pool + cookie jar) is the only cross-request state
//! - Upstream status codes are passed through verbatim, never treated as errors

pub mod client;
pub mod connection;
pub mod error;
pub mod executor;
pub mod headers;
pub mod target;

pub use client::{ClearableCookieJar, SharedProxyClient};
pub use connection::ConnectionDirective;
pub use error::{ProxyError, RelayErrorKind};
pub use executor::{RelayExecutor, RelayMode, UpstreamResponse};
pub use headers::{build_return, ClientHeaderTransformer, HeaderDirection, ProxyHeaderSet};
pub use target::NormalizedTarget;
