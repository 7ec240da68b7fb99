//! Relay error taxonomy and its mapping to client responses.

use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Broad cause of a failed upstream exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayErrorKind {
    /// The send or the buffered body read exceeded its deadline.
    Timeout,
    /// Could not connect (DNS, refused, reset).
    Connect,
    /// TLS handshake or certificate failure.
    Tls,
    /// Failure while reading the upstream body.
    Body,
    /// The outbound request could not be built (e.g. unparsable URL).
    Request,
    /// Anything else, including redirect loops.
    Other,
}

impl RelayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayErrorKind::Timeout => "timeout",
            RelayErrorKind::Connect => "connect",
            RelayErrorKind::Tls => "tls",
            RelayErrorKind::Body => "body",
            RelayErrorKind::Request => "request",
            RelayErrorKind::Other => "other",
        }
    }

    /// Classify a client error, looking through its source chain for TLS failures.
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return RelayErrorKind::Timeout;
        }
        if is_tls_failure(err) {
            return RelayErrorKind::Tls;
        }
        if err.is_connect() {
            RelayErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            RelayErrorKind::Body
        } else if err.is_builder() {
            RelayErrorKind::Request
        } else {
            RelayErrorKind::Other
        }
    }
}

impl fmt::Display for RelayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by a single relay call.
///
/// The `Display` text of each variant is exactly the plain-text body sent to the client.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Target does not carry an explicit http(s) scheme.
    #[error("Error: Invalid URL {url}")]
    InvalidTarget { url: String },

    /// Contacting the target failed. Never retried.
    #[error("Proxy {url} Error: {cause}")]
    Relay {
        url: String,
        kind: RelayErrorKind,
        cause: String,
    },
}

impl ProxyError {
    pub fn invalid_target(url: impl Into<String>) -> Self {
        ProxyError::InvalidTarget { url: url.into() }
    }

    pub fn relay(url: impl Into<String>, err: &reqwest::Error) -> Self {
        ProxyError::Relay {
            url: url.into(),
            kind: RelayErrorKind::classify(err),
            cause: err.to_string(),
        }
    }

    pub fn timeout(url: impl Into<String>, after: Duration) -> Self {
        ProxyError::Relay {
            url: url.into(),
            kind: RelayErrorKind::Timeout,
            cause: format!("request timed out after {}s", after.as_secs_f64()),
        }
    }

    pub fn bad_request_url(url: impl Into<String>, err: &url::ParseError) -> Self {
        ProxyError::Relay {
            url: url.into(),
            kind: RelayErrorKind::Request,
            cause: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
            ProxyError::Relay { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Relay failure kind, `None` for validation errors.
    pub fn kind(&self) -> Option<RelayErrorKind> {
        match self {
            ProxyError::InvalidTarget { .. } => None,
            ProxyError::Relay { kind, .. } => Some(*kind),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = cause.source();
    }
    false
}
