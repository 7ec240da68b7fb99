//! Connection-lifetime negotiation.
//!
//! The inbound `Connection` header decides whether the client-facing connection
//! must be closed after this exchange. The upstream leg is always kept alive so
//! the pooled connection can be reused; the decision only governs what is
//! promised back to the client.

use axum::http::{header::CONNECTION, HeaderMap, HeaderValue};

pub const CLOSE: &str = "close";
pub const KEEP_ALIVE: &str = "keep-alive";

/// Close/keep-alive decision carried from the request side to the response side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionDirective {
    pub require_close: bool,
}

impl ConnectionDirective {
    /// Derive the directive from a raw `Connection` header value.
    pub fn from_header_value(value: &str) -> Self {
        Self {
            require_close: ConnectionTokens::parse(value).contains(CLOSE),
        }
    }
}

/// Lower-cased, trimmed `Connection` tokens in header order, without empties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTokens(Vec<String>);

impl ConnectionTokens {
    pub fn parse(value: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for token in value.split(',').map(|t| t.trim().to_ascii_lowercase()) {
            if !token.is_empty() && !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        Self(tokens)
    }

    /// Parse every `Connection` value in `headers` as one comma-separated list.
    ///
    /// Values that are not visible ASCII are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let joined = headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        Self::parse(&joined)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    /// Remove `token`; returns true if it was present.
    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != token);
        self.0.len() != before
    }

    /// Insert `token` at the front unless already present.
    pub fn ensure_front(&mut self, token: &str) {
        if !self.contains(token) {
            self.0.insert(0, token.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Join back into a header value, `None` when empty.
    pub fn to_header_value(&self) -> Option<HeaderValue> {
        if self.0.is_empty() {
            return None;
        }
        HeaderValue::from_str(&self.0.join(",")).ok()
    }
}
