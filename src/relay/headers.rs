//! Header transformation for both legs of a relayed exchange.
//!
//! # Responsibilities
//! - Build the outbound (client → upstream) header set
//! - Build the return (upstream → client) header set
//! - Keep `Connection` well-formed and strip `Keep-Alive` in both directions
//!
//! # Data Flow
//! ```text
//! inbound headers ──build_outbound──▶ OutboundHeaders + ConnectionDirective
//!                                                        │
//! upstream headers ──build_return(directive)──▶ ReturnHeaders
//! ```

use axum::http::{
    header::{CONNECTION, COOKIE, HOST, USER_AGENT},
    HeaderMap, HeaderName, HeaderValue,
};
use url::{Position, Url};

use crate::relay::connection::{ConnectionDirective, ConnectionTokens, CLOSE, KEEP_ALIVE};

/// Hop-by-hop header that is never forwarded in either direction.
pub static KEEP_ALIVE_HEADER: HeaderName = HeaderName::from_static("keep-alive");

/// User agent sent upstream in place of whatever the client sent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/999.0.9999.999 Safari/537.36";

/// Which leg a header set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDirection {
    /// Client → upstream.
    Outbound,
    /// Upstream → client.
    Return,
}

/// Header set produced by one of the transformers.
///
/// Tracks which keys were synthesized by the proxy rather than copied from the
/// input. Never contains `Keep-Alive`.
#[derive(Debug, Clone)]
pub struct ProxyHeaderSet {
    direction: HeaderDirection,
    headers: HeaderMap,
    synthesized: Vec<HeaderName>,
}

impl ProxyHeaderSet {
    fn new(direction: HeaderDirection, headers: HeaderMap) -> Self {
        Self {
            direction,
            headers,
            synthesized: Vec::new(),
        }
    }

    fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name.clone(), value);
        if !self.synthesized.contains(&name) {
            self.synthesized.push(name);
        }
    }

    fn apply_connection(&mut self, tokens: &ConnectionTokens) {
        match tokens.to_header_value() {
            Some(value) => self.set(CONNECTION, value),
            None => {
                self.headers.remove(CONNECTION);
            }
        }
    }

    pub fn direction(&self) -> HeaderDirection {
        self.direction
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Keys written by the proxy, in the order they were first written.
    pub fn synthesized(&self) -> &[HeaderName] {
        &self.synthesized
    }

    pub fn was_synthesized(&self, name: &HeaderName) -> bool {
        self.synthesized.contains(name)
    }

    /// Parsed `Connection` tokens of this set.
    pub fn connection_tokens(&self) -> ConnectionTokens {
        ConnectionTokens::from_headers(&self.headers)
    }
}

/// Builds outbound header sets from inbound client headers.
#[derive(Debug, Clone)]
pub struct ClientHeaderTransformer {
    user_agent: HeaderValue,
}

impl ClientHeaderTransformer {
    pub fn new(user_agent: HeaderValue) -> Self {
        Self { user_agent }
    }

    /// Transform inbound headers for sending to `target`.
    ///
    /// `Connection` always ends up containing `keep-alive`; a client `close`
    /// is removed from it and reported through the returned directive instead.
    pub fn build_outbound(
        &self,
        inbound: &HeaderMap,
        target: &Url,
    ) -> (ProxyHeaderSet, ConnectionDirective) {
        let mut set = ProxyHeaderSet::new(HeaderDirection::Outbound, inbound.clone());

        if let Ok(host) = HeaderValue::from_str(authority(target)) {
            set.set(HOST, host);
        }

        // An explicit (even empty) Cookie header keeps the shared jar from
        // attaching cookies stored by another client's request.
        if !set.headers.contains_key(COOKIE) {
            set.set(COOKIE, HeaderValue::from_static(""));
        }

        let mut tokens = ConnectionTokens::from_headers(&set.headers);
        let require_close = tokens.remove(CLOSE);
        tokens.ensure_front(KEEP_ALIVE);
        set.apply_connection(&tokens);

        set.headers.remove(&KEEP_ALIVE_HEADER);
        set.set(USER_AGENT, self.user_agent.clone());

        (set, ConnectionDirective { require_close })
    }
}

impl Default for ClientHeaderTransformer {
    fn default() -> Self {
        Self::new(HeaderValue::from_static(DEFAULT_USER_AGENT))
    }
}

/// Transform upstream response headers for returning to the client.
///
/// `Connection: close` is present iff the client asked for it, regardless of
/// what the upstream decided.
pub fn build_return(upstream: HeaderMap, directive: ConnectionDirective) -> ProxyHeaderSet {
    let mut set = ProxyHeaderSet::new(HeaderDirection::Return, upstream);
    let mut tokens = ConnectionTokens::from_headers(&set.headers);

    let changed = if directive.require_close {
        let had_close = tokens.contains(CLOSE);
        tokens.ensure_front(CLOSE);
        !had_close
    } else {
        tokens.remove(CLOSE)
    };

    if changed || tokens.is_empty() {
        set.apply_connection(&tokens);
    } else if let Some(value) = tokens.to_header_value() {
        // Rewrite in canonical form without marking it synthesized.
        set.headers.insert(CONNECTION, value);
    }

    set.headers.remove(&KEEP_ALIVE_HEADER);
    set
}

/// `host[:port]` of `url`, with default ports omitted.
fn authority(url: &Url) -> &str {
    &url[Position::BeforeHost..Position::AfterPort]
}
