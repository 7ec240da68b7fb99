//! Process-wide upstream HTTP client.
//!
//! # Responsibilities
//! - Own the single pooled `reqwest::Client` every relay goes through
//! - Own the process-wide cookie jar and allow clearing it before each send
//!
//! # Design Decisions
//! - Built once at startup and injected into the executor, never a global
//! - TLS verification is configurable and off by default so any target works
//! - The cookie jar is shared by all in-flight requests. Clearing it before a
//!   send is best-effort: two concurrent requests can interleave their clear
//!   and their `Set-Cookie` handling. Clients that send no `Cookie` header get
//!   an explicit empty one (see `headers.rs`), which keeps the jar from
//!   attaching anything to the first hop.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::HeaderValue;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::RelayConfig;

/// Cookie store whose contents can be dropped atomically.
///
/// Clearing swaps in a fresh [`Jar`]; readers holding the old jar finish with it.
pub struct ClearableCookieJar {
    inner: ArcSwap<Jar>,
}

impl ClearableCookieJar {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(Jar::default()),
        }
    }

    /// Forget every stored cookie.
    pub fn clear(&self) {
        self.inner.store(Arc::new(Jar::default()));
    }

    /// Store a cookie as if `url` had sent `Set-Cookie: <cookie>`.
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        self.inner.load().add_cookie_str(cookie, url);
    }
}

impl Default for ClearableCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieStore for ClearableCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.inner.load().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.inner.load().cookies(url)
    }
}

/// Shared, connection-pooled client used for every relayed request.
#[derive(Clone)]
pub struct SharedProxyClient {
    http: reqwest::Client,
    cookies: Arc<ClearableCookieJar>,
    timeout: Duration,
}

impl SharedProxyClient {
    /// Build the client from relay settings.
    pub fn new(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        let cookies = Arc::new(ClearableCookieJar::new());

        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(Policy::limited(config.max_redirects))
            .no_proxy()
            .build()?;

        tracing::info!(
            pool_max_idle_per_host = config.pool_max_idle_per_host,
            timeout_secs = config.timeout_secs,
            accept_invalid_certs = config.accept_invalid_certs,
            "Shared proxy client initialized"
        );

        Ok(Self {
            http,
            cookies,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn cookies(&self) -> &ClearableCookieJar {
        &self.cookies
    }

    /// Deadline applied to each upstream send.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
