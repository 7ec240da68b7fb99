//! Relay executor: sends the outbound request and hands back the upstream response.
//!
//! # Responsibilities
//! - Validate and normalize the target, then transform client headers
//! - Clear the shared cookie jar and send through the pooled client
//! - Return the upstream body either streamed or fully buffered
//! - Release upstream resources on every exit path
//!
//! # Data Flow
//! ```text
//! Request ─▶ target::normalize ─▶ build_outbound ─▶ relay (send) ─▶ build_return ─▶ Response
//!                                        │                               ▲
//!                                        └──── ConnectionDirective ──────┘
//! ```
//!
//! # Design Decisions
//! - One code path for both modes so header rules cannot drift between them
//! - Redirects are followed by the client; the final response is returned
//! - Failures are never retried
//! - Streamed bodies release the upstream connection when they end, fail, or
//!   are dropped because the client went away

use std::fmt;
use std::io::Write;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    http::{
        header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, HOST, TRANSFER_ENCODING, VARY},
        HeaderMap, HeaderValue, Method, Request, StatusCode,
    },
    response::Response,
};
use flate2::{write::GzEncoder, Compression};
use futures_util::{stream, Stream, StreamExt};
use tokio::time;

use crate::config::RelayConfig;
use crate::observability::metrics;
use crate::relay::client::SharedProxyClient;
use crate::relay::connection::ConnectionDirective;
use crate::relay::error::ProxyError;
use crate::relay::headers::{build_return, ClientHeaderTransformer, ProxyHeaderSet, DEFAULT_USER_AGENT};
use crate::relay::target::{self, NormalizedTarget};

/// How the upstream body is delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Passed through chunk by chunk, never fully held in memory.
    Streaming,
    /// Read completely, optionally gzip-compressed, then returned.
    Buffered,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::Streaming => "streaming",
            RelayMode::Buffered => "buffered",
        }
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods whose inbound body is never forwarded.
const BODYLESS_METHODS: [Method; 4] = [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE];

pub fn carries_body(method: &Method) -> bool {
    !BODYLESS_METHODS.contains(method)
}

/// Response received from the target, after redirects.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

pub enum UpstreamBody {
    Stream(UpstreamStream),
    Buffered(Bytes),
}

/// Upstream byte stream that accounts for and releases its connection.
pub struct UpstreamStream {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    release: Option<StreamRelease>,
}

impl UpstreamStream {
    fn new(response: reqwest::Response, open: Arc<AtomicUsize>, url: &str) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        metrics::stream_opened();
        Self {
            inner: Box::pin(response.bytes_stream()),
            release: Some(StreamRelease {
                open,
                url: url.to_string(),
                bytes: 0,
            }),
        }
    }

    /// Drop the upstream response now and stop yielding.
    fn close(&mut self) {
        self.inner = Box::pin(stream::empty());
        self.release.take();
    }
}

impl Stream for UpstreamStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(release) = this.release.as_mut() {
                    release.bytes += chunk.len() as u64;
                }
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "Upstream stream failed mid-body");
                this.close();
            }
            Poll::Ready(None) => this.close(),
            Poll::Pending => {}
        }
        polled
    }
}

struct StreamRelease {
    open: Arc<AtomicUsize>,
    url: String,
    bytes: u64,
}

impl Drop for StreamRelease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        metrics::stream_released();
        tracing::debug!(target_url = %self.url, bytes = self.bytes, "Upstream stream released");
    }
}

/// Buffered-mode recompression policy.
#[derive(Debug, Clone, Copy)]
pub struct GzipPolicy {
    pub enabled: bool,
    pub min_size: usize,
}

/// Issues relayed requests through the shared client.
pub struct RelayExecutor {
    client: SharedProxyClient,
    transformer: ClientHeaderTransformer,
    gzip: GzipPolicy,
    open_streams: Arc<AtomicUsize>,
}

impl RelayExecutor {
    pub fn new(client: SharedProxyClient, config: &RelayConfig) -> Self {
        let user_agent = HeaderValue::from_str(&config.user_agent).unwrap_or_else(|_| {
            tracing::warn!(user_agent = %config.user_agent, "Invalid user agent, using default");
            HeaderValue::from_static(DEFAULT_USER_AGENT)
        });

        Self {
            client,
            transformer: ClientHeaderTransformer::new(user_agent),
            gzip: GzipPolicy {
                enabled: config.buffered_gzip,
                min_size: config.gzip_min_size,
            },
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn client(&self) -> &SharedProxyClient {
        &self.client
    }

    /// Number of streamed upstream bodies not yet released.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Relay `request` to `target`, streaming the body back.
    pub async fn proxy_stream(&self, request: Request<Body>, target: &str) -> Result<Response, ProxyError> {
        self.proxy(RelayMode::Streaming, request, target).await
    }

    /// Relay `request` to `target`, buffering the body before returning it.
    pub async fn proxy_buffered(&self, request: Request<Body>, target: &str) -> Result<Response, ProxyError> {
        self.proxy(RelayMode::Buffered, request, target).await
    }

    /// Full relay of one inbound request in the given mode.
    pub async fn proxy(
        &self,
        mode: RelayMode,
        request: Request<Body>,
        target: &str,
    ) -> Result<Response, ProxyError> {
        let start = Instant::now();
        let result = self.proxy_inner(mode, request, target).await;

        match &result {
            Ok(response) => metrics::record_relay(mode.as_str(), response.status().as_u16(), start),
            Err(e) => match e.kind() {
                Some(kind) => metrics::record_relay_error(kind.as_str()),
                None => metrics::record_invalid_target(),
            },
        }
        result
    }

    async fn proxy_inner(
        &self,
        mode: RelayMode,
        request: Request<Body>,
        target: &str,
    ) -> Result<Response, ProxyError> {
        if !target::is_valid_target(target) {
            tracing::error!(target_url = %target, "Invalid URL");
            return Err(ProxyError::invalid_target(target));
        }

        let normalized = NormalizedTarget::parse(target::normalize(
            target::inbound_query(request.uri()).as_deref(),
            target,
        ))?;

        let (parts, body) = request.into_parts();
        let (outbound, directive) = self.transformer.build_outbound(&parts.headers, normalized.url());
        let body = carries_body(&parts.method).then_some(body);
        let accepts_gzip = accepts_gzip(&parts.headers);

        tracing::debug!(
            method = %parts.method,
            target_url = %normalized.as_str(),
            mode = %mode,
            require_close = directive.require_close,
            synthesized = ?outbound.synthesized(),
            "Relaying request"
        );

        let upstream = self.relay(parts.method, &normalized, outbound, body, mode).await?;
        Ok(self.respond(upstream, directive, accepts_gzip))
    }

    /// Send one outbound request through the shared client.
    ///
    /// Clears the shared cookie jar first. `body` is forwarded unmodified when
    /// present.
    pub async fn relay(
        &self,
        method: Method,
        target: &NormalizedTarget,
        outbound: ProxyHeaderSet,
        body: Option<Body>,
        mode: RelayMode,
    ) -> Result<UpstreamResponse, ProxyError> {
        let normalized_url = target.as_str();
        let mut headers = outbound.into_headers();
        // The client derives Host from the URL on every hop, redirects included.
        headers.remove(HOST);

        // Framing headers must not announce a body that is not sent.
        if body.is_none() {
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
        }

        let mut request = reqwest::Request::new(method, target.url().clone());
        *request.headers_mut() = headers;
        if let Some(body) = body {
            *request.body_mut() = Some(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        self.client.cookies().clear();

        let deadline = self.client.timeout();
        let response = match time::timeout(deadline, self.client.http().execute(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err = ProxyError::relay(normalized_url, &e);
                tracing::error!(target_url = %normalized_url, kind = ?err.kind(), error = %e, "Upstream request failed");
                return Err(err);
            }
            Err(_) => {
                tracing::error!(target_url = %normalized_url, timeout = ?deadline, "Upstream request timed out");
                return Err(ProxyError::timeout(normalized_url, deadline));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        if response.url() != target.url() {
            tracing::debug!(target_url = %normalized_url, final_url = %response.url(), "Followed redirects");
        }

        let body = match mode {
            RelayMode::Streaming => {
                UpstreamBody::Stream(UpstreamStream::new(response, self.open_streams.clone(), normalized_url))
            }
            RelayMode::Buffered => match time::timeout(deadline, response.bytes()).await {
                Ok(Ok(bytes)) => UpstreamBody::Buffered(bytes),
                Ok(Err(e)) => {
                    tracing::error!(target_url = %normalized_url, error = %e, "Failed to read upstream body");
                    return Err(ProxyError::relay(normalized_url, &e));
                }
                Err(_) => {
                    tracing::error!(target_url = %normalized_url, timeout = ?deadline, "Upstream body read timed out");
                    return Err(ProxyError::timeout(normalized_url, deadline));
                }
            },
        };

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    /// Follow redirects from `url` with a HEAD request and return the final URL.
    pub async fn resolve_redirect(&self, url: &str) -> Result<String, ProxyError> {
        if !target::is_valid_target(url) {
            return Err(ProxyError::invalid_target(url));
        }

        self.client.cookies().clear();
        let deadline = self.client.timeout();
        match time::timeout(deadline, self.client.http().head(url).send()).await {
            Ok(Ok(response)) => Ok(response.url().to_string()),
            Ok(Err(e)) => Err(ProxyError::relay(url, &e)),
            Err(_) => Err(ProxyError::timeout(url, deadline)),
        }
    }

    fn respond(&self, upstream: UpstreamResponse, directive: ConnectionDirective, accepts_gzip: bool) -> Response {
        let mut headers = build_return(upstream.headers, directive).into_headers();

        let body = match upstream.body {
            UpstreamBody::Stream(stream) => Body::from_stream(stream),
            UpstreamBody::Buffered(bytes) => Body::from(self.recompress(bytes, &mut headers, accepts_gzip)),
        };

        let mut response = Response::new(body);
        *response.status_mut() = upstream.status;
        *response.headers_mut() = headers;
        response
    }

    /// Gzip a buffered body when the policy, the client and the upstream all allow it.
    fn recompress(&self, bytes: Bytes, headers: &mut HeaderMap, accepts_gzip: bool) -> Bytes {
        let eligible = self.gzip.enabled
            && accepts_gzip
            && !headers.contains_key(CONTENT_ENCODING)
            && bytes.len() >= self.gzip.min_size;
        if !eligible {
            return bytes;
        }

        match gzip(&bytes) {
            Ok(compressed) => {
                headers.remove(TRANSFER_ENCODING);
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                headers.insert(CONTENT_LENGTH, HeaderValue::from(compressed.len()));
                headers.append(VARY, HeaderValue::from_static("accept-encoding"));
                Bytes::from(compressed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Gzip recompression failed, returning raw body");
                bytes
            }
        }
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// True if the client's `Accept-Encoding` allows gzip (`q=0` excludes it).
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|entry| {
            let mut params = entry.split(';').map(str::trim);
            let coding = params.next().unwrap_or_default();
            let rejected = params.any(|p| {
                p.strip_prefix("q=")
                    .and_then(|q| q.parse::<f32>().ok())
                    .map(|q| q == 0.0)
                    .unwrap_or(false)
            });
            (coding.eq_ignore_ascii_case("gzip") || coding == "*") && !rejected
        })
}
