//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, timeout, access log, CORS)
//! - Resolve the target from the path or the `url` query parameter
//! - Dispatch to the relay executor in buffered (`/proxy`) or streaming (`/file`) mode
//!
//! # Routes
//! ```text
//! GET        /                 service description
//! GET        /ping, /ping/     "pong"
//! GET|POST   /proxy?url=<t>    buffered relay      (also /proxy/?url=, /proxy/<t>)
//! GET|POST   /file?url=<t>     streaming relay     (also /file/?url=,  /file/<t>)
//! GET        /resolve?url=<t>  final URL after redirects
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Uri},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::access_log::{access_log_middleware, AccessLog, AccessLogSink, TracingSink};
use crate::http::request::UuidRequestId;
use crate::lifecycle::ShutdownSignal;
use crate::relay::{target, ProxyError, RelayExecutor, SharedProxyClient};

/// Path prefix of the buffered relay.
pub const PROXY_PREFIX: &str = "/proxy";
/// Path prefix of the streaming relay.
pub const FILE_PREFIX: &str = "/file";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<RelayExecutor>,
    pub config: Arc<ProxyConfig>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
    executor: Arc<RelayExecutor>,
}

impl HttpServer {
    /// Create a server around an already-built shared client.
    pub fn new(config: ProxyConfig, client: SharedProxyClient) -> Self {
        Self::with_access_log_sink(config, client, Arc::new(TracingSink))
    }

    /// Create a server whose access log entries go to `sink`.
    pub fn with_access_log_sink(
        config: ProxyConfig,
        client: SharedProxyClient,
        sink: Arc<dyn AccessLogSink>,
    ) -> Self {
        let executor = Arc::new(RelayExecutor::new(client, &config.relay));
        let config = Arc::new(config);

        let state = AppState {
            executor: executor.clone(),
            config: config.clone(),
        };
        let access_log = AccessLog::new(config.access_log.clone(), sink);

        let router = Self::build_router(&config, state, access_log);
        Self {
            router,
            config,
            executor,
        }
    }

    /// Build the shared client from `config.relay` and create the server.
    pub fn from_config(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = SharedProxyClient::new(&config.relay)?;
        Ok(Self::new(config, client))
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState, access_log: AccessLog) -> Router {
        let router = Router::new()
            .route("/", get(index))
            .route("/ping", get(ping))
            .route("/ping/", get(ping))
            .route("/proxy", get(web_proxy).post(web_proxy))
            .route("/proxy/", get(web_proxy).post(web_proxy))
            .route("/proxy/{*url}", get(web_proxy).post(web_proxy))
            .route("/file", get(file_proxy).post(file_proxy))
            .route("/file/", get(file_proxy).post(file_proxy))
            .route("/file/{*url}", get(file_proxy).post(file_proxy))
            .route("/resolve", get(resolve))
            .with_state(state)
            .layer(middleware::from_fn_with_state(access_log, access_log_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId));

        if config.cors.enabled {
            router.layer(CorsLayer::very_permissive())
        } else {
            router
        }
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn executor(&self) -> Arc<RelayExecutor> {
        self.executor.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Target for a relay route: the path suffix after `prefix`, else the `url` query parameter.
///
/// A missing target resolves to the empty string, which fails validation.
pub fn resolve_target(uri: &Uri, prefix: &str) -> String {
    target::path_target(uri, prefix)
        .or_else(|| target::query_target(uri))
        .unwrap_or_default()
}

async fn index(State(state): State<AppState>) -> String {
    state.config.service.description.clone()
}

async fn ping() -> &'static str {
    "pong"
}

/// Buffered relay for ordinary web content.
async fn web_proxy(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let target = resolve_target(request.uri(), PROXY_PREFIX);
    state.executor.proxy_buffered(request, &target).await
}

/// Streaming relay for large files.
async fn file_proxy(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let target = resolve_target(request.uri(), FILE_PREFIX);
    state.executor.proxy_stream(request, &target).await
}

async fn resolve(State(state): State<AppState>, uri: Uri) -> Result<String, ProxyError> {
    let target = target::query_target(&uri).unwrap_or_default();
    state.executor.resolve_redirect(&target).await
}
