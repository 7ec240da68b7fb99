//! Access logging middleware.
//!
//! Every response gets an `X-Process-Time` header (seconds, as a float).
//! Responses that are not excluded by configuration are handed to an
//! [`AccessLogSink`]; where entries end up is the sink's business.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::AccessLogConfig;
use crate::http::request::{client_ip, request_id};

pub const X_PROCESS_TIME: &str = "x-process-time";

/// One served request.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessLogEntry {
    pub ip: String,
    pub url: String,
    pub status: u16,
    pub elapsed: Duration,
    pub request_id: Option<String>,
}

/// Destination for access log entries.
pub trait AccessLogSink: Send + Sync {
    fn record(&self, entry: AccessLogEntry);
}

/// Writes entries as structured tracing events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AccessLogSink for TracingSink {
    fn record(&self, entry: AccessLogEntry) {
        tracing::info!(
            target: "webrelay::access",
            ip = %entry.ip,
            url = %entry.url,
            status = entry.status,
            elapsed_ms = entry.elapsed.as_millis() as u64,
            request_id = entry.request_id.as_deref().unwrap_or("-"),
            "access"
        );
    }
}

/// Middleware state: exclusion rules plus the sink.
#[derive(Clone)]
pub struct AccessLog {
    config: Arc<AccessLogConfig>,
    sink: Arc<dyn AccessLogSink>,
}

impl AccessLog {
    pub fn new(config: AccessLogConfig, sink: Arc<dyn AccessLogSink>) -> Self {
        Self {
            config: Arc::new(config),
            sink,
        }
    }

    pub fn should_record(&self, path: &str, ip: &str, status: StatusCode) -> bool {
        self.config.enabled
            && !(self.config.skip_not_found && status == StatusCode::NOT_FOUND)
            && !self.config.skip_paths.iter().any(|p| p == path)
            && !self.config.skip_ips.iter().any(|i| i == ip)
    }
}

pub async fn access_log_middleware(
    State(log): State<AccessLog>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let path = request.uri().path().to_string();
    let url = request.uri().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    let id = request_id(request.headers()).map(str::to_string);

    let mut response = next.run(request).await;

    let elapsed = start.elapsed();
    if let Ok(value) = HeaderValue::from_str(&elapsed.as_secs_f64().to_string()) {
        response.headers_mut().insert(X_PROCESS_TIME, value);
    }

    let status = response.status();
    if log.should_record(&path, &ip, status) {
        log.sink.record(AccessLogEntry {
            ip,
            url,
            status: status.as_u16(),
            elapsed,
            request_id: id,
        });
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_log(config: AccessLogConfig) -> AccessLog {
        AccessLog::new(config, Arc::new(TracingSink))
    }

    #[test]
    fn test_default_exclusions() {
        let log = access_log(AccessLogConfig::default());
        assert!(log.should_record("/proxy", "1.2.3.4", StatusCode::OK));
        assert!(log.should_record("/file", "1.2.3.4", StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!log.should_record("/ping", "1.2.3.4", StatusCode::OK));
        assert!(!log.should_record("/favicon.ico", "1.2.3.4", StatusCode::OK));
        assert!(!log.should_record("/proxy", "1.2.3.4", StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_ip_exclusion_and_disable() {
        let log = access_log(AccessLogConfig {
            skip_ips: vec!["10.0.0.9".to_string()],
            ..AccessLogConfig::default()
        });
        assert!(!log.should_record("/proxy", "10.0.0.9", StatusCode::OK));
        assert!(log.should_record("/proxy", "10.0.0.8", StatusCode::OK));

        let log = access_log(AccessLogConfig {
            enabled: false,
            ..AccessLogConfig::default()
        });
        assert!(!log.should_record("/proxy", "10.0.0.8", StatusCode::OK));
    }
}
