//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::relay::headers::DEFAULT_USER_AGENT;

/// Root configuration for the relay service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream client and relay behaviour.
    pub relay: RelayConfig,

    /// Timeout configuration for inbound handling.
    pub timeouts: TimeoutConfig,

    /// Access log settings.
    pub access_log: AccessLogConfig,

    /// Cross-origin settings.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Service metadata.
    pub service: ServiceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Upstream client configuration shared by every relayed request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Deadline for the upstream send (and the buffered body read) in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Idle keep-alive connections kept per upstream host.
    pub pool_max_idle_per_host: usize,

    /// Skip upstream certificate verification.
    pub accept_invalid_certs: bool,

    /// Maximum redirects followed before giving up.
    pub max_redirects: usize,

    /// User-Agent sent upstream in place of the client's.
    pub user_agent: String,

    /// Gzip buffered bodies for clients that accept it.
    pub buffered_gzip: bool,

    /// Smallest buffered body (bytes) worth compressing.
    pub gzip_min_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_timeout_secs: 5,
            pool_max_idle_per_host: 1000,
            accept_invalid_certs: true,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            buffered_gzip: true,
            gzip_min_size: 200,
        }
    }
}

/// Timeout configuration for inbound request handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce response headers, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Emit access log entries.
    pub enabled: bool,

    /// Request paths that are never logged.
    pub skip_paths: Vec<String>,

    /// Client IPs that are never logged.
    pub skip_ips: Vec<String>,

    /// Do not log 404 responses.
    pub skip_not_found: bool,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_paths: vec![
                "/favicon.ico".to_string(),
                "/ping".to_string(),
                "/ping/".to_string(),
            ],
            skip_ips: Vec::new(),
            skip_not_found: true,
        }
    }
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allow any origin, method and header, with credentials.
    pub enabled: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Service metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Text returned by `GET /`.
    pub description: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            description: "A WebProxy Base on Rust".to_string(),
        }
    }
}
