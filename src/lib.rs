//! HTTP relay service.
//!
//! Fetches arbitrary `http://` / `https://` targets on behalf of clients,
//! either buffering the body (`/proxy`) or streaming it (`/file`).

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::{ProxyError, RelayExecutor, RelayMode, SharedProxyClient};
