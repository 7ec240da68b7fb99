//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routes, middleware stack)
//!     → request.rs (request ID, client IP)
//!     → access_log.rs (timing header, access log entry)
//!     → relay executor (buffered or streaming)
//!     → Send to client
//! ```

pub mod access_log;
pub mod request;
pub mod server;

pub use access_log::{AccessLog, AccessLogEntry, AccessLogSink, TracingSink};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
