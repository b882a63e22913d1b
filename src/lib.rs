//! request-logging - structured HTTP request/response logging for Axum and Tower
//!
//! Wraps every inbound exchange, captures what the [`LogPolicy`] asks for
//! (method, path, query, headers, body snippets, status, duration) and emits
//! exactly one [`ExchangeRecord`] per exchange to a [`LogSink`].
//!
//! # Features
//!
//! - **Capture policy**: header allow/deny lists, size-capped body snippets, path
//!   and status filters
//! - **Masking**: hide header values, query/form parameters and JSON fields
//! - **Correlation ids**: propagated from `x-request-id` or generated
//! - **Failure-proof**: handler errors, panics and aborted requests still produce
//!   a record; capture and sink failures never fail the request
//! - **Testing**: in-memory sink and Alba-style scenarios
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use request_logging::{LogPolicy, TracingSink, build_request_logging_layer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     request_logging::init_tracing();
//!
//!     let policy = LogPolicy::from_env()?;
//!     let mut app = Router::new().route("/health", get(|| async { "ok" }));
//!     if let Some(layer) = build_request_logging_layer(&policy, TracingSink::new())? {
//!         app = app.layer(layer);
//!     }
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

mod error;
pub mod interceptor;
pub mod policy;
pub mod record;
pub mod sink;
pub mod testing;
pub mod utils;

// Re-exports for public API
pub use error::{RequestLoggingError, Result, SinkError};
pub use interceptor::{
    CorrelationId, ExchangeLogger, PendingExchange, RequestLoggingLayer, RequestLoggingService,
    build_request_logging_layer,
};
pub use policy::{
    DirectionPolicy, FilterList, LogLevel, LogPolicy, LogPolicyBuilder, MaskRule, Side,
    StatusClass,
};
pub use record::{BodyCapture, ExchangeOutcome, ExchangeRecord};
pub use sink::{JsonLinesSink, LogSink, TracingSink};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main()
/// before building the logging layer.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "request_logging=debug")
/// - `REQUEST_LOGGING_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
