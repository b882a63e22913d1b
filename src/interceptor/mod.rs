//! The logging interceptor.
//!
//! [`ExchangeLogger::begin`] is the before hook: it opens a
//! [`PendingExchange`] for a request. The pending exchange is the after hook:
//! [`PendingExchange::complete`], [`PendingExchange::fail`] or
//! [`PendingExchange::panicked`] finalize and emit the record. Dropping it
//! unfinished emits an aborted record, so every opened exchange produces
//! exactly one record.
//!
//! [`RequestLoggingLayer`] wires both hooks into a tower stack.

mod body;
mod layer;

pub use body::{BodyPrefix, PrefixState, read_body_prefix};
pub use layer::{
    CorrelationId, RequestLoggingLayer, RequestLoggingService, build_request_logging_layer,
};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, StatusCode, header, request, response};
use chrono::Utc;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::error::Result;
use crate::policy::{ActiveMasks, CompiledPolicy, LogPolicy, Side};
use crate::record::{BodyCapture, ExchangeOutcome, ExchangeRecord};
use crate::sink::{LogSink, emit_or_report};

/// Longest propagated correlation id accepted from a client
const MAX_CORRELATION_ID_LEN: usize = 128;

/// Opens and finalizes exchange records against a policy and a sink
///
/// Cheap to clone; the policy and the sink are shared.
#[derive(Clone)]
pub struct ExchangeLogger {
    policy: Arc<CompiledPolicy>,
    sink: Arc<dyn LogSink>,
}

impl ExchangeLogger {
    /// Validate `policy` and create a logger emitting to `sink`
    pub fn new(policy: LogPolicy, sink: impl LogSink) -> Result<Self> {
        Self::with_shared_sink(policy, Arc::new(sink))
    }

    pub fn with_shared_sink(policy: LogPolicy, sink: Arc<dyn LogSink>) -> Result<Self> {
        Ok(Self {
            policy: Arc::new(CompiledPolicy::compile(policy)?),
            sink,
        })
    }

    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    /// Open an exchange for a request
    ///
    /// Returns `None` when logging is disabled or the path is filtered out.
    pub fn begin(&self, parts: &request::Parts) -> Option<PendingExchange> {
        let policy = self.policy.policy();
        let path = parts.uri.path();
        if !policy.enabled || !self.policy.path_selected(path) {
            return None;
        }

        let masks = self.policy.masker(Side::Request).select(&parts.method, path);

        let correlation_id = parts
            .headers
            .get(self.policy.request_id_header())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_CORRELATION_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let query = if policy.capture_query {
            parts.uri.query().map(|q| masks.mask_query(q))
        } else {
            None
        };

        let client_ip = if policy.capture_client_ip {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        } else {
            None
        };

        let request_headers = if self.policy.headers_selected(Side::Request, path) {
            capture_headers(&parts.headers, &self.policy, &masks)
        } else {
            BTreeMap::new()
        };

        let record = ExchangeRecord {
            correlation_id,
            timestamp: Utc::now(),
            method: parts.method.to_string(),
            path: path.to_string(),
            query,
            client_ip,
            status: None,
            duration_ms: None,
            request_content_type: content_type(&parts.headers).map(str::to_string),
            request_content_length: content_length(&parts.headers),
            response_content_type: None,
            response_content_length: None,
            request_headers,
            response_headers: BTreeMap::new(),
            request_body: BodyCapture::NotCaptured,
            response_body: BodyCapture::NotCaptured,
            outcome: ExchangeOutcome::Aborted,
            level: policy.server_error_level,
        };

        Some(PendingExchange {
            logger: self.clone(),
            method: parts.method.clone(),
            start: Instant::now(),
            record: Some(record),
        })
    }
}

impl std::fmt::Debug for ExchangeLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeLogger")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// An exchange between request start and response completion
///
/// Holds only per-exchange state. Exactly one of the finishing methods
/// consumes it; if none does, dropping it emits an aborted record.
#[derive(Debug)]
pub struct PendingExchange {
    logger: ExchangeLogger,
    method: Method,
    start: Instant,
    record: Option<ExchangeRecord>,
}

impl PendingExchange {
    pub fn correlation_id(&self) -> &str {
        self.record
            .as_ref()
            .map(|r| r.correlation_id.as_str())
            .unwrap_or_default()
    }

    fn path(&self) -> &str {
        self.record.as_ref().map(|r| r.path.as_str()).unwrap_or_default()
    }

    /// Whether a request body with this content type should be captured
    pub fn wants_request_body(&self, content_type: Option<&str>) -> bool {
        self.logger
            .policy
            .body_eligible(Side::Request, self.path(), content_type)
    }

    /// Whether a response body with this content type should be captured
    pub fn wants_response_body(&self, content_type: Option<&str>) -> bool {
        self.logger
            .policy
            .body_eligible(Side::Response, self.path(), content_type)
    }

    /// Byte cap for snippets of `side`
    pub fn max_body_bytes(&self, side: Side) -> usize {
        self.logger.policy.side(side).max_body_bytes
    }

    pub fn body_read_timeout(&self) -> std::time::Duration {
        self.logger.policy.body_read_timeout()
    }

    /// Store the request body snippet
    pub fn record_request_body(&mut self, prefix: BodyPrefix, content_type: Option<&str>) {
        let capture = self.body_capture(Side::Request, prefix, content_type);
        if let Some(record) = self.record.as_mut() {
            record.request_body = capture;
        }
    }

    /// After hook for a produced response; emits the record
    pub fn complete(mut self, parts: &response::Parts, body: Option<BodyPrefix>) {
        let policy = self.logger.policy.clone();

        let response_content_type = content_type(&parts.headers);
        if let Some(prefix) = body {
            let capture = self.body_capture(Side::Response, prefix, response_content_type);
            if let Some(record) = self.record.as_mut() {
                record.response_body = capture;
            }
        }

        if let Some(record) = self.record.as_mut() {
            record.response_content_type = response_content_type.map(str::to_string);
            record.response_content_length = content_length(&parts.headers);
            if policy.headers_selected(Side::Response, &record.path) {
                let masks = policy.masker(Side::Response).select(&self.method, &record.path);
                record.response_headers = capture_headers(&parts.headers, &policy, &masks);
            }
        }

        self.finish(Some(parts.status), ExchangeOutcome::Completed);
    }

    /// After hook for a handler error; records a synthesized 500
    pub fn fail(mut self, message: impl Into<String>) {
        self.finish(
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            ExchangeOutcome::HandlerError {
                message: message.into(),
            },
        );
    }

    /// After hook for a handler panic; records a synthesized 500
    pub fn panicked(mut self, message: impl Into<String>) {
        self.finish(
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            ExchangeOutcome::Panicked {
                message: message.into(),
            },
        );
    }

    fn body_capture(
        &self,
        side: Side,
        prefix: BodyPrefix,
        content_type: Option<&str>,
    ) -> BodyCapture {
        let masks = self.logger.policy.masker(side).select(&self.method, self.path());
        prefix.into_capture(self.max_body_bytes(side), &masks, content_type)
    }

    fn finish(&mut self, status: Option<StatusCode>, outcome: ExchangeOutcome) {
        let Some(mut record) = self.record.take() else {
            return;
        };
        let policy = &self.logger.policy;

        if let Some(status) = status {
            if !policy.status_selected(status) {
                tracing::trace!(
                    correlation_id = %record.correlation_id,
                    status = status.as_u16(),
                    "exchange skipped by status filter"
                );
                return;
            }
            record.status = Some(status.as_u16());
            record.level = policy.level_for(status);
        } else {
            record.level = policy.policy().server_error_level;
        }

        if policy.policy().capture_duration {
            let millis = self.start.elapsed().as_millis();
            record.duration_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        }
        record.outcome = outcome;

        emit_or_report(self.logger.sink.as_ref(), &record);
    }
}

impl Drop for PendingExchange {
    fn drop(&mut self) {
        if self.record.is_some() {
            self.finish(None, ExchangeOutcome::Aborted);
        }
    }
}

/// Content type header as a string, if present and readable
pub(crate) fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn capture_headers(
    headers: &HeaderMap,
    policy: &CompiledPolicy,
    masks: &ActiveMasks<'_>,
) -> BTreeMap<String, String> {
    let mut captured: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let name = name.as_str();
        if !policy.header_permitted(name) {
            continue;
        }
        let value = value.to_str().unwrap_or("<non-ascii>");
        captured
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    masks.mask_headers(&mut captured);
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DirectionPolicy, FilterList, LogLevel, MASK, MaskRule, StatusClass};
    use crate::testing::MemorySink;
    use axum::http::{Request, Response};

    fn request_parts(method: Method, uri: &str, headers: &[(&str, &str)]) -> request::Parts {
        let mut builder = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn response_parts(status: StatusCode, headers: &[(&str, &str)]) -> response::Parts {
        let mut builder = Response::builder().status(status);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn new_logger(policy: LogPolicy) -> (ExchangeLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let logger = ExchangeLogger::with_shared_sink(policy, sink.clone()).unwrap();
        (logger, sink)
    }

    #[test]
    fn test_health_check_without_headers() {
        let (logger, sink) = new_logger(LogPolicy::default());
        let exchange = logger
            .begin(&request_parts(Method::GET, "/health", &[("accept", "*/*")]))
            .unwrap();
        exchange.complete(&response_parts(StatusCode::OK, &[]), None);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/health");
        assert!(record.request_headers.is_empty());
        assert_eq!(record.status, Some(200));
        assert_eq!(record.outcome, ExchangeOutcome::Completed);
        assert_eq!(record.level, LogLevel::Info);
        assert!(record.duration_ms.is_some());
    }

    #[test]
    fn test_correlation_id_propagated_or_generated() {
        let (logger, _) = new_logger(LogPolicy::default());

        let exchange = logger
            .begin(&request_parts(Method::GET, "/", &[("x-request-id", "req-42")]))
            .unwrap();
        assert_eq!(exchange.correlation_id(), "req-42");

        let exchange = logger.begin(&request_parts(Method::GET, "/", &[])).unwrap();
        assert!(Uuid::parse_str(exchange.correlation_id()).is_ok());

        let oversized = "x".repeat(MAX_CORRELATION_ID_LEN + 1);
        let exchange = logger
            .begin(&request_parts(Method::GET, "/", &[("x-request-id", &oversized)]))
            .unwrap();
        assert_ne!(exchange.correlation_id(), oversized);
    }

    #[test]
    fn test_denied_headers_never_captured() {
        let (logger, sink) = new_logger(
            LogPolicy::builder()
                .capture_headers(true)
                .capture_response_headers(true)
                .deny_header("X-Secret")
                .build()
                .unwrap(),
        );
        let exchange = logger
            .begin(&request_parts(
                Method::GET,
                "/",
                &[
                    ("authorization", "Bearer abc"),
                    ("x-secret", "hidden"),
                    ("accept", "text/html"),
                ],
            ))
            .unwrap();
        exchange.complete(
            &response_parts(StatusCode::OK, &[("set-cookie", "id=1"), ("x-served-by", "a")]),
            None,
        );

        let record = &sink.records()[0];
        assert_eq!(record.request_headers.len(), 1);
        assert_eq!(record.request_headers["accept"], "text/html");
        assert!(!record.response_headers.contains_key("set-cookie"));
        assert_eq!(record.response_headers["x-served-by"], "a");
    }

    #[test]
    fn test_multi_valued_headers_are_joined() {
        let (logger, sink) = new_logger(LogPolicy::builder().capture_headers(true).build().unwrap());
        let exchange = logger
            .begin(&request_parts(
                Method::GET,
                "/",
                &[("accept", "text/html"), ("accept", "application/json")],
            ))
            .unwrap();
        exchange.complete(&response_parts(StatusCode::OK, &[]), None);
        assert_eq!(
            sink.records()[0].request_headers["accept"],
            "text/html, application/json"
        );
    }

    #[test]
    fn test_masks_apply_to_query_and_headers() {
        let (logger, sink) = new_logger(
            LogPolicy::builder()
                .capture_headers(true)
                .mask(MaskRule::new("/login").query_param("token").header("x-api-key"))
                .build()
                .unwrap(),
        );
        let exchange = logger
            .begin(&request_parts(
                Method::POST,
                "/login?token=abc&next=home",
                &[("x-api-key", "k")],
            ))
            .unwrap();
        exchange.complete(&response_parts(StatusCode::OK, &[]), None);

        let record = &sink.records()[0];
        assert_eq!(record.query.as_deref(), Some("token=*****&next=home"));
        assert_eq!(record.request_headers["x-api-key"], MASK);
    }

    #[test]
    fn test_handler_error_records_500() {
        let (logger, sink) = new_logger(LogPolicy::default());
        let exchange = logger.begin(&request_parts(Method::GET, "/boom", &[])).unwrap();
        exchange.fail("database unavailable");

        let record = &sink.records()[0];
        assert_eq!(record.status, Some(500));
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(
            record.outcome,
            ExchangeOutcome::HandlerError {
                message: "database unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_dropped_exchange_emits_aborted_record() {
        let (logger, sink) = new_logger(LogPolicy::default());
        let exchange = logger.begin(&request_parts(Method::GET, "/slow", &[])).unwrap();
        drop(exchange);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, None);
        assert_eq!(records[0].outcome, ExchangeOutcome::Aborted);
    }

    #[test]
    fn test_completed_exchange_emits_once() {
        let (logger, sink) = new_logger(LogPolicy::default());
        let exchange = logger.begin(&request_parts(Method::GET, "/", &[])).unwrap();
        exchange.complete(&response_parts(StatusCode::OK, &[]), None);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_disabled_and_filtered_paths_open_nothing() {
        let (logger, _) = new_logger(LogPolicy::builder().enabled(false).build().unwrap());
        assert!(logger.begin(&request_parts(Method::GET, "/", &[])).is_none());

        let (logger, _) = new_logger(
            LogPolicy::builder()
                .paths(FilterList::deny(["/health"]))
                .build()
                .unwrap(),
        );
        assert!(logger.begin(&request_parts(Method::GET, "/health", &[])).is_none());
        assert!(logger.begin(&request_parts(Method::GET, "/api", &[])).is_some());
    }

    #[test]
    fn test_status_filter_skips_emission() {
        let (logger, sink) = new_logger(
            LogPolicy::builder()
                .status_codes([StatusClass::ServerError])
                .build()
                .unwrap(),
        );
        let exchange = logger.begin(&request_parts(Method::GET, "/", &[])).unwrap();
        exchange.complete(&response_parts(StatusCode::OK, &[]), None);
        assert!(sink.is_empty());

        let exchange = logger.begin(&request_parts(Method::GET, "/", &[])).unwrap();
        exchange.complete(&response_parts(StatusCode::BAD_GATEWAY, &[]), None);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_optional_fields_follow_policy() {
        let (logger, sink) = new_logger(
            LogPolicy::builder()
                .capture_query(false)
                .capture_duration(false)
                .build()
                .unwrap(),
        );
        let exchange = logger.begin(&request_parts(Method::GET, "/items?page=2", &[])).unwrap();
        exchange.complete(&response_parts(StatusCode::NOT_FOUND, &[]), None);

        let record = &sink.records()[0];
        assert_eq!(record.query, None);
        assert_eq!(record.duration_ms, None);
        assert_eq!(record.level, LogLevel::Warn);
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let (logger, sink) = new_logger(LogPolicy::builder().capture_client_ip(true).build().unwrap());
        let mut parts = request_parts(Method::GET, "/", &[]);
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));
        logger
            .begin(&parts)
            .unwrap()
            .complete(&response_parts(StatusCode::OK, &[]), None);
        assert_eq!(sink.records()[0].client_ip.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_content_type_and_length_always_recorded() {
        let (logger, sink) = new_logger(LogPolicy::default());
        let exchange = logger
            .begin(&request_parts(
                Method::POST,
                "/items",
                &[("content-type", "application/json"), ("content-length", "17")],
            ))
            .unwrap();
        exchange.complete(
            &response_parts(
                StatusCode::CREATED,
                &[("content-type", "text/plain"), ("content-length", "2")],
            ),
            None,
        );

        let record = &sink.records()[0];
        assert_eq!(record.request_content_type.as_deref(), Some("application/json"));
        assert_eq!(record.request_content_length, Some(17));
        assert_eq!(record.response_content_type.as_deref(), Some("text/plain"));
        assert_eq!(record.response_content_length, Some(2));
        assert!(record.request_headers.is_empty());
    }

    #[test]
    fn test_masks_follow_their_side() {
        let (logger, sink) = new_logger(
            LogPolicy::builder()
                .capture_headers(true)
                .capture_response_headers(true)
                .request_mask(MaskRule::new("/login").header("x-token"))
                .build()
                .unwrap(),
        );
        let exchange = logger
            .begin(&request_parts(Method::POST, "/login", &[("x-token", "in")]))
            .unwrap();
        exchange.complete(&response_parts(StatusCode::OK, &[("x-token", "out")]), None);

        let record = &sink.records()[0];
        assert_eq!(record.request_headers["x-token"], MASK);
        assert_eq!(record.response_headers["x-token"], "out");
    }

    #[test]
    fn test_side_paths_limit_header_capture() {
        let (logger, sink) = new_logger(
            LogPolicy::builder()
                .capture_headers(true)
                .response(DirectionPolicy {
                    capture_headers: true,
                    paths: FilterList::deny(["/assets/**"]),
                    ..Default::default()
                })
                .build()
                .unwrap(),
        );
        let exchange = logger
            .begin(&request_parts(Method::GET, "/assets/app.js", &[("accept", "*/*")]))
            .unwrap();
        exchange.complete(&response_parts(StatusCode::OK, &[("etag", "abc")]), None);

        let record = &sink.records()[0];
        assert_eq!(record.request_headers["accept"], "*/*");
        assert!(record.response_headers.is_empty());
    }
}
