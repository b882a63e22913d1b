//! Alba-style scenarios for exercising the logging layer
//!
//! A scenario wraps an Axum router in a [`RequestLoggingLayer`] backed by a
//! [`MemorySink`], sends one request through it without starting a server,
//! and exposes both the response and the emitted records for assertions.

use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceExt;

use super::MemorySink;
use crate::interceptor::{ExchangeLogger, RequestLoggingLayer};
use crate::policy::LogPolicy;
use crate::record::ExchangeRecord;

/// Test scenario builder: one request through a logged router
pub struct Scenario {
    app: Router,
    policy: LogPolicy,
    request: Request<Body>,
}

impl Scenario {
    /// Create a new scenario for `app` using the default policy
    #[track_caller]
    pub fn new(app: Router) -> Self {
        Self {
            app,
            policy: LogPolicy::default(),
            request: Request::builder()
                .method(Method::GET)
                .uri("/")
                .body(Body::empty())
                .expect("default scenario request is valid"),
        }
    }

    /// Use this capture policy
    pub fn with_policy(mut self, policy: LogPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        *self.request.method_mut() = method;
        self
    }

    /// Set the URI/path, including any query string
    #[track_caller]
    pub fn uri(mut self, uri: &str) -> Self {
        *self.request.uri_mut() = uri
            .parse()
            .unwrap_or_else(|e| panic!("Invalid scenario URI '{}': {}", uri, e));
        self
    }

    /// Add a header
    #[track_caller]
    pub fn header(mut self, key: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(key.as_bytes())
            .unwrap_or_else(|e| panic!("Invalid header name '{}': {}", key, e));
        let value = value
            .parse()
            .unwrap_or_else(|e| panic!("Invalid value for header '{}': {}", key, e));
        self.request.headers_mut().append(name, value);
        self
    }

    /// Set JSON body from a serializable type
    #[track_caller]
    pub fn json_body<T: Serialize>(mut self, body: &T) -> Self {
        let json = serde_json::to_string(body).expect("scenario body serializes to JSON");
        *self.request.body_mut() = Body::from(json);
        self.request
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    /// Set plain text body
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        *self.request.body_mut() = Body::from(body.into());
        self.request
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        self
    }

    /// Set a raw body without touching the content type
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        *self.request.body_mut() = body.into();
        self
    }

    /// Execute the request and get an assertion builder
    pub async fn execute(self) -> ScenarioAssert {
        let sink = Arc::new(MemorySink::new());
        let logger = ExchangeLogger::with_shared_sink(self.policy, sink.clone())
            .unwrap_or_else(|e| panic!("Scenario policy is invalid: {}", e));
        let app = self.app.layer(RequestLoggingLayer::new(logger));
        let response = match app.oneshot(self.request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        ScenarioAssert { response, sink }
    }
}

/// Assertion builder for the response and the emitted records
pub struct ScenarioAssert {
    response: Response,
    sink: Arc<MemorySink>,
}

impl ScenarioAssert {
    /// Assert the response status code
    #[track_caller]
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    /// Assert status is 200 OK
    #[track_caller]
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    /// Assert status is 500 Internal Server Error
    #[track_caller]
    pub fn assert_server_error(self) -> Self {
        self.assert_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Assert a header exists with the given value
    #[track_caller]
    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .response
            .headers()
            .get(key)
            .unwrap_or_else(|| panic!("Header '{}' not found", key))
            .to_str()
            .unwrap_or_else(|_| panic!("Header '{}' is not valid text", key));
        assert_eq!(value, expected, "Header '{}' value mismatch", key);
        self
    }

    /// Assert how many records were emitted
    #[track_caller]
    pub fn assert_records(self, expected: usize) -> Self {
        assert_eq!(
            self.sink.len(),
            expected,
            "Expected {} records, got {:?}",
            expected,
            self.sink.records()
        );
        self
    }

    /// All records emitted for this scenario
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.sink.records()
    }

    /// The only record emitted; panics unless exactly one was emitted
    #[track_caller]
    pub fn single_record(&self) -> ExchangeRecord {
        let mut records = self.sink.records();
        assert_eq!(records.len(), 1, "Expected exactly one record, got {:?}", records);
        records.remove(0)
    }

    /// Get the response body as bytes
    pub async fn body_bytes(self) -> Vec<u8> {
        axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|e| panic!("Failed to read response body: {}", e))
            .to_vec()
    }

    /// Get the response body as a string
    pub async fn body_string(self) -> String {
        String::from_utf8(self.body_bytes().await).expect("response body is valid UTF-8")
    }

    /// Get the underlying response for custom assertions
    pub fn response(self) -> Response {
        self.response
    }
}

/// Convenience function to create a GET request scenario
pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::GET).uri(uri)
}

/// Convenience function to create a POST request scenario
pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::POST).uri(uri)
}

/// Convenience function to create a PUT request scenario
pub fn put(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::PUT).uri(uri)
}

/// Convenience function to create a DELETE request scenario
pub fn delete(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::DELETE).uri(uri)
}

/// Convenience function to create a PATCH request scenario
pub fn patch(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::PATCH).uri(uri)
}
