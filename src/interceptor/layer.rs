use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    response::Response,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tower::Service;

use super::{ExchangeLogger, content_type, read_body_prefix};
use crate::error::Result;
use crate::policy::{LogPolicy, Side};
use crate::sink::LogSink;

/// Correlation id of the current exchange, available to handlers as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Build a Tower layer for request/response logging
///
/// Returns `Ok(None)` when the policy is disabled and an error when the
/// policy is invalid, so misconfiguration surfaces at startup.
pub fn build_request_logging_layer(
    policy: &LogPolicy,
    sink: impl LogSink,
) -> Result<Option<RequestLoggingLayer>> {
    if !policy.enabled {
        return Ok(None);
    }

    let logger = ExchangeLogger::with_shared_sink(policy.clone(), Arc::new(sink))?;
    Ok(Some(RequestLoggingLayer::new(logger)))
}

/// Tower layer for request/response logging
#[derive(Debug, Clone)]
pub struct RequestLoggingLayer {
    logger: ExchangeLogger,
}

impl RequestLoggingLayer {
    pub fn new(logger: ExchangeLogger) -> Self {
        Self { logger }
    }
}

impl<S> tower::Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Tower service for request/response logging
#[derive(Debug, Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
    logger: ExchangeLogger,
}

impl<S> Service<Request> for RequestLoggingService<S>
where
    S: Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Display + Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let (mut parts, body) = req.into_parts();

        let Some(mut exchange) = self.logger.begin(&parts) else {
            return Box::pin(self.inner.call(Request::from_parts(parts, body)));
        };

        let correlation_id = exchange.correlation_id().to_string();
        parts
            .extensions
            .insert(CorrelationId(correlation_id.clone()));
        let request_id_header = self.logger.policy().request_id_header().clone();

        // The ready service must handle this request; leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let request_content_type = content_type(&parts.headers).map(str::to_string);
            let body = if exchange.wants_request_body(request_content_type.as_deref()) {
                let (body, prefix) = read_body_prefix(
                    body,
                    exchange.max_body_bytes(Side::Request),
                    exchange.body_read_timeout(),
                )
                .await;
                exchange.record_request_body(prefix, request_content_type.as_deref());
                body
            } else {
                body
            };

            let req = Request::from_parts(parts, body);
            let result = AssertUnwindSafe(async move { inner.call(req).await })
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(response)) => {
                    let (mut parts, body) = response.into_parts();
                    if !parts.headers.contains_key(&request_id_header) {
                        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                            parts.headers.insert(request_id_header, value);
                        }
                    }

                    let (body, prefix) = if exchange.wants_response_body(content_type(&parts.headers)) {
                        let (body, prefix) = read_body_prefix(
                            body,
                            exchange.max_body_bytes(Side::Response),
                            exchange.body_read_timeout(),
                        )
                        .await;
                        (body, Some(prefix))
                    } else {
                        (body, None)
                    };

                    exchange.complete(&parts, prefix);
                    Ok(Response::from_parts(parts, body))
                }
                Ok(Err(e)) => {
                    exchange.fail(e.to_string());
                    Err(e)
                }
                Err(panic) => {
                    exchange.panicked(panic_message(panic.as_ref()));
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
