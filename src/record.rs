//! Exchange records: one per logged HTTP exchange.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::policy::LogLevel;

/// Structured record of one request paired with its response
///
/// Built when the request starts, finalized once when the response completes
/// (or the exchange fails or is aborted), handed to the sink and dropped.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord {
    /// Correlation id, propagated from the request or freshly generated
    pub correlation_id: String,
    /// When the request started
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    /// Masked query string, when captured and present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Response status; `None` only when the exchange was aborted before a response
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Request `Content-Type`, always recorded when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_content_type: Option<String>,
    /// Request `Content-Length`, always recorded when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content_length: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, String>,
    pub request_body: BodyCapture,
    pub response_body: BodyCapture,
    pub outcome: ExchangeOutcome,
    /// Level the record should be logged at
    pub level: LogLevel,
}

impl ExchangeRecord {
    /// One-line summary such as `GET /users?page=2 200 12ms`
    pub fn summary(&self) -> String {
        let mut line = format!("{} {}", self.method, self.path);
        if let Some(query) = &self.query {
            line.push('?');
            line.push_str(query);
        }
        match self.status {
            Some(status) => line.push_str(&format!(" {}", status)),
            None => line.push_str(" -"),
        }
        if let Some(ms) = self.duration_ms {
            line.push_str(&format!(" {}ms", ms));
        }
        if !matches!(self.outcome, ExchangeOutcome::Completed) {
            line.push_str(&format!(" ({})", self.outcome.label()));
        }
        line
    }
}

/// Result of trying to capture a body snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BodyCapture {
    /// Capture disabled by policy or content type not eligible
    NotCaptured,
    /// The body had no bytes
    Empty,
    /// A snippet of at most `max_body_bytes` bytes
    Captured {
        snippet: String,
        /// Body length when known; otherwise the bytes read before capture stopped
        size: u64,
        /// The body was larger than the cap
        truncated: bool,
    },
    /// Capture failed; the exchange itself was not affected
    Unavailable { reason: String },
}

impl BodyCapture {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn snippet(&self) -> Option<&str> {
        match self {
            BodyCapture::Captured { snippet, .. } => Some(snippet),
            _ => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, BodyCapture::Captured { truncated: true, .. })
    }
}

/// How an exchange ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// The handler produced a response
    Completed,
    /// The inner service returned an error; status 500 was recorded
    HandlerError { message: String },
    /// The handler panicked; status 500 was recorded
    Panicked { message: String },
    /// The exchange was dropped before completing
    Aborted,
}

impl ExchangeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExchangeOutcome::Completed => "completed",
            ExchangeOutcome::HandlerError { .. } => "handler error",
            ExchangeOutcome::Panicked { .. } => "panicked",
            ExchangeOutcome::Aborted => "aborted",
        }
    }
}
