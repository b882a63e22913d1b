//! Test fixtures for sink implementations

use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::policy::LogLevel;
use crate::record::{BodyCapture, ExchangeOutcome, ExchangeRecord};

/// A completed `GET /health` exchange with a fresh correlation id
pub fn sample_record() -> ExchangeRecord {
    ExchangeRecord {
        correlation_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        method: "GET".to_string(),
        path: "/health".to_string(),
        query: None,
        client_ip: None,
        status: Some(200),
        duration_ms: Some(1),
        request_content_type: None,
        request_content_length: None,
        response_content_type: None,
        response_content_length: None,
        request_headers: BTreeMap::new(),
        response_headers: BTreeMap::new(),
        request_body: BodyCapture::NotCaptured,
        response_body: BodyCapture::NotCaptured,
        outcome: ExchangeOutcome::Completed,
        level: LogLevel::Info,
    }
}
