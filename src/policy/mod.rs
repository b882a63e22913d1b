//! Capture policy: what an exchange record contains.
//!
//! [`LogPolicy`] is the user-facing configuration. [`CompiledPolicy`] is the
//! validated, pre-processed form the interceptor reads on every request.

mod config;
mod mask;
mod matcher;

pub use config::{
    DirectionPolicy, FilterList, LogLevel, LogPolicy, LogPolicyBuilder, MaskRule, StatusClass,
};
pub use mask::{ActiveMasks, MASK, Masker};
pub use matcher::path_matches;

use axum::http::{HeaderName, StatusCode};
use std::collections::HashSet;
use std::time::Duration;

use crate::error::{RequestLoggingError, Result};

/// One half of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Request,
    Response,
}

/// Validated policy with lookups prepared for the request path
#[derive(Debug)]
pub struct CompiledPolicy {
    policy: LogPolicy,
    request_masker: Masker,
    response_masker: Masker,
    header_allow: HashSet<String>,
    header_deny: HashSet<String>,
    request_id_header: HeaderName,
}

impl CompiledPolicy {
    pub fn compile(policy: LogPolicy) -> Result<Self> {
        policy.validate()?;

        let request_masker = Masker::compile(&policy.request.masks)?;
        let response_masker = Masker::compile(&policy.response.masks)?;
        let header_allow = policy
            .header_allow_list
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        let header_deny = policy
            .header_deny_list
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        let request_id_header = HeaderName::from_bytes(policy.request_id_header.as_bytes())
            .map_err(|e| {
                RequestLoggingError::invalid_config(format!(
                    "Invalid request id header name: {}",
                    e
                ))
            })?;

        Ok(Self {
            policy,
            request_masker,
            response_masker,
            header_allow,
            header_deny,
            request_id_header,
        })
    }

    pub fn policy(&self) -> &LogPolicy {
        &self.policy
    }

    pub fn side(&self, side: Side) -> &DirectionPolicy {
        match side {
            Side::Request => &self.policy.request,
            Side::Response => &self.policy.response,
        }
    }

    pub fn masker(&self, side: Side) -> &Masker {
        match side {
            Side::Request => &self.request_masker,
            Side::Response => &self.response_masker,
        }
    }

    pub fn request_id_header(&self) -> &HeaderName {
        &self.request_id_header
    }

    pub fn body_read_timeout(&self) -> Duration {
        Duration::from_millis(self.policy.body_read_timeout_ms)
    }

    /// Whether a header may appear in a record; deny always wins
    pub fn header_permitted(&self, name: &str) -> bool {
        if self.header_deny.contains(name) {
            return false;
        }
        self.header_allow.is_empty() || self.header_allow.contains(name)
    }

    /// Whether the exchange at `path` is logged at all
    pub fn path_selected(&self, path: &str) -> bool {
        self.policy.paths.permits_path(path)
    }

    /// Whether headers of `side` are captured at `path`
    pub fn headers_selected(&self, side: Side, path: &str) -> bool {
        let side = self.side(side);
        side.capture_headers && side.paths.permits_path(path)
    }

    /// Whether a body of `side` with `content_type` is captured at `path`
    pub fn body_eligible(&self, side: Side, path: &str, content_type: Option<&str>) -> bool {
        let side = self.side(side);
        side.capture_body
            && side.paths.permits_path(path)
            && side.content_types.permits_content_type(content_type)
    }

    /// Whether an exchange that ended with `status` produces a record
    pub fn status_selected(&self, status: StatusCode) -> bool {
        self.policy.status_codes.iter().any(|c| c.matches(status))
    }

    /// Log level for an exchange that ended with `status`
    pub fn level_for(&self, status: StatusCode) -> LogLevel {
        if status.is_server_error() {
            self.policy.server_error_level
        } else if status.is_client_error() {
            self.policy.client_error_level
        } else {
            self.policy.log_level
        }
    }
}
