use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::{RequestLoggingError, Result};
use crate::utils::{get_env_with_prefix, split_list};

/// Capture policy for request logging
///
/// Describes which parts of an exchange are recorded and how large body
/// snippets may grow. Settings that differ between the two halves of an
/// exchange live in [`LogPolicy::request`] and [`LogPolicy::response`]. A
/// policy is validated once when a logger is built and is read-only afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogPolicy {
    /// Whether request logging is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// When non-empty, only these headers are captured
    #[serde(default)]
    pub header_allow_list: BTreeSet<String>,

    /// Headers that are never captured
    #[serde(default = "default_header_deny_list")]
    pub header_deny_list: BTreeSet<String>,

    /// Include the (masked) query string
    #[serde(default = "default_true")]
    pub capture_query: bool,

    /// Include the peer address when the server provides `ConnectInfo`
    #[serde(default)]
    pub capture_client_ip: bool,

    /// Include elapsed time
    #[serde(default = "default_true")]
    pub capture_duration: bool,

    /// Upper bound on time spent reading a body prefix
    #[serde(default = "default_body_read_timeout_ms")]
    pub body_read_timeout_ms: u64,

    /// Ant-style path patterns selecting which exchanges are logged
    #[serde(default)]
    pub paths: FilterList,

    /// Response status classes that produce a record
    #[serde(default = "default_status_codes")]
    pub status_codes: Vec<StatusClass>,

    /// Header carrying the correlation id
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,

    /// Log level for informational, successful and redirect responses
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log level for client errors (4xx)
    #[serde(default = "default_client_error_level")]
    pub client_error_level: LogLevel,

    /// Log level for server errors (5xx), handler failures and aborted exchanges
    #[serde(default = "default_server_error_level")]
    pub server_error_level: LogLevel,

    /// Request side: headers, body, query masks
    #[serde(default)]
    pub request: DirectionPolicy,

    /// Response side: headers and body
    #[serde(default)]
    pub response: DirectionPolicy,
}

/// Capture settings for one side of an exchange
///
/// `paths` narrows where this side's headers and body are captured; the
/// exchange itself is still selected by [`LogPolicy::paths`]. Masks on the
/// request side also cover the query string.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectionPolicy {
    /// Include headers
    #[serde(default)]
    pub capture_headers: bool,

    /// Include a body snippet
    #[serde(default)]
    pub capture_body: bool,

    /// Maximum snippet size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Content types eligible for body capture (substring match)
    #[serde(default = "default_body_content_types")]
    pub content_types: FilterList,

    /// Ant-style path patterns where headers and body are captured
    #[serde(default)]
    pub paths: FilterList,

    /// Value masking rules
    #[serde(default)]
    pub masks: Vec<MaskRule>,
}

impl Default for DirectionPolicy {
    fn default() -> Self {
        Self {
            capture_headers: false,
            capture_body: false,
            max_body_bytes: default_max_body_bytes(),
            content_types: default_body_content_types(),
            paths: FilterList::default(),
            masks: Vec::new(),
        }
    }
}

impl DirectionPolicy {
    fn validate(&self, side: &str) -> Result<()> {
        if !self.content_types.allow.is_empty() && !self.content_types.deny.is_empty() {
            return Err(RequestLoggingError::invalid_config(format!(
                "You cannot set a deny list together with an allow list for {} content types",
                side
            )));
        }

        if !self.paths.allow.is_empty() && !self.paths.deny.is_empty() {
            return Err(RequestLoggingError::invalid_config(format!(
                "You cannot set a deny list together with an allow list for {} paths",
                side
            )));
        }

        for mask in &self.masks {
            if mask.path_pattern.trim().is_empty() {
                return Err(RequestLoggingError::invalid_config(format!(
                    "{} mask path pattern cannot be empty",
                    side
                )));
            }
            if let Some(method) = &mask.method {
                if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
                    return Err(RequestLoggingError::invalid_config(format!(
                        "Invalid {} mask method: {}",
                        side, method
                    )));
                }
            }
        }

        Ok(())
    }

    fn load_env(&mut self, side: &str) -> Result<()> {
        let key = |name: &str| format!("{}_{}", side, name);

        if let Some(v) = get_env_with_prefix(&key("CAPTURE_HEADERS")) {
            self.capture_headers = parse_bool(&key("CAPTURE_HEADERS"), &v)?;
        }
        if let Some(v) = get_env_with_prefix(&key("CAPTURE_BODY")) {
            self.capture_body = parse_bool(&key("CAPTURE_BODY"), &v)?;
        }
        if let Some(v) = get_env_with_prefix(&key("MAX_BODY_BYTES")) {
            self.max_body_bytes = parse_size(&key("MAX_BODY_BYTES"), &v)?;
        }
        load_filter_env(&mut self.content_types, &key("CONTENT_TYPE"));
        load_filter_env(&mut self.paths, &key("PATH"));
        Ok(())
    }
}

/// Log level for request logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl FromStr for LogLevel {
    type Err = RequestLoggingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(RequestLoggingError::invalid_config(format!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                other
            ))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Response status class used to select which exchanges are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum StatusClass {
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "1xx")]
    Informational,
    #[serde(rename = "2xx")]
    Success,
    #[serde(rename = "3xx")]
    Redirection,
    #[serde(rename = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    ServerError,
}

impl FromStr for StatusClass {
    type Err = RequestLoggingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(StatusClass::Any),
            "1xx" => Ok(StatusClass::Informational),
            "2xx" => Ok(StatusClass::Success),
            "3xx" => Ok(StatusClass::Redirection),
            "4xx" => Ok(StatusClass::ClientError),
            "5xx" => Ok(StatusClass::ServerError),
            other => Err(RequestLoggingError::invalid_config(format!(
                "Invalid status class: {}. Must be one of: any, 1xx, 2xx, 3xx, 4xx, 5xx",
                other
            ))),
        }
    }
}

/// Allow/deny list pair
///
/// A non-empty allow list admits only matching values. Otherwise every value
/// is admitted unless it matches the deny list. Setting both sides is rejected
/// by [`LogPolicy::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilterList {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl FilterList {
    pub fn allow(items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allow: items.into_iter().map(Into::into).collect(),
            deny: Vec::new(),
        }
    }

    pub fn deny(items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allow: Vec::new(),
            deny: items.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Masking rule applied to exchanges matching a method and path pattern
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MaskRule {
    /// HTTP method the rule applies to; any method when absent
    #[serde(default)]
    pub method: Option<String>,
    /// Ant-style path pattern like `/users/**`, `/users/*` or `/users`
    pub path_pattern: String,
    /// JSON field names whose string values are masked
    #[serde(default)]
    pub json_fields: Vec<String>,
    /// Query and form parameter names whose values are masked
    #[serde(default)]
    pub query_params: Vec<String>,
    /// Header names whose values are masked
    #[serde(default)]
    pub headers: Vec<String>,
}

impl MaskRule {
    pub fn new(path_pattern: impl Into<String>) -> Self {
        Self {
            path_pattern: path_pattern.into(),
            ..Default::default()
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn json_field(mut self, field: impl Into<String>) -> Self {
        self.json_fields.push(field.into());
        self
    }

    pub fn query_param(mut self, param: impl Into<String>) -> Self {
        self.query_params.push(param.into());
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            header_allow_list: BTreeSet::new(),
            header_deny_list: default_header_deny_list(),
            capture_query: true,
            capture_client_ip: false,
            capture_duration: true,
            body_read_timeout_ms: default_body_read_timeout_ms(),
            paths: FilterList::default(),
            status_codes: default_status_codes(),
            request_id_header: default_request_id_header(),
            log_level: default_log_level(),
            client_error_level: default_client_error_level(),
            server_error_level: default_server_error_level(),
            request: DirectionPolicy::default(),
            response: DirectionPolicy::default(),
        }
    }
}

impl LogPolicy {
    /// Create a new LogPolicy builder
    pub fn builder() -> LogPolicyBuilder {
        LogPolicyBuilder::new()
    }

    /// Load the policy from environment variables
    ///
    /// Every key is read as `REQUEST_LOGGING_{KEY}`. Per-side keys carry a
    /// `REQUEST_` or `RESPONSE_` infix, e.g. `REQUEST_LOGGING_RESPONSE_MAX_BODY_BYTES`.
    /// The shared keys `CAPTURE_HEADERS`, `CAPTURE_REQUEST_BODY`,
    /// `CAPTURE_RESPONSE_BODY` and `MAX_BODY_BYTES` are applied first and can be
    /// refined per side. Malformed values are rejected instead of silently
    /// falling back to defaults, so a bad deployment fails at startup.
    pub fn from_env() -> Result<Self> {
        let mut policy = Self::default();

        if let Some(v) = get_env_with_prefix("ENABLED") {
            policy.enabled = parse_bool("ENABLED", &v)?;
        }
        if let Some(v) = get_env_with_prefix("CAPTURE_HEADERS") {
            policy.request.capture_headers = parse_bool("CAPTURE_HEADERS", &v)?;
        }
        if let Some(v) = get_env_with_prefix("CAPTURE_RESPONSE_HEADERS") {
            policy.response.capture_headers = parse_bool("CAPTURE_RESPONSE_HEADERS", &v)?;
        }
        if let Some(v) = get_env_with_prefix("HEADER_ALLOW_LIST") {
            policy.header_allow_list = split_list(&v).into_iter().collect();
        }
        if let Some(v) = get_env_with_prefix("HEADER_DENY_LIST") {
            policy.header_deny_list = split_list(&v).into_iter().collect();
        }
        if let Some(v) = get_env_with_prefix("CAPTURE_QUERY") {
            policy.capture_query = parse_bool("CAPTURE_QUERY", &v)?;
        }
        if let Some(v) = get_env_with_prefix("CAPTURE_CLIENT_IP") {
            policy.capture_client_ip = parse_bool("CAPTURE_CLIENT_IP", &v)?;
        }
        if let Some(v) = get_env_with_prefix("CAPTURE_DURATION") {
            policy.capture_duration = parse_bool("CAPTURE_DURATION", &v)?;
        }
        if let Some(v) = get_env_with_prefix("CAPTURE_REQUEST_BODY") {
            policy.request.capture_body = parse_bool("CAPTURE_REQUEST_BODY", &v)?;
        }
        if let Some(v) = get_env_with_prefix("CAPTURE_RESPONSE_BODY") {
            policy.response.capture_body = parse_bool("CAPTURE_RESPONSE_BODY", &v)?;
        }
        if let Some(v) = get_env_with_prefix("MAX_BODY_BYTES") {
            let cap = parse_size("MAX_BODY_BYTES", &v)?;
            policy.request.max_body_bytes = cap;
            policy.response.max_body_bytes = cap;
        }
        if let Some(v) = get_env_with_prefix("BODY_READ_TIMEOUT_MS") {
            policy.body_read_timeout_ms = v.trim().parse().map_err(|_| {
                RequestLoggingError::invalid_config(format!(
                    "BODY_READ_TIMEOUT_MS must be a non-negative integer, got: {}",
                    v
                ))
            })?;
        }
        load_filter_env(&mut policy.paths, "PATH");
        if let Some(v) = get_env_with_prefix("STATUS_CODES") {
            policy.status_codes = split_list(&v)
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(v) = get_env_with_prefix("REQUEST_ID_HEADER") {
            policy.request_id_header = v;
        }
        if let Some(v) = get_env_with_prefix("LOG_LEVEL") {
            policy.log_level = v.parse()?;
        }
        if let Some(v) = get_env_with_prefix("CLIENT_ERROR_LEVEL") {
            policy.client_error_level = v.parse()?;
        }
        if let Some(v) = get_env_with_prefix("SERVER_ERROR_LEVEL") {
            policy.server_error_level = v.parse()?;
        }

        policy.request.load_env("REQUEST")?;
        policy.response.load_env("RESPONSE")?;

        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy invariants
    ///
    /// # Errors
    ///
    /// Returns [`RequestLoggingError::InvalidConfig`] when:
    /// - a header name appears in both the allow and the deny list
    /// - an allow/deny pair has both sides set
    /// - no status class is configured
    /// - the request id header is not a valid header name
    /// - a mask rule has an empty path pattern or an invalid method
    pub fn validate(&self) -> Result<()> {
        let allowed: BTreeSet<String> = self
            .header_allow_list
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        if let Some(conflict) = self
            .header_deny_list
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .find(|h| allowed.contains(h))
        {
            return Err(RequestLoggingError::invalid_config(format!(
                "Header '{}' cannot be in both the allow list and the deny list",
                conflict
            )));
        }

        if !self.paths.allow.is_empty() && !self.paths.deny.is_empty() {
            return Err(RequestLoggingError::invalid_config(
                "You cannot set a deny list together with an allow list for paths",
            ));
        }

        if self.status_codes.is_empty() {
            return Err(RequestLoggingError::invalid_config(
                "Status codes cannot be empty",
            ));
        }

        if axum::http::HeaderName::from_bytes(self.request_id_header.as_bytes()).is_err() {
            return Err(RequestLoggingError::invalid_config(format!(
                "Invalid request id header name: {}",
                self.request_id_header
            )));
        }

        self.request.validate("request")?;
        self.response.validate("response")?;

        Ok(())
    }
}

/// Read `{key}_ALLOW_LIST` and `{key}_DENY_LIST` into `filter`
///
/// A deny list given without an allow list replaces the default allow list.
fn load_filter_env(filter: &mut FilterList, key: &str) {
    let allow = get_env_with_prefix(&format!("{}_ALLOW_LIST", key));
    let deny = get_env_with_prefix(&format!("{}_DENY_LIST", key));
    if let Some(v) = &deny {
        filter.deny = split_list(v);
        if allow.is_none() {
            filter.allow.clear();
        }
    }
    if let Some(v) = &allow {
        filter.allow = split_list(v);
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        RequestLoggingError::invalid_config(format!(
            "{} must be a non-negative integer, got: {}",
            key, value
        ))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value.trim().parse().map_err(|_| {
        RequestLoggingError::invalid_config(format!(
            "{} must be 'true' or 'false', got: {}",
            key, value
        ))
    })
}

/// Builder for LogPolicy
#[must_use = "builder does nothing until you call build()"]
pub struct LogPolicyBuilder {
    policy: LogPolicy,
}

impl LogPolicyBuilder {
    pub fn new() -> Self {
        Self {
            policy: LogPolicy::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.policy.enabled = enabled;
        self
    }

    /// Capture request headers
    pub fn capture_headers(mut self, capture: bool) -> Self {
        self.policy.request.capture_headers = capture;
        self
    }

    pub fn capture_response_headers(mut self, capture: bool) -> Self {
        self.policy.response.capture_headers = capture;
        self
    }

    pub fn allow_header(mut self, name: impl Into<String>) -> Self {
        self.policy.header_allow_list.insert(name.into());
        self
    }

    pub fn deny_header(mut self, name: impl Into<String>) -> Self {
        self.policy.header_deny_list.insert(name.into());
        self
    }

    /// Replace the deny list, including the built-in sensitive headers
    pub fn header_deny_list(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.policy.header_deny_list = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn capture_query(mut self, capture: bool) -> Self {
        self.policy.capture_query = capture;
        self
    }

    pub fn capture_client_ip(mut self, capture: bool) -> Self {
        self.policy.capture_client_ip = capture;
        self
    }

    pub fn capture_duration(mut self, capture: bool) -> Self {
        self.policy.capture_duration = capture;
        self
    }

    pub fn capture_request_body(mut self, capture: bool) -> Self {
        self.policy.request.capture_body = capture;
        self
    }

    pub fn capture_response_body(mut self, capture: bool) -> Self {
        self.policy.response.capture_body = capture;
        self
    }

    /// Snippet cap for both sides
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.policy.request.max_body_bytes = bytes;
        self.policy.response.max_body_bytes = bytes;
        self
    }

    pub fn body_read_timeout_ms(mut self, millis: u64) -> Self {
        self.policy.body_read_timeout_ms = millis;
        self
    }

    /// Eligible content types for both sides
    pub fn body_content_types(mut self, filter: FilterList) -> Self {
        self.policy.request.content_types = filter.clone();
        self.policy.response.content_types = filter;
        self
    }

    pub fn paths(mut self, filter: FilterList) -> Self {
        self.policy.paths = filter;
        self
    }

    pub fn status_codes(mut self, codes: impl IntoIterator<Item = StatusClass>) -> Self {
        self.policy.status_codes = codes.into_iter().collect();
        self
    }

    /// Mask rule applied to both sides
    pub fn mask(mut self, rule: MaskRule) -> Self {
        self.policy.request.masks.push(rule.clone());
        self.policy.response.masks.push(rule);
        self
    }

    /// Mask rule applied to request headers, query and body only
    pub fn request_mask(mut self, rule: MaskRule) -> Self {
        self.policy.request.masks.push(rule);
        self
    }

    /// Mask rule applied to response headers and body only
    pub fn response_mask(mut self, rule: MaskRule) -> Self {
        self.policy.response.masks.push(rule);
        self
    }

    /// Replace all request side settings
    pub fn request(mut self, side: DirectionPolicy) -> Self {
        self.policy.request = side;
        self
    }

    /// Replace all response side settings
    pub fn response(mut self, side: DirectionPolicy) -> Self {
        self.policy.response = side;
        self
    }

    pub fn request_id_header(mut self, name: impl Into<String>) -> Self {
        self.policy.request_id_header = name.into();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.policy.log_level = level;
        self
    }

    pub fn client_error_level(mut self, level: LogLevel) -> Self {
        self.policy.client_error_level = level;
        self
    }

    pub fn server_error_level(mut self, level: LogLevel) -> Self {
        self.policy.server_error_level = level;
        self
    }

    /// Build the policy, validating all settings
    pub fn build(self) -> Result<LogPolicy> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

impl Default for LogPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_true() -> bool {
    true
}

fn default_header_deny_list() -> BTreeSet<String> {
    ["authorization", "cookie", "set-cookie", "proxy-authorization"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_max_body_bytes() -> usize {
    4096
}

fn default_body_read_timeout_ms() -> u64 {
    1000
}

fn default_body_content_types() -> FilterList {
    FilterList::allow([
        "application/json",
        "application/x-www-form-urlencoded",
        "text/plain",
        "text/xml",
        "application/xml",
    ])
}

fn default_status_codes() -> Vec<StatusClass> {
    vec![StatusClass::Any]
}

fn default_request_id_header() -> String {
    "x-request-id".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_client_error_level() -> LogLevel {
    LogLevel::Warn
}

fn default_server_error_level() -> LogLevel {
    LogLevel::Error
}
