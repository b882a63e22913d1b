//! Value masking for sensitive headers, parameters and body fields.

use axum::http::Method;
use regex::Regex;
use std::collections::BTreeMap;

use super::config::MaskRule;
use super::matcher::path_matches;
use crate::error::{RequestLoggingError, Result};

/// Replacement written in place of masked values
pub const MASK: &str = "*****";

/// A [`MaskRule`] with its patterns compiled
#[derive(Debug)]
struct CompiledMask {
    method: Option<Method>,
    path_pattern: String,
    json_fields: Vec<Regex>,
    /// String values still open at the end of a cut snippet
    json_open_values: Vec<Regex>,
    query_params: Vec<Regex>,
    headers: Vec<String>,
}

impl CompiledMask {
    fn compile(rule: &MaskRule) -> Result<Self> {
        let method = match &rule.method {
            Some(m) => Some(Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                RequestLoggingError::invalid_config(format!("Invalid mask method: {}", m))
            })?),
            None => None,
        };

        let json_fields = rule
            .json_fields
            .iter()
            .map(|field| {
                compile(format!(
                    r#"("{}"\s*:\s*)"(?:[^"\\]|\\.)*""#,
                    regex::escape(field)
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let json_open_values = rule
            .json_fields
            .iter()
            .map(|field| {
                compile(format!(
                    r#"("{}"\s*:\s*)"(?:[^"\\]|\\.)*\\?$"#,
                    regex::escape(field)
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let query_params = rule
            .query_params
            .iter()
            .map(|param| compile(format!(r"(^|&)({})=[^&]*", regex::escape(param))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            method,
            path_pattern: rule.path_pattern.clone(),
            json_fields,
            json_open_values,
            query_params,
            headers: rule.headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
        })
    }

    fn applies_to(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().is_none_or(|m| m == method) && path_matches(&self.path_pattern, path)
    }
}

fn compile(pattern: String) -> Result<Regex> {
    Regex::new(&pattern).map_err(|source| RequestLoggingError::InvalidPattern { pattern, source })
}

/// Compiled set of mask rules
#[derive(Debug, Default)]
pub struct Masker {
    rules: Vec<CompiledMask>,
}

impl Masker {
    pub fn compile(rules: &[MaskRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(CompiledMask::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Rules applying to an exchange with this method and path
    pub fn select(&self, method: &Method, path: &str) -> ActiveMasks<'_> {
        ActiveMasks {
            rules: self
                .rules
                .iter()
                .filter(|r| r.applies_to(method, path))
                .collect(),
        }
    }
}

/// Mask rules selected for one exchange
#[derive(Debug)]
pub struct ActiveMasks<'a> {
    rules: Vec<&'a CompiledMask>,
}

impl ActiveMasks<'_> {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Replace the values of masked headers; names are expected lowercase
    pub fn mask_headers(&self, headers: &mut BTreeMap<String, String>) {
        for name in self.rules.iter().flat_map(|r| r.headers.iter()) {
            if let Some(value) = headers.get_mut(name) {
                *value = MASK.to_string();
            }
        }
    }

    /// Mask parameter values in a query string or form-urlencoded body
    pub fn mask_query(&self, query: &str) -> String {
        let mut masked = query.to_string();
        for re in self.rules.iter().flat_map(|r| r.query_params.iter()) {
            masked = re
                .replace_all(&masked, format!("${{1}}${{2}}={}", MASK))
                .into_owned();
        }
        masked
    }

    fn mask_json(&self, body: &str) -> String {
        let mut masked = body.to_string();
        for re in self.rules.iter().flat_map(|r| r.json_fields.iter()) {
            masked = re
                .replace_all(&masked, format!("${{1}}\"{}\"", MASK))
                .into_owned();
        }
        for re in self.rules.iter().flat_map(|r| r.json_open_values.iter()) {
            masked = re
                .replace(&masked, format!("${{1}}\"{}", MASK))
                .into_owned();
        }
        masked
    }

    /// Mask a body snippet according to its content type
    ///
    /// JSON bodies get field masking, form bodies get parameter masking. A body
    /// without a content type gets both.
    pub fn mask_body(&self, body: &str, content_type: Option<&str>) -> String {
        if self.is_empty() {
            return body.to_string();
        }
        let content_type = content_type.map(str::to_ascii_lowercase);
        let is = |needle: &str| content_type.as_deref().is_none_or(|ct| ct.contains(needle));

        let mut masked = body.to_string();
        if is("json") {
            masked = self.mask_json(&masked);
        }
        if is("application/x-www-form-urlencoded") {
            masked = self.mask_query(&masked);
        }
        masked
    }
}
