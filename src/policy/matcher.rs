//! Matching helpers for paths, content types and status classes.

use axum::http::StatusCode;

use super::config::{FilterList, StatusClass};

/// Match a request path against an Ant-style pattern
///
/// `?` matches one character and `*` matches zero or more characters within a
/// single path segment. A `**` segment matches zero or more whole segments.
///
/// ```rust
/// use request_logging::policy::path_matches;
///
/// assert!(path_matches("/users/**", "/users/42/orders"));
/// assert!(path_matches("/users/*", "/users/42"));
/// assert!(!path_matches("/users/*", "/users/42/orders"));
/// ```
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern: Vec<&str> = segments(pattern).collect();
    let path: Vec<&str> = segments(path).collect();
    match_segments(&pattern, &path)
}

fn segments(s: &str) -> impl Iterator<Item = &str> {
    s.split('/').filter(|seg| !seg.is_empty())
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((head, rest)) => match path.split_first() {
            Some((seg, path_rest)) => {
                wildcard_match(head.as_bytes(), seg.as_bytes()) && match_segments(rest, path_rest)
            }
            None => false,
        },
    }
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

impl FilterList {
    /// Whether `path` passes this list of Ant-style patterns
    pub fn permits_path(&self, path: &str) -> bool {
        if !self.allow.is_empty() {
            return self.allow.iter().any(|p| path_matches(p, path));
        }
        !self.deny.iter().any(|p| path_matches(p, path))
    }

    /// Whether a body with `content_type` is eligible for capture
    ///
    /// Entries match as case-insensitive substrings, so `application/json`
    /// admits `application/json; charset=utf-8`. A missing content type only
    /// passes when no allow list is configured.
    pub fn permits_content_type(&self, content_type: Option<&str>) -> bool {
        let content_type = content_type.map(str::to_ascii_lowercase);
        if !self.allow.is_empty() {
            return match &content_type {
                Some(ct) => self.allow.iter().any(|a| ct.contains(&a.to_ascii_lowercase())),
                None => false,
            };
        }
        match &content_type {
            Some(ct) => !self.deny.iter().any(|d| ct.contains(&d.to_ascii_lowercase())),
            None => true,
        }
    }
}

impl StatusClass {
    pub fn matches(&self, status: StatusCode) -> bool {
        match self {
            StatusClass::Any => true,
            StatusClass::Informational => status.is_informational(),
            StatusClass::Success => status.is_success(),
            StatusClass::Redirection => status.is_redirection(),
            StatusClass::ClientError => status.is_client_error(),
            StatusClass::ServerError => status.is_server_error(),
        }
    }
}
