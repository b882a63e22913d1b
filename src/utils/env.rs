/// Get environment variable with the REQUEST_LOGGING_ prefix
///
/// Only `REQUEST_LOGGING_{key}` is read. Unprefixed names such as `LOG_LEVEL`
/// or `ENABLED` commonly belong to the host application and are ignored.
///
/// # Examples
///
/// ```rust
/// use request_logging::utils::get_env_with_prefix;
///
/// // Reads REQUEST_LOGGING_MAX_BODY_BYTES
/// let cap = get_env_with_prefix("MAX_BODY_BYTES");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("REQUEST_LOGGING_{}", key)).ok()
}

/// Split a comma-separated environment value into trimmed, non-empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
