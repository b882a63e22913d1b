/// The main error type for request logging setup
///
/// These errors surface while building a [`LogPolicy`](crate::LogPolicy) or a
/// logging layer. Nothing in the per-request path returns them: capture
/// problems are recorded on the exchange, sink problems go to stderr.
#[derive(Debug, thiserror::Error)]
pub enum RequestLoggingError {
    #[error("Invalid request logging config: {0}")]
    InvalidConfig(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl RequestLoggingError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type alias for request logging setup
pub type Result<T> = std::result::Result<T, RequestLoggingError>;

/// Error returned by a [`LogSink`](crate::sink::LogSink) when a record could not be written
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Record rejected: {0}")]
    Rejected(String),
}
