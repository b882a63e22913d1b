use crate::error::SinkError;
use crate::policy::LogLevel;
use crate::record::ExchangeRecord;

use super::LogSink;

/// Sink that emits each record as a `tracing` event
///
/// The event is logged at the record's level under the `request_logging`
/// target. Identity fields are recorded individually; with details enabled
/// the whole record is attached as JSON in the `record` field.
#[derive(Debug, Clone)]
pub struct TracingSink {
    include_details: bool,
}

impl TracingSink {
    pub fn new() -> Self {
        Self {
            include_details: true,
        }
    }

    /// Only log the summary fields, without the serialized record
    pub fn summary_only() -> Self {
        Self {
            include_details: false,
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! emit_event {
    ($macro:ident, $record:expr, $details:expr) => {
        tracing::$macro!(
            target: "request_logging",
            correlation_id = %$record.correlation_id,
            method = %$record.method,
            path = %$record.path,
            status = ?$record.status,
            duration_ms = ?$record.duration_ms,
            outcome = $record.outcome.label(),
            record = $details,
            "{}",
            $record.summary()
        )
    };
}

impl LogSink for TracingSink {
    fn emit(&self, record: &ExchangeRecord) -> Result<(), SinkError> {
        let details = if self.include_details {
            serde_json::to_string(record)?
        } else {
            String::new()
        };
        let details = details.as_str();

        match record.level {
            LogLevel::Trace => emit_event!(trace, record, details),
            LogLevel::Debug => emit_event!(debug, record, details),
            LogLevel::Info => emit_event!(info, record, details),
            LogLevel::Warn => emit_event!(warn, record, details),
            LogLevel::Error => emit_event!(error, record, details),
        }
        Ok(())
    }
}
