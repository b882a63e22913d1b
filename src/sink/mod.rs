//! Log sinks: destinations for finished exchange records.
//!
//! The interceptor calls [`LogSink::emit`] exactly once per exchange. A sink
//! failure never reaches the request path; it is reported on stderr and dropped.

mod json;
mod tracing_sink;

pub use json::JsonLinesSink;
pub use tracing_sink::TracingSink;

use std::io::Write;
use std::sync::Arc;

use crate::error::SinkError;
use crate::record::ExchangeRecord;

/// Destination for exchange records
///
/// Implementations are shared by all concurrent requests and must tolerate
/// concurrent calls. Ordering across requests is not guaranteed.
pub trait LogSink: Send + Sync + 'static {
    fn emit(&self, record: &ExchangeRecord) -> Result<(), SinkError>;
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn emit(&self, record: &ExchangeRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }
}

impl<T: LogSink + ?Sized> LogSink for Box<T> {
    fn emit(&self, record: &ExchangeRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }
}

/// Emit a record, reporting failures on stderr instead of returning them
pub(crate) fn emit_or_report(sink: &dyn LogSink, record: &ExchangeRecord) {
    if let Err(e) = sink.emit(record) {
        let _ = writeln!(
            std::io::stderr(),
            "request-logging: failed to emit record {} ({}): {}",
            record.correlation_id,
            record.summary(),
            e
        );
    }
}
