use std::sync::{Mutex, MutexGuard};

use crate::error::SinkError;
use crate::record::ExchangeRecord;
use crate::sink::LogSink;

/// Sink that keeps every emitted record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ExchangeRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExchangeRecord>> {
        // A panicking test thread must not hide the records from the others
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the records emitted so far, in emission order
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.lock().clone()
    }

    /// Find the record with the given correlation id
    pub fn find(&self, correlation_id: &str) -> Option<ExchangeRecord> {
        self.lock()
            .iter()
            .find(|r| r.correlation_id == correlation_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &ExchangeRecord) -> Result<(), SinkError> {
        self.lock().push(record.clone());
        Ok(())
    }
}
