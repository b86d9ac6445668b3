//! Usage records handed to the billing collaborator.

use serde::Serialize;

use crate::observability::metrics;

/// One metered request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub request_id: String,
    pub route_id: String,
    pub upstream_id: String,
    pub unit: String,
    pub value: f64,
    /// Status the upstream answered with.
    pub status: u16,
    /// Milliseconds since the Unix epoch.
    pub recorded_at: u64,
}

/// Receives usage records. Implementations must not block.
pub trait UsageSink: Send + Sync + std::fmt::Debug {
    fn record(&self, record: UsageRecord);
}

/// Logs every record and feeds the usage counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, record: UsageRecord) {
        tracing::info!(
            target: "apigate::usage",
            request_id = %record.request_id,
            route_id = %record.route_id,
            upstream_id = %record.upstream_id,
            unit = %record.unit,
            value = record.value,
            status = record.status,
            recorded_at = record.recorded_at,
            "Usage recorded"
        );
        metrics::record_usage(&record.route_id, &record.unit, record.value);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collects records for assertions.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        pub records: Mutex<Vec<UsageRecord>>,
    }

    impl MemorySink {
        pub fn take(&self) -> Vec<UsageRecord> {
            std::mem::take(&mut *self.records.lock().unwrap())
        }
    }

    impl UsageSink for MemorySink {
        fn record(&self, record: UsageRecord) {
            self.records.lock().unwrap().push(record);
        }
    }
}
