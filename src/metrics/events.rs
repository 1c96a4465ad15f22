//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the write
//! pipeline. Events implement the `InternalEvent` trait which emits the
//! corresponding Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when rows are successfully upserted into the sink.
pub struct RowsWritten {
    pub count: u64,
}

impl InternalEvent for RowsWritten {
    fn emit(self) {
        trace!(count = self.count, "Rows written");
        counter!("floe_rows_written_total").increment(self.count);
    }
}

/// Reason a row failed inside a shard.
#[derive(Debug, Clone, Copy)]
pub enum FailureReason {
    /// A natural-key field was absent or empty.
    MissingKey,
    /// Type normalization failed for one of the row's values.
    Normalize,
    /// The sink rejected the record.
    Rejected,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::MissingKey => "missing_key",
            FailureReason::Normalize => "normalize",
            FailureReason::Rejected => "rejected",
        }
    }
}

/// Event emitted when a row fails and is skipped.
pub struct RowFailed {
    pub reason: FailureReason,
}

impl InternalEvent for RowFailed {
    fn emit(self) {
        trace!(reason = self.reason.as_str(), "Row failed");
        counter!("floe_rows_failed_total", "reason" => self.reason.as_str()).increment(1);
    }
}

/// Completion status of a shard writer.
#[derive(Debug, Clone, Copy)]
pub enum ShardStatus {
    Completed,
    Failed,
}

impl ShardStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ShardStatus::Completed => "completed",
            ShardStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a shard writer finishes.
pub struct ShardFinished {
    pub status: ShardStatus,
}

impl InternalEvent for ShardFinished {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Shard finished");
        counter!("floe_shards_finished_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when the number of in-flight shard writers changes.
pub struct ActiveShards {
    pub count: usize,
}

impl InternalEvent for ActiveShards {
    fn emit(self) {
        trace!(count = self.count, "Active shards");
        gauge!("floe_active_shards").set(self.count as f64);
    }
}

/// Event emitted when a single upsert completes.
pub struct UpsertCompleted {
    pub duration: Duration,
}

impl InternalEvent for UpsertCompleted {
    fn emit(self) {
        trace!(duration_us = self.duration.as_micros() as u64, "Upsert completed");
        histogram!("floe_upsert_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a full table write completes.
pub struct TableWriteCompleted {
    pub duration: Duration,
}

impl InternalEvent for TableWriteCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis() as u64,
            "Table write completed"
        );
        histogram!("floe_table_write_duration_seconds").record(self.duration.as_secs_f64());
    }
}
