//! Per-shard sink writer.
//!
//! Each shard writer owns its sink connection exclusively and walks its
//! rows once: validate the natural key, normalize, upsert. Record-level
//! failures are logged with the best available key fields, counted, and
//! skipped; losing the connection itself is fatal for the shard and is
//! propagated to the coordinator after the in-flight record is accounted
//! for.

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::emit;
use crate::error::{PutError, ShardConnectSnafu, ShardDisconnectedSnafu, ShardError};
use crate::metrics::events::{FailureReason, RowFailed, RowsWritten, UpsertCompleted};
use crate::model::{Shard, TableSpec, WriteOutcome};
use crate::normalize::normalize_row;
use crate::sink::SinkConnectorRef;
use snafu::prelude::*;

/// Log a progress line every this many successful writes.
const PROGRESS_INTERVAL: usize = 10;

/// Write one shard's rows through a freshly opened connection.
///
/// Returns the shard's outcome, for which `rows_written + rows_failed ==
/// rows_seen` always holds. Cancellation is observed between records:
/// rows not yet seen when the token fires are left unprocessed and
/// uncounted.
pub(crate) async fn write_shard(
    connector: SinkConnectorRef,
    table: Arc<TableSpec>,
    shard: Shard,
    cancel: CancellationToken,
) -> Result<WriteOutcome, ShardError> {
    let shard_index = shard.index;
    debug!(
        "[shard {}] Starting write of {} rows to '{}'",
        shard_index,
        shard.rows.len(),
        table.name
    );

    // Scoped acquisition: the handle lives for this shard only and is
    // released when the function returns.
    let mut handle = connector
        .connect(&table.name)
        .await
        .context(ShardConnectSnafu {
            table: table.name.clone(),
            shard: shard_index,
        })?;

    let mut outcome = WriteOutcome::default();

    for row in shard.rows {
        if cancel.is_cancelled() {
            debug!(
                "[shard {}] Cancelled after {} rows",
                shard_index,
                outcome.rows_seen
            );
            break;
        }

        outcome.rows_seen += 1;

        let Some(key) = table.natural_key(&row) else {
            warn!(
                "[shard {}] Skipping row missing natural key ({}) for '{}'",
                shard_index,
                table.diagnostic_key(&row),
                table.name
            );
            outcome.rows_failed += 1;
            emit!(RowFailed {
                reason: FailureReason::MissingKey
            });
            continue;
        };

        let normalized = match normalize_row(&row) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(
                    "[shard {}] Normalization failed for {} in '{}': {}",
                    shard_index,
                    table.diagnostic_key(&row),
                    table.name,
                    e
                );
                outcome.rows_failed += 1;
                emit!(RowFailed {
                    reason: FailureReason::Normalize
                });
                continue;
            }
        };

        let start = Instant::now();
        match handle.put(&key, &normalized).await {
            Ok(()) => {
                emit!(UpsertCompleted {
                    duration: start.elapsed()
                });
                outcome.rows_written += 1;
                emit!(RowsWritten { count: 1 });
                if outcome.rows_written % PROGRESS_INTERVAL == 0 {
                    info!(
                        "[shard {}] Successfully wrote {} rows to '{}'",
                        shard_index, outcome.rows_written, table.name
                    );
                }
            }
            Err(PutError::Rejected { reason }) => {
                warn!(
                    "[shard {}] Sink rejected {} for '{}': {}",
                    shard_index, key, table.name, reason
                );
                outcome.rows_failed += 1;
                emit!(RowFailed {
                    reason: FailureReason::Rejected
                });
            }
            Err(PutError::ConnectionLost { reason }) => {
                // Account for the in-flight record, then give up: there
                // is nothing further this worker can do without a
                // connection.
                outcome.rows_failed += 1;
                warn!(
                    "[shard {}] Connection lost writing {} to '{}' (seen {}, written {}): {}",
                    shard_index,
                    key,
                    table.name,
                    outcome.rows_seen,
                    outcome.rows_written,
                    reason
                );
                return ShardDisconnectedSnafu {
                    table: table.name.clone(),
                    shard: shard_index,
                    written: outcome.rows_written,
                    reason,
                }
                .fail();
            }
        }
    }

    info!(
        "[shard {}] Complete: processed {} rows, successfully wrote {} to '{}'",
        shard_index, outcome.rows_seen, outcome.rows_written, table.name
    );
    debug_assert!(outcome.is_consistent());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricRow, Value};
    use crate::sink::MemorySink;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn order_table() -> Arc<TableSpec> {
        Arc::new(TableSpec::order_kpis())
    }

    fn order_row(date: &str, revenue: f64) -> MetricRow {
        let mut row = MetricRow::new();
        row.insert("order_date", Value::String(date.to_string()));
        row.insert("total_orders", Value::Integer(10));
        row.insert("total_revenue", Value::Float(revenue));
        row
    }

    fn shard(rows: Vec<MetricRow>) -> Shard {
        Shard { index: 0, rows }
    }

    async fn run_shard(
        sink: &Arc<MemorySink>,
        rows: Vec<MetricRow>,
    ) -> Result<WriteOutcome, ShardError> {
        write_shard(
            sink.clone(),
            order_table(),
            shard(rows),
            CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_writes_normalized_rows() {
        let sink = Arc::new(MemorySink::new());
        let outcome = run_shard(&sink, vec![order_row("2024-01-05", 1234.5)])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WriteOutcome {
                rows_seen: 1,
                rows_written: 1,
                rows_failed: 0
            }
        );

        // The stored record has the float converted to an exact decimal.
        let stored = sink.get("order_kpi_table", "2024-01-05").await.unwrap();
        assert_eq!(
            stored.get("total_revenue"),
            Some(&Value::Decimal(Decimal::from_str("1234.5").unwrap()))
        );
        assert_eq!(stored.get("total_orders"), Some(&Value::Integer(10)));
    }

    #[tokio::test]
    async fn test_missing_key_is_counted_not_fatal() {
        let sink = Arc::new(MemorySink::new());
        let mut keyless = MetricRow::new();
        keyless.insert("total_revenue", Value::Float(5.0));

        let outcome = run_shard(&sink, vec![keyless, order_row("2024-01-05", 1.0)])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WriteOutcome {
                rows_seen: 2,
                rows_written: 1,
                rows_failed: 1
            }
        );
        assert_eq!(sink.len("order_kpi_table").await, 1);
    }

    #[tokio::test]
    async fn test_normalization_failure_is_counted_not_fatal() {
        let sink = Arc::new(MemorySink::new());
        let mut bad = order_row("2024-01-04", 1.0);
        bad.insert("total_revenue", Value::Float(f64::NAN));

        let outcome = run_shard(&sink, vec![bad, order_row("2024-01-05", 1.0)])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WriteOutcome {
                rows_seen: 2,
                rows_written: 1,
                rows_failed: 1
            }
        );
        assert!(sink.get("order_kpi_table", "2024-01-04").await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_put_is_counted_not_fatal() {
        let sink = Arc::new(MemorySink::new());
        sink.reject_key("2024-01-05").await;

        let rows = vec![order_row("2024-01-05", 1.0), order_row("2024-01-06", 2.0)];
        let outcome = run_shard(&sink, rows).await.unwrap();

        assert_eq!(
            outcome,
            WriteOutcome {
                rows_seen: 2,
                rows_written: 1,
                rows_failed: 1
            }
        );
        assert!(outcome.is_consistent());
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_next_connects(1);

        let err = run_shard(&sink, vec![order_row("2024-01-05", 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, ShardError::ShardConnect { shard: 0, .. }));
    }

    #[tokio::test]
    async fn test_connection_loss_aborts_shard() {
        let sink = Arc::new(MemorySink::new());
        sink.sever_on_key("2024-01-03").await;

        let rows = vec![
            order_row("2024-01-01", 1.0),
            order_row("2024-01-02", 2.0),
            order_row("2024-01-03", 3.0),
            order_row("2024-01-04", 4.0),
        ];
        let err = run_shard(&sink, rows).await.unwrap_err();

        match err {
            ShardError::ShardDisconnected { written, shard, .. } => {
                assert_eq!(written, 2);
                assert_eq!(shard, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Rows before the loss stay committed; rows after were never tried.
        assert_eq!(sink.len("order_kpi_table").await, 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_records() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = write_shard(
            sink.clone(),
            order_table(),
            shard(vec![order_row("2024-01-05", 1.0)]),
            cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome, WriteOutcome::default());
        assert_eq!(sink.len("order_kpi_table").await, 0);
    }
}
