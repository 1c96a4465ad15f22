//! Sink write coordinator.
//!
//! Drives one table's write end to end: plan shards, launch every shard
//! writer together, join them, and fold their outcomes into a
//! [`SinkReport`]. Per-record failures surface only in `total_failed`; a
//! shard-fatal connection error cancels the table's remaining work and
//! fails the whole table write, while shards that already completed keep
//! their committed progress (the sink has no transaction spanning shards).

use futures::stream::{FuturesUnordered, StreamExt};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::emit;
use crate::error::{PipelineError, ShardError, TaskJoinSnafu};
use crate::metrics::events::{ActiveShards, ShardFinished, ShardStatus, TableWriteCompleted};
use crate::model::{MetricRow, SinkReport, TableSpec};
use crate::partition::plan_shards;
use crate::pipeline::writer::write_shard;
use crate::sink::SinkConnectorRef;

/// Write a full aggregated result set into one sink table.
///
/// All shard writers for the table run concurrently, each over its own
/// connection. Returns the table's report once every shard has finished,
/// or the first shard-fatal error after in-flight shards have drained.
pub async fn write_aggregates(
    connector: SinkConnectorRef,
    table: &TableSpec,
    rows: Vec<MetricRow>,
    shutdown: CancellationToken,
) -> Result<SinkReport, PipelineError> {
    let started = Instant::now();
    let row_count = rows.len();
    let shards = plan_shards(table, rows).context(crate::error::ConfigSnafu)?;
    info!(
        "Writing {} rows to '{}' across {} shards",
        row_count,
        table.name,
        shards.len()
    );

    let table = Arc::new(table.clone());
    // Child token: a fatal shard cancels this table's siblings without
    // touching other tables' in-flight work.
    let cancel = shutdown.child_token();

    let mut workers = FuturesUnordered::new();
    for shard in shards {
        workers.push(tokio::spawn(write_shard(
            connector.clone(),
            table.clone(),
            shard,
            cancel.clone(),
        )));
    }
    let mut active = workers.len();
    emit!(ActiveShards { count: active });

    let mut report = SinkReport::new(table.name.clone());
    let mut fatal: Option<ShardError> = None;

    while let Some(joined) = workers.next().await {
        active -= 1;
        emit!(ActiveShards { count: active });

        match joined.context(TaskJoinSnafu)? {
            Ok(outcome) => {
                emit!(ShardFinished {
                    status: ShardStatus::Completed
                });
                report.absorb(&outcome);
            }
            Err(e) => {
                emit!(ShardFinished {
                    status: ShardStatus::Failed
                });
                error!("Shard writer failed for '{}': {}", table.name, e);
                if fatal.is_none() {
                    // First fatal error wins; stop the table's siblings.
                    cancel.cancel();
                    fatal = Some(e);
                } else {
                    warn!("Additional shard failure for '{}' after abort", table.name);
                }
            }
        }
    }

    emit!(TableWriteCompleted {
        duration: started.elapsed()
    });

    if let Some(source) = fatal {
        // Completed shards keep their partial progress in the sink.
        warn!(
            "Aborted write to '{}': {} rows written across completed shards before abort",
            table.name, report.total_written
        );
        return Err(PipelineError::TableWrite {
            table: table.name.clone(),
            source,
        });
    }

    info!(
        "Finished writing to '{}': seen {}, written {}, failed {}",
        table.name, report.total_seen, report.total_written, report.total_failed
    );
    Ok(report)
}
