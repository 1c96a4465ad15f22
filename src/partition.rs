//! Partition planning for parallel sink writes.
//!
//! Splits an ordered row set into a fixed number of disjoint, contiguous
//! shards. Placement is throughput-driven, not correctness-driven: the
//! sink key is the natural key, so any content-blind split is valid, and
//! contiguous slicing keeps assignment deterministic for a given shard
//! count and row ordering.

use snafu::prelude::*;

use crate::error::{ConfigError, InvalidShardCountSnafu};
use crate::model::{MetricRow, Shard, TableSpec};

/// Split `rows` into exactly `table.shard_count` shards covering all rows.
///
/// Shard sizes differ by at most one row slice: 23 rows over 5 shards
/// yields 5,5,5,5,3. A shard count of zero is an invalid configuration
/// and fails before any row is touched.
pub fn plan_shards(table: &TableSpec, rows: Vec<MetricRow>) -> Result<Vec<Shard>, ConfigError> {
    ensure!(
        table.shard_count >= 1,
        InvalidShardCountSnafu {
            table: table.name.clone(),
            count: table.shard_count,
        }
    );

    let shard_count = table.shard_count;
    let chunk_size = rows.len().div_ceil(shard_count).max(1);

    let mut shards: Vec<Shard> = Vec::with_capacity(shard_count);
    let mut rows = rows.into_iter();
    for index in 0..shard_count {
        let chunk: Vec<MetricRow> = rows.by_ref().take(chunk_size).collect();
        shards.push(Shard { index, rows: chunk });
    }

    debug_assert!(rows.next().is_none());
    Ok(shards)
}
