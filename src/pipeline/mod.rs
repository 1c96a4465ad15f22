//! Main write pipeline.
//!
//! Connects the aggregation adapter, partition planner, shard writers,
//! and sink into a per-table write pipeline.
//!
//! # Architecture
//!
//! Each configured table is processed independently: its aggregated rows
//! are loaded, split into shards, and written by N concurrent shard
//! workers, each owning its own sink connection. A fatal failure on one
//! table is recorded and the next table still gets its attempt.

pub mod coordinator;
mod signal;
mod writer;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::model::SinkReport;
use crate::sink::{SinkConnectorRef, connector_from_config};
use crate::source::{AggregationSource, NdjsonSource};

pub use coordinator::write_aggregates;

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub tables_completed: usize,
    pub tables_failed: usize,
    pub rows_seen: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
    /// Reports for tables whose write completed.
    pub reports: Vec<SinkReport>,
}

impl PipelineStats {
    fn record_report(&mut self, report: SinkReport) {
        self.tables_completed += 1;
        self.rows_seen += report.total_seen;
        self.rows_written += report.total_written;
        self.rows_failed += report.total_failed;
        self.reports.push(report);
    }
}

/// Main write pipeline.
pub struct Pipeline {
    config: Config,
    connector: SinkConnectorRef,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline from configuration.
    pub fn new(config: Config, connector: SinkConnectorRef, shutdown: CancellationToken) -> Self {
        Self {
            config,
            connector,
            shutdown,
        }
    }

    /// Run the pipeline: write every configured table, each independently.
    ///
    /// Table-scoped failures (a shard losing its connection, unreadable
    /// rows) are recorded in the stats and do not stop the remaining
    /// tables. Anything else fails the run immediately.
    pub async fn run(&mut self) -> Result<PipelineStats, PipelineError> {
        info!("Starting pipeline with {} table(s)", self.config.tables.len());
        let mut stats = PipelineStats::default();

        for table_config in &self.config.tables {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, skipping remaining tables");
                break;
            }

            let table = table_config.to_spec();
            let source = NdjsonSource::new(&table_config.rows_path);

            let rows = match source.load().await {
                Ok(rows) => rows,
                Err(e) => {
                    error!(
                        "Failed to load rows for '{}' from {}: {}",
                        table.name, table_config.rows_path, e
                    );
                    stats.tables_failed += 1;
                    continue;
                }
            };

            match write_aggregates(
                self.connector.clone(),
                &table,
                rows,
                self.shutdown.clone(),
            )
            .await
            {
                Ok(report) => stats.record_report(report),
                Err(e) if e.is_table_scoped() => {
                    // The next table still gets its attempt.
                    error!("Table write failed: {}", e);
                    stats.tables_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Pipeline completed: {} table(s) written, {} failed",
            stats.tables_completed, stats.tables_failed
        );
        Ok(stats)
    }
}

/// Run the pipeline with the given configuration.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    let shutdown = CancellationToken::new();

    // Set up signal handler for graceful shutdown
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let connector = connector_from_config(&config.sink);
    let mut pipeline = Pipeline::new(config, connector, shutdown);
    pipeline.run().await
}
