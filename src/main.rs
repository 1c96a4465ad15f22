//! floe: A standalone tool for writing aggregated KPI rows to a key-value store.
//!
//! This tool reads per-table NDJSON files of aggregated metric rows and
//! writes them into keyed sink tables through parallel, fault-isolated
//! shard writers with idempotent upsert semantics.

mod config;
mod error;
mod metrics;
mod model;
mod normalize;
mod partition;
mod pipeline;
mod sink;
mod source;

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError, TableWritesFailedSnafu};
use pipeline::run_pipeline;

/// Aggregated KPI to key-value store write tool.
#[derive(Parser, Debug)]
#[command(name = "floe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without writing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("floe starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        for table in &config.tables {
            info!(
                "  - {}: key ({}), {} shard(s), rows from {}",
                table.name,
                table.key_fields.join(", "),
                table.shard_count,
                table.rows_path
            );
        }
        info!("Configuration is valid");
        return Ok(());
    }

    // Run the pipeline
    let stats = run_pipeline(config).await?;

    info!("Pipeline completed");
    info!("  Tables written: {}", stats.tables_completed);
    info!("  Rows seen: {}", stats.rows_seen);
    info!("  Rows written: {}", stats.rows_written);
    info!("  Rows failed: {}", stats.rows_failed);
    for report in &stats.reports {
        info!(
            "  {}: seen {}, written {}, failed {}",
            report.table_name, report.total_seen, report.total_written, report.total_failed
        );
    }

    // Table-scoped failures never stop the other tables, but the run as a
    // whole is still reported as failed.
    ensure!(
        stats.tables_failed == 0,
        TableWritesFailedSnafu {
            count: stats.tables_failed,
        }
    );

    Ok(())
}
