//! floe: A library for writing aggregated KPI rows to a key-value store.
//!
//! This library provides components for planning a row set into disjoint
//! shards, normalizing row values for sink compatibility, and writing
//! each shard through an independent, fault-isolated worker with
//! at-least-once, idempotent upsert semantics.
//!
//! # Example
//!
//! ```ignore
//! use floe::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("config.yaml")?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} rows", stats.rows_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod sink;
pub mod source;

// Re-export main types
pub use config::Config;
pub use model::{MetricRow, NaturalKey, SinkReport, TableSpec, Value, WriteOutcome};
pub use pipeline::{Pipeline, PipelineStats, run_pipeline, write_aggregates};
pub use sink::{MemorySink, SinkConnector, SinkConnectorRef, TableHandle};
