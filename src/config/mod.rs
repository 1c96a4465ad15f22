//! Configuration parsing and validation.
//!
//! Handles loading configuration from YAML files with environment
//! variable interpolation, and converts table definitions into the
//! [`TableSpec`]s the write pipeline runs against.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyKeyFieldsSnafu, EmptyRowsPathSnafu, EmptyTableNameSnafu, EmptyTablesSnafu,
    EnvInterpolationSnafu, InvalidShardCountSnafu, ReadFileSnafu, YamlParseSnafu,
};
use crate::model::TableSpec;

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target tables, written independently of one another.
    pub tables: Vec<TableConfig>,
    /// Sink backend configuration (optional, defaults to in-memory).
    #[serde(default)]
    pub sink: SinkConfig,
    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// One target table: where its aggregated rows come from, how they are
/// keyed, and how many shard writers to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Sink table name.
    pub name: String,

    /// Path to the NDJSON file of aggregated rows for this table.
    pub rows_path: String,

    /// Natural-key fields, in order. Rows missing any of these are
    /// skipped and counted as failed.
    pub key_fields: Vec<String>,

    /// Number of parallel shard writers (default: 5). Tunable per table
    /// to match the sink's write capacity.
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
}

fn default_shard_count() -> usize {
    5
}

impl TableConfig {
    /// Build the runtime table spec for this configuration entry.
    pub fn to_spec(&self) -> TableSpec {
        TableSpec::new(&self.name, self.key_fields.clone(), self.shard_count)
    }
}

/// Sink backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    /// Shared in-memory last-write-wins store.
    #[default]
    Memory,
}

/// Sink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub backend: SinkBackend,
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment
    /// variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            let result = vars::interpolate(&content);
            if !result.is_ok() {
                let error_msg = result.errors.join("\n");
                return EnvInterpolationSnafu { message: error_msg }.fail();
            }
            result.text
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, failing fast before any row is read.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.tables.is_empty(), EmptyTablesSnafu);
        for table in &self.tables {
            ensure!(!table.name.is_empty(), EmptyTableNameSnafu);
            ensure!(
                !table.key_fields.is_empty(),
                EmptyKeyFieldsSnafu {
                    table: table.name.clone(),
                }
            );
            ensure!(
                table.shard_count >= 1,
                InvalidShardCountSnafu {
                    table: table.name.clone(),
                    count: table.shard_count,
                }
            );
            ensure!(
                !table.rows_path.is_empty(),
                EmptyRowsPathSnafu {
                    table: table.name.clone(),
                }
            );
        }
        Ok(())
    }
}
