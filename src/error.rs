//! Error types for floe using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase. The taxonomy follows the failure
//! scopes of the pipeline: record-level errors are recovered inside a shard
//! and only counted, shard-level (connection) errors abort one shard and
//! fail that table's write, and configuration errors fail fast before any
//! row is processed.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// No target tables are configured.
    #[snafu(display("At least one table must be configured"))]
    EmptyTables,

    /// A table is missing a name.
    #[snafu(display("Table name cannot be empty"))]
    EmptyTableName,

    /// A table has no natural-key fields.
    #[snafu(display("Table '{table}' must declare at least one key field"))]
    EmptyKeyFields { table: String },

    /// Shard count must be at least 1.
    #[snafu(display("Invalid shard count {count} for table '{table}': must be >= 1"))]
    InvalidShardCount { table: String, count: usize },

    /// A table is missing a rows path.
    #[snafu(display("Table '{table}' must declare a rows path"))]
    EmptyRowsPath { table: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Normalization Errors ============

/// Errors that can occur while normalizing a row for the sink.
///
/// Normalization failures are always record-scoped: the writer counts the
/// row as failed and moves on.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NormalizeError {
    /// Float value cannot be represented as a decimal (NaN or infinity).
    #[snafu(display("Field '{field}' is not a finite number"))]
    NonFiniteFloat { field: String },

    /// Float value exceeds the precision range of the decimal type.
    #[snafu(display("Field '{field}' value {value} cannot be converted to a decimal"))]
    DecimalOverflow { field: String, value: f64 },
}

impl NormalizeError {
    /// The field the normalization failure was attributed to.
    pub fn field(&self) -> &str {
        match self {
            NormalizeError::NonFiniteFloat { field } => field,
            NormalizeError::DecimalOverflow { field, .. } => field,
        }
    }
}

// ============ Source Errors ============

/// Errors that can occur while loading aggregated rows from the adapter.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to read the rows file.
    #[snafu(display("Failed to read rows file {path}"))]
    ReadRows {
        path: String,
        source: std::io::Error,
    },

    /// A line is not valid JSON.
    #[snafu(display("Invalid JSON in {path} at line {line}"))]
    JsonParse {
        path: String,
        line: usize,
        source: serde_json::Error,
    },

    /// A row is not a JSON object.
    #[snafu(display("Expected a JSON object in {path} at line {line}"))]
    NotAnObject { path: String, line: usize },

    /// A value has a JSON type the row model does not carry.
    #[snafu(display("Unsupported JSON value for field '{field}' in {path} at line {line}"))]
    UnsupportedJson {
        path: String,
        line: usize,
        field: String,
    },
}

// ============ Sink Errors ============

/// Errors that can occur while establishing a sink connection.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to open a connection to the sink table.
    #[snafu(display("Failed to connect to sink table '{table}': {reason}"))]
    Connect { table: String, reason: String },
}

/// Errors returned by a single keyed upsert.
///
/// The writer maps `Rejected` to a per-record failure and `ConnectionLost`
/// to a shard-fatal one. This split is what keeps one bad record from
/// aborting its shard while a dead connection still does.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PutError {
    /// The sink rejected this record (item-level validation or throttling).
    #[snafu(display("Sink rejected record: {reason}"))]
    Rejected { reason: String },

    /// The connection to the sink was lost.
    #[snafu(display("Sink connection lost: {reason}"))]
    ConnectionLost { reason: String },
}

// ============ Shard Errors ============

/// Fatal, shard-scoped errors.
///
/// Per-record failures never become a `ShardError`; only the connection
/// itself failing does.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ShardError {
    /// Could not establish the shard's own sink connection.
    #[snafu(display("Shard {shard} of table '{table}' failed to connect"))]
    ShardConnect {
        table: String,
        shard: usize,
        source: SinkError,
    },

    /// The shard's connection was lost mid-write.
    #[snafu(display(
        "Shard {shard} of table '{table}' lost its connection after {written} writes: {reason}"
    ))]
    ShardDisconnected {
        table: String,
        shard: usize,
        written: usize,
        reason: String,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Failed to load aggregated rows.
    #[snafu(display("Source error"))]
    Source { source: SourceError },

    /// A table write was aborted by a shard-fatal error.
    #[snafu(display("Write to table '{table}' failed"))]
    TableWrite { table: String, source: ShardError },

    /// One or more table writes did not complete.
    #[snafu(display("{count} table write(s) failed"))]
    TableWritesFailed { count: usize },

    /// Task join error.
    #[snafu(display("Task join error"))]
    TaskJoin { source: tokio::task::JoinError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}

impl PipelineError {
    /// Check if this error is scoped to a single table's write.
    pub fn is_table_scoped(&self) -> bool {
        matches!(self, PipelineError::TableWrite { .. })
    }
}
