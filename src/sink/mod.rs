//! Key-value sink abstraction.
//!
//! The sink contract mirrors what the write path actually needs from a
//! remote key-value store: independent concurrent connections and a keyed
//! `put` with full-record replace semantics. Every shard writer opens its
//! own [`TableHandle`] through a shared [`SinkConnector`] and releases it
//! when the shard finishes; handles are never shared across shards.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{SinkBackend, SinkConfig};
use crate::error::{PutError, SinkError};
use crate::model::{MetricRow, NaturalKey};

pub use memory::MemorySink;

/// A reference-counted sink connector shared by all shard writers.
pub type SinkConnectorRef = Arc<dyn SinkConnector>;

/// Opens independent connections to sink tables.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// Open a new, exclusively-owned connection to the named table.
    async fn connect(&self, table: &str) -> Result<Box<dyn TableHandle>, SinkError>;
}

/// An exclusively-owned connection to one sink table.
#[async_trait]
pub trait TableHandle: Send {
    /// Upsert a full record under the given key (replace, not merge).
    ///
    /// A [`PutError::Rejected`] is scoped to this record; a
    /// [`PutError::ConnectionLost`] means the handle is dead.
    async fn put(&mut self, key: &NaturalKey, item: &MetricRow) -> Result<(), PutError>;
}

/// Build a connector from sink configuration.
pub fn connector_from_config(config: &SinkConfig) -> SinkConnectorRef {
    match config.backend {
        SinkBackend::Memory => Arc::new(MemorySink::new()),
    }
}
