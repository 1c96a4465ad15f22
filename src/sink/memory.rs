//! In-memory key-value sink.
//!
//! A shared last-write-wins keyed store behind the [`SinkConnector`] seam.
//! Each `connect` call produces an independent handle over the shared
//! store, preserving the one-connection-per-shard resource model of a real
//! remote store.
//!
//! The sink also carries fault-injection knobs (failed connects, per-key
//! rejections, per-key connection loss) so the failure paths of the write
//! pipeline can be exercised deterministically in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ConnectionLostSnafu, PutError, RejectedSnafu, SinkError};
use crate::model::{MetricRow, NaturalKey};
use crate::sink::{SinkConnector, TableHandle};
use snafu::prelude::*;

type TableData = HashMap<String, MetricRow>;

/// Fault-injection plan, shared across all connections.
#[derive(Debug, Default)]
struct Faults {
    /// Fail this many upcoming `connect` calls.
    failing_connects: AtomicUsize,
    /// Reject puts whose composite key contains any of these substrings.
    reject_keys: Mutex<Vec<String>>,
    /// Report a lost connection on puts whose composite key contains any
    /// of these substrings.
    sever_keys: Mutex<Vec<String>>,
}

/// Shared in-memory store with independent per-shard connections.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Arc<Mutex<HashMap<String, TableData>>>,
    faults: Arc<Faults>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.faults.failing_connects.fetch_add(count, Ordering::SeqCst);
    }

    /// Reject every put whose composite key contains `fragment`.
    pub async fn reject_key(&self, fragment: impl Into<String>) {
        self.faults.reject_keys.lock().await.push(fragment.into());
    }

    /// Report a lost connection on any put whose composite key contains
    /// `fragment`. The handle stays dead afterwards.
    pub async fn sever_on_key(&self, fragment: impl Into<String>) {
        self.faults.sever_keys.lock().await.push(fragment.into());
    }

    /// Look up a stored record by table and composite key.
    pub async fn get(&self, table: &str, key: &str) -> Option<MetricRow> {
        self.tables.lock().await.get(table)?.get(key).cloned()
    }

    /// Number of records stored in a table.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table)
            .map_or(0, TableData::len)
    }

    /// All composite keys stored in a table, sorted.
    pub async fn keys(&self, table: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .tables
            .lock()
            .await
            .get(table)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SinkConnector for MemorySink {
    async fn connect(&self, table: &str) -> Result<Box<dyn TableHandle>, SinkError> {
        let failing = &self.faults.failing_connects;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SinkError::Connect {
                table: table.to_string(),
                reason: "injected connect failure".to_string(),
            });
        }

        debug!("Opened memory sink connection to table '{}'", table);
        Ok(Box::new(MemoryHandle {
            table: table.to_string(),
            tables: self.tables.clone(),
            faults: self.faults.clone(),
            severed: false,
        }))
    }
}

/// One connection over the shared store.
struct MemoryHandle {
    table: String,
    tables: Arc<Mutex<HashMap<String, TableData>>>,
    faults: Arc<Faults>,
    severed: bool,
}

#[async_trait]
impl TableHandle for MemoryHandle {
    async fn put(&mut self, key: &NaturalKey, item: &MetricRow) -> Result<(), PutError> {
        ensure!(
            !self.severed,
            ConnectionLostSnafu {
                reason: "connection previously severed",
            }
        );

        let composite = key.composite();

        let severed = {
            let sever = self.faults.sever_keys.lock().await;
            sever.iter().any(|f| composite.contains(f.as_str()))
        };
        if severed {
            self.severed = true;
            return ConnectionLostSnafu {
                reason: format!("injected connection loss on key {}", composite),
            }
            .fail();
        }

        let rejected = {
            let reject = self.faults.reject_keys.lock().await;
            reject.iter().any(|f| composite.contains(f.as_str()))
        };
        ensure!(
            !rejected,
            RejectedSnafu {
                reason: format!("injected rejection for key {}", composite),
            }
        );

        let mut tables = self.tables.lock().await;
        tables
            .entry(self.table.clone())
            .or_default()
            .insert(composite, item.clone());
        Ok(())
    }
}
