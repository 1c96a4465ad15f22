//! Core data model for metric rows and sink accounting.
//!
//! A [`MetricRow`] is one aggregated observation flowing from the
//! aggregation engine to the key-value sink. Rows are identified by a
//! natural key declared on a [`TableSpec`], split into [`Shard`]s for
//! parallel writing, and accounted for in [`WriteOutcome`]s that roll up
//! into a per-table [`SinkReport`].

use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::fmt;

/// A value carried by a metric row field.
///
/// The aggregation engine produces identifier strings, calendar dates,
/// integer counts, and decimal amounts. Floats exist only upstream of the
/// normalizer; the sink never sees one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string (identifiers, already-formatted dates).
    String(String),
    /// 64-bit signed integer count.
    Integer(i64),
    /// 64-bit float, pending conversion to `Decimal`.
    Float(f64),
    /// Exact fixed-precision decimal amount.
    Decimal(Decimal),
    /// Calendar date, pending conversion to an ISO-8601 string.
    Date(NaiveDate),
    /// Nested mapping of field name to value.
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Render this value as a natural-key part.
    ///
    /// Returns `None` for values that cannot identify a row: nested maps
    /// and empty strings.
    pub fn as_key_part(&self) -> Option<String> {
        match self {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Map(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// One aggregated observation, as a flat (optionally nested) mapping from
/// field name to value. Field order is preserved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricRow {
    fields: IndexMap<String, Value>,
}

impl MetricRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<IndexMap<String, Value>> for MetricRow {
    fn from(fields: IndexMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for MetricRow {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// The business-meaningful field combination identifying a row in the sink.
///
/// Rendered as a deterministic composite string, the sink key for the
/// idempotent upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    parts: Vec<(String, String)>,
}

impl NaturalKey {
    /// Deterministic composite key used by the sink.
    pub fn composite(&self) -> String {
        self.parts
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("#")
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// A target table: name, natural-key fields, and shard count.
///
/// This is the capability seam that lets one generic shard writer serve
/// every metric shape: anything with a name and key extraction is writable.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub key_fields: Vec<String>,
    pub shard_count: usize,
}

impl TableSpec {
    pub fn new(
        name: impl Into<String>,
        key_fields: impl IntoIterator<Item = impl Into<String>>,
        shard_count: usize,
    ) -> Self {
        Self {
            name: name.into(),
            key_fields: key_fields.into_iter().map(Into::into).collect(),
            shard_count,
        }
    }

    /// The category-level KPI table, keyed by `(category, order_date)`.
    pub fn category_kpis() -> Self {
        Self::new("category_kpi_table", ["category", "order_date"], 5)
    }

    /// The order-level KPI table, keyed by `order_date` alone.
    pub fn order_kpis() -> Self {
        Self::new("order_kpi_table", ["order_date"], 5)
    }

    /// Extract the natural key from a row.
    ///
    /// Returns `None` if any key field is absent or empty; such rows are
    /// invalid and never reach the sink.
    pub fn natural_key(&self, row: &MetricRow) -> Option<NaturalKey> {
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let part = row.get(field)?.as_key_part()?;
            parts.push((field.clone(), part));
        }
        Some(NaturalKey { parts })
    }

    /// Best-effort identifying string for failure logs.
    ///
    /// Uses whatever key fields are present on the (possibly invalid,
    /// pre-normalization) row and `unknown` for the rest.
    pub fn diagnostic_key(&self, row: &MetricRow) -> String {
        self.key_fields
            .iter()
            .map(|field| {
                let value = row
                    .get(field)
                    .and_then(Value::as_key_part)
                    .unwrap_or_else(|| "unknown".to_string());
                format!("{}={}", field, value)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An ordered, disjoint subset of rows assigned to one shard writer.
#[derive(Debug)]
pub struct Shard {
    /// Zero-based shard index, for logging and diagnostics.
    pub index: usize,
    pub rows: Vec<MetricRow>,
}

/// Per-shard write accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_seen: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
}

impl WriteOutcome {
    /// Every row seen is either written or failed.
    pub fn is_consistent(&self) -> bool {
        self.rows_written + self.rows_failed == self.rows_seen
    }
}

/// Aggregated write report for one table.
///
/// A report with `total_failed > 0` and no error is a successful run with
/// a known loss budget, distinct from a failed table write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub table_name: String,
    pub total_seen: usize,
    pub total_written: usize,
    pub total_failed: usize,
}

impl SinkReport {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            total_seen: 0,
            total_written: 0,
            total_failed: 0,
        }
    }

    /// Fold one shard's outcome into the report.
    pub fn absorb(&mut self, outcome: &WriteOutcome) {
        self.total_seen += outcome.rows_seen;
        self.total_written += outcome.rows_written;
        self.total_failed += outcome.rows_failed;
    }
}

/// Category-level KPIs for one `(category, order_date)` group.
#[derive(Debug, Clone)]
pub struct CategoryKpi {
    pub category: String,
    pub order_date: NaiveDate,
    pub daily_revenue: f64,
    pub avg_order_value: f64,
    pub avg_return_rate: f64,
}

impl From<CategoryKpi> for MetricRow {
    fn from(kpi: CategoryKpi) -> Self {
        let mut row = MetricRow::new();
        row.insert("category", Value::String(kpi.category));
        row.insert("order_date", Value::Date(kpi.order_date));
        row.insert("daily_revenue", Value::Float(kpi.daily_revenue));
        row.insert("avg_order_value", Value::Float(kpi.avg_order_value));
        row.insert("avg_return_rate", Value::Float(kpi.avg_return_rate));
        row
    }
}

/// Order-level KPIs for one `order_date`.
#[derive(Debug, Clone)]
pub struct OrderKpi {
    pub order_date: NaiveDate,
    pub total_orders: i64,
    pub total_revenue: f64,
    pub total_items_sold: i64,
    pub return_rate: f64,
    pub unique_customers: i64,
}

impl From<OrderKpi> for MetricRow {
    fn from(kpi: OrderKpi) -> Self {
        let mut row = MetricRow::new();
        row.insert("order_date", Value::Date(kpi.order_date));
        row.insert("total_orders", Value::Integer(kpi.total_orders));
        row.insert("total_revenue", Value::Float(kpi.total_revenue));
        row.insert("total_items_sold", Value::Integer(kpi.total_items_sold));
        row.insert("return_rate", Value::Float(kpi.return_rate));
        row.insert("unique_customers", Value::Integer(kpi.unique_customers));
        row
    }
}
