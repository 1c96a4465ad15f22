//! Aggregation adapter boundary.
//!
//! The join/group-by engine is an external collaborator: this module only
//! consumes its output, an ordered sequence of aggregated rows per table.
//! The file-backed adapter reads NDJSON (one JSON object per row), the
//! interchange format the engine writes its per-table results to.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use snafu::prelude::*;
use std::path::{Path, PathBuf};

use crate::error::{
    JsonParseSnafu, NotAnObjectSnafu, ReadRowsSnafu, SourceError, UnsupportedJsonSnafu,
};
use crate::model::{MetricRow, Value};

/// Supplies the aggregated rows for one table.
#[async_trait]
pub trait AggregationSource: Send + Sync {
    /// Materialize the full ordered row set.
    async fn load(&self) -> Result<Vec<MetricRow>, SourceError>;
}

/// File-backed adapter reading one NDJSON file of aggregated rows.
pub struct NdjsonSource {
    path: PathBuf,
}

impl NdjsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AggregationSource for NdjsonSource {
    async fn load(&self) -> Result<Vec<MetricRow>, SourceError> {
        read_ndjson_rows(&self.path).await
    }
}

/// Read all rows from an NDJSON file. Blank lines are skipped.
pub async fn read_ndjson_rows(path: &Path) -> Result<Vec<MetricRow>, SourceError> {
    let display = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .context(ReadRowsSnafu { path: display.as_str() })?;

    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let json: JsonValue = serde_json::from_str(line).context(JsonParseSnafu {
            path: display.as_str(),
            line: line_no,
        })?;
        rows.push(row_from_json(json, &display, line_no)?);
    }
    Ok(rows)
}

/// Convert one JSON object into a metric row.
///
/// Integral numbers map to `Integer`, fractional ones to `Float` (the
/// normalizer converts those to decimals later). Nulls, booleans, and
/// arrays have no place in an aggregated row and are refused.
fn row_from_json(json: JsonValue, path: &str, line: usize) -> Result<MetricRow, SourceError> {
    let JsonValue::Object(map) = json else {
        return NotAnObjectSnafu { path, line }.fail();
    };

    let mut row = MetricRow::new();
    for (field, value) in map {
        let converted = value_from_json(&value).context(UnsupportedJsonSnafu {
            path,
            line,
            field: field.as_str(),
        })?;
        row.insert(field, converted);
    }
    Ok(row)
}

fn value_from_json(json: &JsonValue) -> Option<Value> {
    match json {
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Integer(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        JsonValue::Object(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), value_from_json(v)?);
            }
            Some(Value::Map(out))
        }
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Array(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_ndjson(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_rows_in_order() {
        let file = write_ndjson(concat!(
            "{\"order_date\":\"2024-01-05\",\"total_orders\":10,\"total_revenue\":1234.5}\n",
            "\n",
            "{\"order_date\":\"2024-01-06\",\"total_orders\":3,\"total_revenue\":99.0}\n",
        ));

        let rows = NdjsonSource::new(file.path()).load().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get("order_date"),
            Some(&Value::String("2024-01-05".to_string()))
        );
        assert_eq!(rows[0].get("total_orders"), Some(&Value::Integer(10)));
        assert_eq!(rows[0].get("total_revenue"), Some(&Value::Float(1234.5)));
        assert_eq!(rows[1].get("total_orders"), Some(&Value::Integer(3)));
    }

    #[tokio::test]
    async fn test_nested_object() {
        let file = write_ndjson(
            "{\"order_date\":\"2024-01-05\",\"breakdown\":{\"Books\":12.5,\"Games\":3}}\n",
        );

        let rows = read_ndjson_rows(file.path()).await.unwrap();
        let Some(Value::Map(map)) = rows[0].get("breakdown") else {
            panic!("expected nested map");
        };
        assert_eq!(map.get("Books"), Some(&Value::Float(12.5)));
        assert_eq!(map.get("Games"), Some(&Value::Integer(3)));
    }

    #[tokio::test]
    async fn test_invalid_json_reports_line() {
        let file = write_ndjson("{\"ok\":1}\nnot json\n");

        let err = read_ndjson_rows(file.path()).await.unwrap_err();
        assert!(matches!(err, SourceError::JsonParse { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_null_value_is_unsupported() {
        let file = write_ndjson("{\"order_date\":null}\n");

        let err = read_ndjson_rows(file.path()).await.unwrap_err();
        match err {
            SourceError::UnsupportedJson { field, line, .. } => {
                assert_eq!(field, "order_date");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_object_line() {
        let file = write_ndjson("[1,2,3]\n");

        let err = read_ndjson_rows(file.path()).await.unwrap_err();
        assert!(matches!(err, SourceError::NotAnObject { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = read_ndjson_rows(Path::new("/nonexistent/rows.ndjson"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::ReadRows { .. }));
    }
}
