//! Type normalization for sink compatibility.
//!
//! The key-value sink accepts strings, integers, and fixed-precision
//! decimals, plus nested mappings of those. It does not accept native
//! dates or binary floats, so every row passes through [`normalize_row`]
//! before the upsert:
//!
//! - calendar dates become ISO-8601 `YYYY-MM-DD` strings, at any depth
//! - floats become exact decimals, parsed from the float's shortest
//!   round-trip display form so `1234.5` lands as `Decimal("1234.5")`
//!   rather than its binary expansion
//! - strings, integers, and decimals pass through unchanged
//!
//! A value that cannot be converted fails that row only; the caller treats
//! it as a per-record failure.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{DecimalOverflowSnafu, NonFiniteFloatSnafu, NormalizeError};
use crate::model::{MetricRow, Value};
use snafu::prelude::*;

/// Produce a structurally equivalent row whose values conform to the
/// sink's accepted type set.
pub fn normalize_row(row: &MetricRow) -> Result<MetricRow, NormalizeError> {
    row.iter()
        .map(|(name, value)| Ok((name.clone(), normalize_value(name, value)?)))
        .collect()
}

fn normalize_value(field: &str, value: &Value) -> Result<Value, NormalizeError> {
    match value {
        Value::String(_) | Value::Integer(_) | Value::Decimal(_) => Ok(value.clone()),
        Value::Date(date) => Ok(Value::String(date.format("%Y-%m-%d").to_string())),
        Value::Float(f) => float_to_decimal(field, *f).map(Value::Decimal),
        Value::Map(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (name, nested) in map {
                // Attribute nested failures to the full dotted path.
                let path = format!("{}.{}", field, name);
                out.insert(name.clone(), normalize_value(&path, nested)?);
            }
            Ok(Value::Map(out))
        }
    }
}

/// Convert a float to an exact decimal via its shortest display form.
fn float_to_decimal(field: &str, f: f64) -> Result<Decimal, NormalizeError> {
    ensure!(f.is_finite(), NonFiniteFloatSnafu { field });

    let text = f.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .context(DecimalOverflowSnafu { field, value: f })
}
