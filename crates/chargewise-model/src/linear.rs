//! Linear charge model evaluated over the Arrow feature table.
//!
//! The artifact is a JSON document:
//!
//! ```json
//! {
//!   "intercept": -2200.0,
//!   "numeric": { "age": 256.9, "bmi": 339.2, "children": 475.5 },
//!   "categorical": {
//!     "smoker": { "no": 0.0, "yes": 23848.5 },
//!     "sex": { "female": 0.0, "male": -131.3 },
//!     "region": { "northeast": 0.0, "northwest": -353.0, "southeast": -1035.0, "southwest": -960.1 }
//!   },
//!   "interactions": [
//!     { "column": "smoker", "level": "yes", "numeric": "bmi", "coefficient": 1430.0 }
//!   ]
//! }
//! ```
//!
//! Every categorical level the feature table can contain must be listed,
//! reference levels with a zero offset.

use std::collections::BTreeMap;

use arrow::array::{Array, Float64Array, Int32Array, Int64Array, LargeStringArray, StringArray};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Evaluation failures. Any of these means the artifact and the feature table
/// disagree about the input contract.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature table is missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        found: String,
        expected: &'static str,
    },

    #[error("null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("unknown level '{level}' in column '{column}'")]
    UnknownLevel { column: String, level: String },

    #[error("model produced no output")]
    EmptyOutput,

    #[error("model produced a non-finite estimate: {0}")]
    NonFinite(f64),
}

/// A trained regression model over the feature table.
///
/// Returns one estimate per input row, in row order.
pub trait RegressionModel: Send + Sync {
    fn predict(&self, features: &RecordBatch) -> Result<Vec<f64>, ModelError>;
}

/// `categorical level × numeric column` term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub column: String,
    pub level: String,
    pub numeric: String,
    pub coefficient: f64,
}

/// Linear model with one-hot encoded categorical offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    #[serde(default)]
    pub numeric: BTreeMap<String, f64>,
    #[serde(default)]
    pub categorical: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl LinearModel {
    /// Parse a model from its JSON artifact text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Every column the model reads, sorted and deduplicated.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = self
            .numeric
            .keys()
            .chain(self.categorical.keys())
            .map(String::as_str)
            .chain(
                self.interactions
                    .iter()
                    .flat_map(|i| [i.column.as_str(), i.numeric.as_str()]),
            )
            .collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }
}

impl RegressionModel for LinearModel {
    fn predict(&self, features: &RecordBatch) -> Result<Vec<f64>, ModelError> {
        let n = features.num_rows();
        let mut out = vec![self.intercept; n];

        for (name, &coef) in &self.numeric {
            let values = numeric_column(features, name)?;
            for (acc, v) in out.iter_mut().zip(values) {
                *acc += coef * v;
            }
        }

        for (name, levels) in &self.categorical {
            let values = string_column(features, name)?;
            for (acc, level) in out.iter_mut().zip(values) {
                let offset = levels.get(&level).ok_or_else(|| ModelError::UnknownLevel {
                    column: name.clone(),
                    level: level.clone(),
                })?;
                *acc += offset;
            }
        }

        for term in &self.interactions {
            let levels = string_column(features, &term.column)?;
            let values = numeric_column(features, &term.numeric)?;
            for ((acc, level), v) in out.iter_mut().zip(levels).zip(values) {
                if level == term.level {
                    *acc += term.coefficient * v;
                }
            }
        }

        Ok(out)
    }
}

// ── Column access ──

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn Array, ModelError> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| ModelError::MissingColumn(name.to_string()))
}

/// Read a numeric column as f64, accepting the integer widths Arrow sources produce.
fn numeric_column(batch: &RecordBatch, name: &str) -> Result<Vec<f64>, ModelError> {
    let col = column(batch, name)?;
    let mut out = Vec::with_capacity(col.len());
    for row in 0..col.len() {
        if col.is_null(row) {
            return Err(ModelError::NullValue {
                column: name.to_string(),
                row,
            });
        }
        let value = if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
            arr.value(row)
        } else if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
            arr.value(row) as f64
        } else if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
            f64::from(arr.value(row))
        } else {
            return Err(ModelError::ColumnType {
                column: name.to_string(),
                found: col.data_type().to_string(),
                expected: "numeric",
            });
        };
        out.push(value);
    }
    Ok(out)
}

/// Read a string column, handling both `Utf8` and `LargeUtf8`.
fn string_column(batch: &RecordBatch, name: &str) -> Result<Vec<String>, ModelError> {
    let col = column(batch, name)?;
    let mut out = Vec::with_capacity(col.len());
    for row in 0..col.len() {
        if col.is_null(row) {
            return Err(ModelError::NullValue {
                column: name.to_string(),
                row,
            });
        }
        let value = if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
            arr.value(row).to_string()
        } else if let Some(arr) = col.as_any().downcast_ref::<LargeStringArray>() {
            arr.value(row).to_string()
        } else {
            return Err(ModelError::ColumnType {
                column: name.to_string(),
                found: col.data_type().to_string(),
                expected: "string",
            });
        };
        out.push(value);
    }
    Ok(out)
}
