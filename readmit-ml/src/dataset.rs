//! Loading the feature matrix into features and labels.

use crate::config::LabelColumns;
use crate::error::{MlError, Result};
use crate::frame::{FeatureFrame, finite, mean};
use chrono::{NaiveDate, NaiveDateTime};
use readmit_core::{FeatureMatrix, FeatureValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

/// Suffix of categorical text columns that are one-hot encoded.
pub const CATEGORICAL_SUFFIX: &str = "_cat";

/// Parse a date or timestamp as written by SQL sources.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and the `T`-separated form,
/// with optional fractional seconds.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Label inputs for every visit, parallel to the feature frame rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelFrame {
    pub row_keys: Vec<String>,
    pub days_to_readmit: Vec<Option<f64>>,
    pub admit: Vec<Option<NaiveDateTime>>,
    pub discharge: Vec<Option<NaiveDateTime>>,
}

impl LabelFrame {
    pub fn len(&self) -> usize {
        self.row_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_keys.is_empty()
    }

    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            row_keys: indices.iter().map(|&i| self.row_keys[i].clone()).collect(),
            days_to_readmit: indices.iter().map(|&i| self.days_to_readmit[i]).collect(),
            admit: indices.iter().map(|&i| self.admit[i]).collect(),
            discharge: indices.iter().map(|&i| self.discharge[i]).collect(),
        }
    }
}

/// Features and labels for the same visits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: FeatureFrame,
    pub labels: LabelFrame,
}

impl Dataset {
    pub fn new(features: FeatureFrame, labels: LabelFrame) -> Result<Self> {
        if features.n_rows() != labels.len() {
            return Err(MlError::dataset(format!(
                "{} feature rows but {} label rows",
                features.n_rows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.take_rows(indices),
            labels: self.labels.take_rows(indices),
        }
    }

    /// Read a matrix file written by the Databuilder.
    pub fn load_csv(path: &Path, labels: &LabelColumns, dummify: bool) -> Result<Self> {
        if !path.exists() {
            return Err(MlError::not_found(format!("dataset {}", path.display())));
        }
        let matrix = FeatureMatrix::read_csv(path)?;
        info!("Loaded {} rows.", matrix.row_count());
        Self::from_matrix(&matrix, labels, dummify)
    }

    /// Split a feature matrix into a numeric feature frame and label inputs.
    ///
    /// Every column under the label group prefix becomes a label input, never
    /// a feature. Booleans and numbers become floats with gaps filled by the
    /// column mean; `_cat` columns of any type are one-hot encoded when
    /// `dummify` is set; any other text column is dropped.
    pub fn from_matrix(matrix: &FeatureMatrix, labels: &LabelColumns, dummify: bool) -> Result<Self> {
        let column = |name: &str| {
            matrix
                .column_position(name)
                .ok_or_else(|| MlError::dataset(format!("missing label column '{name}'")))
        };
        let days_pos = column(&labels.days_to_readmit)?;
        let admit_pos = column(&labels.admit_date_time)?;
        let discharge_pos = column(&labels.discharge_date_time)?;

        let rows = matrix.rows();
        let label_frame = LabelFrame {
            row_keys: matrix.row_keys().to_vec(),
            days_to_readmit: rows.iter().map(|r| r[days_pos].as_f64()).collect(),
            admit: rows.iter().map(|r| timestamp(&r[admit_pos])).collect(),
            discharge: rows.iter().map(|r| timestamp(&r[discharge_pos])).collect(),
        };

        let mut columns: Vec<String> = Vec::new();
        let mut values: Vec<Vec<f64>> = Vec::new();
        let mut dropped: Vec<&str> = Vec::new();
        for (j, name) in matrix.columns().iter().enumerate() {
            if labels.is_label_column(name) {
                continue;
            }
            let cells: Vec<&FeatureValue> = rows.iter().map(|r| &r[j]).collect();
            let is_text = cells.iter().any(|v| matches!(v, FeatureValue::Text(_)));
            if dummify && name.ends_with(CATEGORICAL_SUFFIX) {
                let categories: BTreeSet<String> = cells
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_field())
                    .collect();
                for category in categories {
                    columns.push(format!("{name}_{category}"));
                    values.push(
                        cells
                            .iter()
                            .map(|v| if v.to_field() == category { 1.0 } else { 0.0 })
                            .collect(),
                    );
                }
            } else if !is_text {
                columns.push(name.clone());
                values.push(impute_mean(cells.iter().map(|v| v.as_f64())));
            } else {
                dropped.push(name);
            }
        }
        if !dropped.is_empty() {
            warn!(columns = ?dropped, "dropping non-numeric feature columns");
        }

        let data: Vec<Vec<f64>> = (0..matrix.row_count())
            .map(|i| values.iter().map(|col| col[i]).collect())
            .collect();
        let features = FeatureFrame::new(columns, matrix.row_keys().to_vec(), data)?;
        info!(
            rows = features.n_rows(),
            features = features.n_cols(),
            "split matrix into features and labels"
        );
        Self::new(features, label_frame)
    }
}

fn timestamp(value: &FeatureValue) -> Option<NaiveDateTime> {
    value.as_str().and_then(parse_timestamp)
}

fn impute_mean(values: impl Iterator<Item = Option<f64>>) -> Vec<f64> {
    let column: Vec<f64> = values.map(|v| v.unwrap_or(f64::NAN)).collect();
    match mean(&finite(&column)) {
        Some(fill) => column
            .into_iter()
            .map(|v| if v.is_finite() { v } else { fill })
            .collect(),
        None => column,
    }
}
