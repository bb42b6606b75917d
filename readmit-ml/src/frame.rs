//! Numeric feature frames.
//!
//! A [`FeatureFrame`] is the row-major `f64` view of the feature matrix that
//! selectors, normalizers, samplers and models operate on. Missing cells are
//! NaN.

use crate::error::{MlError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    columns: Vec<String>,
    row_keys: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl FeatureFrame {
    pub fn new(columns: Vec<String>, row_keys: Vec<String>, data: Vec<Vec<f64>>) -> Result<Self> {
        if row_keys.len() != data.len() {
            return Err(MlError::invalid_input(format!(
                "{} row keys for {} rows",
                row_keys.len(),
                data.len()
            )));
        }
        if let Some((i, row)) = data.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(MlError::invalid_input(format!(
                "row {i} has {} values, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            row_keys,
            data,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_keys(&self) -> &[String] {
        &self.row_keys
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i]
    }

    pub fn n_rows(&self) -> usize {
        self.data.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, j: usize) -> Vec<f64> {
        self.data.iter().map(|row| row[j]).collect()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        self.column_index(name).map(|j| self.column_values(j))
    }

    /// Rows at `indices`, in that order. Indices may repeat.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            row_keys: indices.iter().map(|&i| self.row_keys[i].clone()).collect(),
            data: indices.iter().map(|&i| self.data[i].clone()).collect(),
        }
    }

    /// Rows where `mask` is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Self {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take_rows(&indices)
    }

    /// The named columns, in the given order.
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let positions = names
            .iter()
            .map(|name| {
                self.column_index(name.as_ref())
                    .ok_or_else(|| MlError::not_found(format!("column '{}'", name.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns: names.iter().map(|n| n.as_ref().to_string()).collect(),
            row_keys: self.row_keys.clone(),
            data: self
                .data
                .iter()
                .map(|row| positions.iter().map(|&j| row[j]).collect())
                .collect(),
        })
    }

    /// Same rows, new columns. `data` must have one row per row key.
    pub fn with_data(&self, columns: Vec<String>, data: Vec<Vec<f64>>) -> Result<Self> {
        Self::new(columns, self.row_keys.clone(), data)
    }

    /// Apply `f(column index, value)` to every cell.
    pub fn map_cells(&self, f: impl Fn(usize, f64) -> f64) -> Self {
        Self {
            columns: self.columns.clone(),
            row_keys: self.row_keys.clone(),
            data: self
                .data
                .iter()
                .map(|row| row.iter().enumerate().map(|(j, &v)| f(j, v)).collect())
                .collect(),
        }
    }

    /// Ensure `other` has exactly this frame's columns.
    pub fn check_same_columns(&self, other: &[String]) -> Result<()> {
        if self.columns.as_slice() != other {
            return Err(MlError::invalid_input(format!(
                "frame has columns {:?}, fitted on {:?}",
                self.columns, other
            )));
        }
        Ok(())
    }
}

/// Finite values of a column, skipping NaN and infinities.
pub fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FeatureFrame {
        FeatureFrame::new(
            vec!["a".into(), "b".into()],
            vec!["1".into(), "2".into(), "3".into()],
            vec![vec![1.0, 10.0], vec![2.0, f64::NAN], vec![3.0, 30.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = FeatureFrame::new(vec!["a".into()], vec!["1".into()], vec![vec![1.0, 2.0]]);
        assert!(err.is_err());
    }

    #[test]
    fn test_take_and_filter_rows() {
        let f = frame();
        let taken = f.take_rows(&[2, 0]);
        assert_eq!(taken.row_keys(), &["3", "1"]);
        let filtered = f.filter_rows(&[false, true, true]);
        assert_eq!(filtered.column("a").unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_select_columns() {
        let f = frame();
        let b = f.select_columns(&["b"]).unwrap();
        assert_eq!(b.n_cols(), 1);
        assert_eq!(b.row(0), &[10.0]);
        assert!(f.select_columns(&["zzz"]).is_err());
    }

    #[test]
    fn test_stats_helpers() {
        let col = frame().column("b").unwrap();
        assert_eq!(finite(&col), vec![10.0, 30.0]);
        assert_eq!(mean(&finite(&col)), Some(20.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[]), None);
    }
}
