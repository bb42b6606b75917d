//! Tabular values exchanged between data sources and extractors.

use crate::error::{SourceError, ValidationError};
use crate::value::FeatureValue;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw query result: column names plus row-major values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FeatureValue>>,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Convert to a [`Table`] indexed by `index_column`.
    pub fn into_table(self, index_column: &str) -> Result<Table, SourceError> {
        let index_pos = self
            .columns
            .iter()
            .position(|c| c == index_column)
            .ok_or_else(|| SourceError::MissingIndexColumn {
                column: index_column.to_string(),
            })?;

        let columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index_pos)
            .map(|(_, c)| c.clone())
            .collect();

        let mut table = Table::new(index_column, columns);
        for mut row in self.rows {
            row.resize(self.columns.len(), FeatureValue::Null);
            let key = row.remove(index_pos).to_field();
            table.push_row(key, row);
        }
        Ok(table)
    }
}

/// A column-major table with a string row index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    index_name: String,
    index: Vec<String>,
    columns: Vec<String>,
    data: Vec<Vec<FeatureValue>>,
}

impl Table {
    pub fn new(index_name: &str, columns: Vec<String>) -> Self {
        let data = vec![Vec::new(); columns.len()];
        Self {
            index_name: index_name.to_string(),
            index: Vec::new(),
            columns,
            data,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    /// Append a row. Missing trailing values are padded with nulls.
    pub fn push_row(&mut self, key: impl Into<String>, mut values: Vec<FeatureValue>) {
        values.resize(self.columns.len(), FeatureValue::Null);
        self.index.push(key.into());
        for (column, value) in self.data.iter_mut().zip(values) {
            column.push(value);
        }
    }

    pub fn column(&self, name: &str) -> Option<&[FeatureValue]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    /// Iterate `(column name, values)` pairs in column order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &[FeatureValue])> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.data.iter().map(Vec::as_slice))
    }

    /// Add or replace a column.
    pub fn set_column(
        &mut self,
        name: &str,
        values: Vec<FeatureValue>,
    ) -> Result<(), ValidationError> {
        if values.len() != self.index.len() {
            return Err(ValidationError::RaggedColumn {
                column: name.to_string(),
                expected: self.index.len(),
                actual: values.len(),
            });
        }
        match self.columns.iter().position(|c| c == name) {
            Some(i) => self.data[i] = values,
            None => {
                self.columns.push(name.to_string());
                self.data.push(values);
            }
        }
        Ok(())
    }

    /// Remove a column, returning its values if present.
    pub fn drop_column(&mut self, name: &str) -> Option<Vec<FeatureValue>> {
        let i = self.columns.iter().position(|c| c == name)?;
        self.columns.remove(i);
        Some(self.data.remove(i))
    }

    /// Keep only the first row for every duplicated index key.
    pub fn dedup_keep_first(&mut self) -> usize {
        let mut seen = HashSet::new();
        let keep: Vec<bool> = self.index.iter().map(|k| seen.insert(k.clone())).collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped == 0 {
            return 0;
        }
        let mut flags = keep.iter();
        self.index.retain(|_| *flags.next().unwrap_or(&false));
        for column in &mut self.data {
            let mut flags = keep.iter();
            column.retain(|_| *flags.next().unwrap_or(&false));
        }
        dropped
    }

    /// Replace nulls in every numeric column with that column's median.
    pub fn fill_null_with_median(&mut self) {
        for column in &mut self.data {
            let mut numeric: Vec<f64> = column.iter().filter_map(FeatureValue::as_f64).collect();
            let has_text = column.iter().any(|v| matches!(v, FeatureValue::Text(_)));
            if numeric.is_empty() || has_text {
                continue;
            }
            numeric.sort_by(|a, b| a.total_cmp(b));
            let mid = numeric.len() / 2;
            let median = if numeric.len() % 2 == 0 {
                (numeric[mid - 1] + numeric[mid]) / 2.0
            } else {
                numeric[mid]
            };
            for value in column.iter_mut().filter(|v| v.is_null()) {
                *value = FeatureValue::float(median);
            }
        }
    }
}
