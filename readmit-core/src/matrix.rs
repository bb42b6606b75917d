//! Wide feature matrix assembly and its delimited-file form.
//!
//! The matrix is the outer join of every extractor's records: one row per
//! row key and one column per feature key, both sorted, so the same records
//! always serialize to the same bytes.

use crate::error::{CoreError, Result};
use crate::persistence::atomic_write;
use crate::store::{FeatureRecords, MetaStore};
use crate::value::FeatureValue;
use std::path::Path;
use tracing::info;

/// Dense, row-major feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    index_name: String,
    columns: Vec<String>,
    row_keys: Vec<String>,
    rows: Vec<Vec<FeatureValue>>,
}

impl FeatureMatrix {
    /// Pivot long-form records into a matrix.
    ///
    /// A cell that is absent or null takes the column's declared missing
    /// sentinel when it has one and stays null otherwise.
    pub fn assemble(index_name: &str, records: &FeatureRecords, meta: &MetaStore) -> Self {
        let columns: Vec<String> = records
            .feature_keys()
            .into_iter()
            .map(str::to_string)
            .collect();
        let fills = meta.fill_values();

        let mut row_keys = Vec::with_capacity(records.row_count());
        let mut rows = Vec::with_capacity(records.row_count());
        for row_key in records.row_keys() {
            let cells = records.row(row_key);
            let row = columns
                .iter()
                .map(|column| {
                    let value = cells.and_then(|c| c.get(column)).filter(|v| !v.is_null());
                    match (value, fills.get(column.as_str())) {
                        (Some(v), _) => v.clone(),
                        (None, Some(fill)) => (*fill).clone(),
                        (None, None) => FeatureValue::Null,
                    }
                })
                .collect();
            row_keys.push(row_key.to_string());
            rows.push(row);
        }

        Self {
            index_name: index_name.to_string(),
            columns,
            row_keys,
            rows,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_keys(&self) -> &[String] {
        &self.row_keys
    }

    pub fn rows(&self) -> &[Vec<FeatureValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row_key: &str, column: &str) -> Option<&FeatureValue> {
        let col = self.column_position(column)?;
        let row = self.row_keys.iter().position(|k| k == row_key)?;
        self.rows[row].get(col)
    }

    /// Number of null cells in the matrix.
    pub fn null_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|v| v.is_null())
            .count()
    }

    /// Render as comma-delimited text with a header line.
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        let header = std::iter::once(self.index_name.as_str())
            .chain(self.columns.iter().map(String::as_str));
        write_record(&mut out, header.map(quote_field));
        for (key, row) in self.row_keys.iter().zip(&self.rows) {
            let fields = std::iter::once(quote_field(key))
                .chain(row.iter().map(|v| quote_field(&v.to_field())));
            write_record(&mut out, fields);
        }
        out
    }

    /// Atomically write the matrix to `path`.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.to_csv_string().as_bytes())?;
        info!(
            path = %path.display(),
            rows = self.row_count(),
            columns = self.column_count(),
            "wrote feature matrix"
        );
        Ok(())
    }

    /// Parse delimited text written by [`to_csv_string`](Self::to_csv_string).
    ///
    /// The first header field names the index column.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut records = parse_csv(text).into_iter();
        let header = records
            .next()
            .ok_or_else(|| invalid_data("empty matrix file".to_string()))?;
        let mut header = header.into_iter();
        let index_name = header.next().unwrap_or_default();
        let columns: Vec<String> = header.collect();

        let mut row_keys = Vec::new();
        let mut rows = Vec::new();
        for (line, record) in records.enumerate() {
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            if record.len() != columns.len() + 1 {
                return Err(invalid_data(format!(
                    "matrix row {} has {} fields, expected {}",
                    line + 2,
                    record.len(),
                    columns.len() + 1
                )));
            }
            let mut fields = record.into_iter();
            row_keys.push(fields.next().unwrap_or_default());
            rows.push(fields.map(|f| FeatureValue::parse_field(&f)).collect());
        }

        Ok(Self {
            index_name,
            columns,
            row_keys,
            rows,
        })
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv_str(&text)
    }
}

fn invalid_data(message: String) -> CoreError {
    CoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

fn write_record(out: &mut String, fields: impl Iterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        out.push_str(&field);
        first = false;
    }
    out.push('\n');
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split delimited text into records, honoring quoted fields that contain
/// separators, doubled quotes or line breaks.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> (FeatureRecords, MetaStore) {
        let mut records = FeatureRecords::new();
        let mut meta = MetaStore::new();
        records.insert("2", "A__count", FeatureValue::Int(3));
        records.insert("1", "B__note", FeatureValue::from("chf, acute"));
        records.insert("1", "A__flag_bool", FeatureValue::Bool(true));
        meta.declare("A__count", Some(FeatureValue::Int(0))).unwrap();
        meta.declare("A__flag_bool", Some(FeatureValue::Bool(false))).unwrap();
        meta.declare("B__note", None).unwrap();
        (records, meta)
    }

    #[test]
    fn test_assemble_sorts_and_fills() {
        let (records, meta) = sample();
        let matrix = FeatureMatrix::assemble("hsp_acct_study_id", &records, &meta);

        assert_eq!(matrix.columns(), &["A__count", "A__flag_bool", "B__note"]);
        assert_eq!(matrix.row_keys(), &["1", "2"]);
        assert_eq!(matrix.get("1", "A__count"), Some(&FeatureValue::Int(0)));
        assert_eq!(matrix.get("2", "A__flag_bool"), Some(&FeatureValue::Bool(false)));
        assert_eq!(matrix.get("2", "B__note"), Some(&FeatureValue::Null));
        assert_eq!(matrix.null_count(), 1);
    }

    #[test]
    fn test_csv_output() {
        let (records, meta) = sample();
        let matrix = FeatureMatrix::assemble("hsp_acct_study_id", &records, &meta);
        assert_eq!(
            matrix.to_csv_string(),
            "hsp_acct_study_id,A__count,A__flag_bool,B__note\n\
             1,0,True,\"chf, acute\"\n\
             2,3,False,\n"
        );
    }

    #[test]
    fn test_csv_read_back() {
        let (records, meta) = sample();
        let matrix = FeatureMatrix::assemble("hsp_acct_study_id", &records, &meta);
        let back = FeatureMatrix::from_csv_str(&matrix.to_csv_string()).unwrap();
        assert_eq!(back, matrix);
    }

    #[test]
    fn test_parse_csv_quoted_newline() {
        let records = parse_csv("a,b\n\"x\ny\",\"say \"\"hi\"\"\"\n");
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["x\ny".to_string(), "say \"hi\"".to_string()],
            ]
        );
    }

    #[test]
    fn test_ragged_row_is_error() {
        assert!(FeatureMatrix::from_csv_str("id,a,b\n1,2\n").is_err());
    }
}
