//! Sparse feature record store and its merge algebra.
//!
//! Extracted data lives in long form (`row key -> feature key -> value`)
//! until the Databuilder assembles the wide matrix. All maps are ordered so
//! that anything derived from a store is deterministic.

use crate::error::{CoreError, Result};
use crate::value::FeatureValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Nested map keyed by row key, then feature key.
pub type NestedMap<V> = BTreeMap<String, BTreeMap<String, V>>;

/// Deep, right-biased union of two nested maps.
///
/// Inner maps are merged key by key; a cell present in both inputs takes the
/// value from `b`. With disjoint `(row, feature)` cells the result does not
/// depend on argument order.
pub fn merge_nested<V>(mut a: NestedMap<V>, b: NestedMap<V>) -> NestedMap<V> {
    for (row, cells) in b {
        a.entry(row).or_default().extend(cells);
    }
    a
}

/// Long-form feature values for one or more extractors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecords {
    rows: NestedMap<FeatureValue>,
}

impl FeatureRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row_key: &str, feature_key: &str, value: FeatureValue) {
        self.rows
            .entry(row_key.to_string())
            .or_default()
            .insert(feature_key.to_string(), value);
    }

    pub fn get(&self, row_key: &str, feature_key: &str) -> Option<&FeatureValue> {
        self.rows.get(row_key).and_then(|cells| cells.get(feature_key))
    }

    pub fn row(&self, row_key: &str) -> Option<&BTreeMap<String, FeatureValue>> {
        self.rows.get(row_key)
    }

    pub fn row_keys(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn feature_keys(&self) -> BTreeSet<&str> {
        self.rows
            .values()
            .flat_map(|cells| cells.keys().map(String::as_str))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            rows: merge_nested(self.rows, other.rows),
        }
    }
}

/// Per-column metadata declared at emission time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Value used to fill cells the column never received.
    pub missing: Option<FeatureValue>,
}

/// Column metadata for every emitted feature key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaStore {
    columns: BTreeMap<String, ColumnMeta>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the missing sentinel declared for `feature_key`.
    ///
    /// The first declaration wins; any later declaration must be identical.
    /// A `Some(Null)` sentinel is the same as no sentinel.
    pub fn declare(&mut self, feature_key: &str, missing: Option<FeatureValue>) -> Result<()> {
        let missing = missing.filter(|v| !v.is_null());
        match self.columns.get(feature_key) {
            Some(meta) if meta.missing != missing => Err(CoreError::MetaInconsistent {
                feature: feature_key.to_string(),
                previous: meta.missing.clone(),
                current: missing,
            }),
            Some(_) => Ok(()),
            None => {
                self.columns
                    .insert(feature_key.to_string(), ColumnMeta { missing });
                Ok(())
            }
        }
    }

    pub fn get(&self, feature_key: &str) -> Option<&ColumnMeta> {
        self.columns.get(feature_key)
    }

    /// Non-null fill values keyed by feature.
    pub fn fill_values(&self) -> BTreeMap<&str, &FeatureValue> {
        self.columns
            .iter()
            .filter_map(|(k, m)| m.missing.as_ref().map(|v| (k.as_str(), v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Right-biased union.
    pub fn merge(mut self, other: Self) -> Self {
        self.columns.extend(other.columns);
        self
    }
}

/// Debug annotations, parallel to [`FeatureRecords`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugRecords {
    rows: NestedMap<String>,
}

impl DebugRecords {
    pub fn insert(&mut self, row_key: &str, feature_key: &str, note: String) {
        self.rows
            .entry(row_key.to_string())
            .or_default()
            .insert(feature_key.to_string(), note);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The annotations as feature records of text values.
    pub fn to_records(&self) -> FeatureRecords {
        let mut records = FeatureRecords::new();
        for (row, cells) in &self.rows {
            for (feature, note) in cells {
                records.insert(row, feature, FeatureValue::Text(note.clone()));
            }
        }
        records
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            rows: merge_nested(self.rows, other.rows),
        }
    }
}

/// Everything one extractor emitted during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractorOutput {
    pub records: FeatureRecords,
    pub meta: MetaStore,
    #[serde(default, skip_serializing_if = "DebugRecords::is_empty")]
    pub debug: DebugRecords,
}

impl ExtractorOutput {
    pub fn merge(self, other: Self) -> Self {
        Self {
            records: self.records.merge(other.records),
            meta: self.meta.merge(other.meta),
            debug: self.debug.merge(other.debug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_is_deep() {
        let mut a = FeatureRecords::new();
        a.insert("1", "A__x", FeatureValue::Int(1));
        let mut b = FeatureRecords::new();
        b.insert("1", "B__y", FeatureValue::Int(2));

        let merged = a.merge(b);
        assert_eq!(merged.row_count(), 1);
        assert_eq!(merged.get("1", "A__x"), Some(&FeatureValue::Int(1)));
        assert_eq!(merged.get("1", "B__y"), Some(&FeatureValue::Int(2)));
    }

    #[test]
    fn test_merge_right_biased_on_collision() {
        let mut a = FeatureRecords::new();
        a.insert("1", "A__x", FeatureValue::Int(1));
        let mut b = FeatureRecords::new();
        b.insert("1", "A__x", FeatureValue::Int(9));
        assert_eq!(a.merge(b).get("1", "A__x"), Some(&FeatureValue::Int(9)));
    }

    #[test]
    fn test_declare_same_sentinel_twice() {
        let mut meta = MetaStore::new();
        meta.declare("A__x", Some(FeatureValue::Int(0))).unwrap();
        meta.declare("A__x", Some(FeatureValue::Int(0))).unwrap();
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_declare_conflicting_sentinel() {
        let mut meta = MetaStore::new();
        meta.declare("A__x", None).unwrap();
        let err = meta.declare("A__x", Some(FeatureValue::Int(0))).unwrap_err();
        assert!(matches!(err, CoreError::MetaInconsistent { .. }));
    }

    #[test]
    fn test_fill_values_skip_null_sentinels() {
        let mut meta = MetaStore::new();
        meta.declare("A__x", None).unwrap();
        meta.declare("A__y", Some(FeatureValue::Bool(false))).unwrap();
        let fills = meta.fill_values();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills["A__y"], &FeatureValue::Bool(false));
    }

    #[test]
    fn test_debug_records_to_records() {
        let mut debug = DebugRecords::default();
        debug.insert("7", "A__x", "from problem list".into());
        let records = debug.to_records();
        assert_eq!(
            records.get("7", "A__x"),
            Some(&FeatureValue::Text("from problem list".into()))
        );
    }

    #[test]
    fn test_output_json_roundtrip() {
        let mut out = ExtractorOutput::default();
        out.records.insert("1", "A__x", FeatureValue::Float(1.5));
        out.meta.declare("A__x", Some(FeatureValue::Int(0))).unwrap();
        let json = serde_json::to_string(&out).unwrap();
        let back: ExtractorOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, out);
    }
}
