//! Property-based tests for the record store merge algebra.

use proptest::prelude::*;

use readmit_core::{FeatureMatrix, FeatureRecords, FeatureValue, MetaStore, merge_nested};
use std::collections::BTreeMap;

type Cells = Vec<(u8, u8, i64)>;

fn records(prefix: &str, cells: &Cells) -> FeatureRecords {
    let mut records = FeatureRecords::new();
    for (row, feature, value) in cells {
        records.insert(
            &row.to_string(),
            &format!("{prefix}__f{feature}"),
            FeatureValue::Int(*value),
        );
    }
    records
}

fn cells() -> impl Strategy<Value = Cells> {
    prop::collection::vec((0u8..12, 0u8..6, any::<i64>()), 0..40)
}

proptest! {
    #[test]
    fn merge_commutes_for_disjoint_features(a in cells(), b in cells()) {
        let left = records("A", &a).merge(records("B", &b));
        let right = records("B", &b).merge(records("A", &a));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_is_associative(a in cells(), b in cells(), c in cells()) {
        // Shared prefix, so collisions exercise the right bias too.
        let left = records("A", &a).merge(records("A", &b)).merge(records("A", &c));
        let right = records("A", &a).merge(records("A", &b).merge(records("A", &c)));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_with_empty_is_identity(a in cells()) {
        let base = records("A", &a);
        prop_assert_eq!(base.clone().merge(FeatureRecords::new()), base.clone());
        prop_assert_eq!(FeatureRecords::new().merge(base.clone()), base);
    }

    #[test]
    fn merge_keeps_every_cell(a in cells(), b in cells()) {
        let left = records("A", &a);
        let right = records("B", &b);
        let expected = left.cell_count() + right.cell_count();
        prop_assert_eq!(left.merge(right).cell_count(), expected);
    }

    #[test]
    fn nested_merge_is_right_biased(
        row in "[0-9]{1,3}",
        feature in "[a-z]{1,8}",
        x in any::<i64>(),
        y in any::<i64>(),
    ) {
        let mut a: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        a.entry(row.clone()).or_default().insert(feature.clone(), x);
        let mut b: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        b.entry(row.clone()).or_default().insert(feature.clone(), y);
        let merged = merge_nested(a, b);
        prop_assert_eq!(merged[&row][&feature], y);
    }

    #[test]
    fn matrix_csv_is_order_independent(a in cells(), b in cells()) {
        let meta = MetaStore::new();
        let forward = FeatureMatrix::assemble("id", &records("A", &a).merge(records("B", &b)), &meta);
        let reverse = FeatureMatrix::assemble("id", &records("B", &b).merge(records("A", &a)), &meta);
        prop_assert_eq!(forward.to_csv_string(), reverse.to_csv_string());
    }
}
