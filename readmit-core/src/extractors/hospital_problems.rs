//! Hospital problem list, pivoted to one flag per HCUP CCS category.

use super::ROW_KEY_COLUMN;
use crate::error::{Result, SourceError};
use crate::extractor::{Emitter, ExtractionContext, FeatureExtractor};
use crate::table::Table;
use crate::value::FeatureValue;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

const QUERY: &str = "SELECT hsp_acct_study_id, ccs_category_description \
    FROM {schema}.bayes_vw_feature_hospital_problems";

const CATEGORY_COLUMN: &str = "ccs_category_description";

/// Prefix of the per-category flag columns; cohort filters select on it.
pub const CATEGORY_PREFIX: &str = "hcup_category_";

/// Column-safe form of a CCS description: lowercase ASCII alphanumerics with
/// every other run of characters collapsed to one `_`.
pub fn category_slug(description: &str) -> String {
    let mut slug = String::with_capacity(description.len());
    for c in description.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HospitalProblemsExtractor;

impl FeatureExtractor for HospitalProblemsExtractor {
    fn name(&self) -> &str {
        "HospitalProblemsExtractor"
    }

    fn version(&self) -> u32 {
        2
    }

    fn definition(&self) -> String {
        QUERY.to_string()
    }

    fn extract(&self, ctx: &ExtractionContext<'_>, out: &mut Emitter) -> Result<()> {
        let rows = ctx.source().query(&ctx.render_query(QUERY))?;
        info!("The queried table has {} rows.", rows.row_count());

        let position = |name: &str| {
            rows.columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| SourceError::MissingIndexColumn {
                    column: name.to_string(),
                })
        };
        let key_pos = position(ROW_KEY_COLUMN)?;
        let category_pos = position(CATEGORY_COLUMN)?;

        // Visits in first-seen order, each with its set of categories.
        let mut order: Vec<String> = Vec::new();
        let mut problems: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in &rows.rows {
            let key = row.get(key_pos).map(FeatureValue::to_field).unwrap_or_default();
            let entry = problems.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                BTreeSet::new()
            });
            if let Some(category) = row.get(category_pos).and_then(FeatureValue::as_str) {
                let slug = category_slug(category);
                if !slug.is_empty() {
                    entry.insert(slug);
                }
            }
        }

        let categories: BTreeSet<&str> = problems
            .values()
            .flat_map(|set| set.iter().map(String::as_str))
            .collect();
        let mut columns: Vec<String> = categories
            .iter()
            .map(|c| format!("{CATEGORY_PREFIX}{c}"))
            .collect();
        columns.push("hospital_problems_count".to_string());

        let mut table = Table::new(ROW_KEY_COLUMN, columns);
        for key in &order {
            let present = &problems[key];
            let mut values: Vec<FeatureValue> = categories
                .iter()
                .map(|c| FeatureValue::Bool(present.contains(*c)))
                .collect();
            values.push(FeatureValue::Int(present.len() as i64));
            table.push_row(key.clone(), values);
        }
        out.emit_table(table)
    }
}
