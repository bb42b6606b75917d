//! Last measured vital signs.
//!
//! Temperature, pulse, respiratory rate and blood pressure are emitted as
//! queried. Height is converted to whole inches and weight from ounces to
//! pounds; remaining gaps take the column median.

use super::ROW_KEY_COLUMN;
use crate::error::Result;
use crate::extractor::{Emitter, ExtractionContext, FeatureExtractor};
use crate::value::FeatureValue;

const QUERY: &str = "SELECT hsp_acct_study_id, \
    temperature, pulse, respirations, bp_systolic, bp_diastolic, \
    height, weight, bmi \
    FROM {schema}.bayes_m_vw_feature_vitals";

#[derive(Debug, Clone, Copy, Default)]
pub struct VitalsExtractor;

impl FeatureExtractor for VitalsExtractor {
    fn name(&self) -> &str {
        "VitalsExtractor"
    }

    fn version(&self) -> u32 {
        1
    }

    fn definition(&self) -> String {
        QUERY.to_string()
    }

    fn extract(&self, ctx: &ExtractionContext<'_>, out: &mut Emitter) -> Result<()> {
        let mut table = ctx.query_table(QUERY, ROW_KEY_COLUMN)?;

        let heights = table.drop_column("height").unwrap_or_default();
        let weights = table.drop_column("weight").unwrap_or_default();
        if !heights.is_empty() {
            let inches: Vec<FeatureValue> = heights
                .iter()
                .map(|v| FeatureValue::from(v.as_str().and_then(height_to_inches)))
                .collect();
            table.set_column("height_in_inches", inches)?;
        }
        if !weights.is_empty() {
            let pounds: Vec<FeatureValue> = weights
                .iter()
                .map(|v| FeatureValue::from(v.as_f64().map(|oz| oz / 16.0)))
                .collect();
            table.set_column("weight_in_lb", pounds)?;
        }

        table.fill_null_with_median();
        out.emit_table(table)
    }
}

/// Parse a height like `7' 0.0"` into whole inches.
fn height_to_inches(height: &str) -> Option<i64> {
    let cleaned = height.replace('"', "");
    let mut parts = cleaned.split('\'');
    let feet: f64 = parts.next()?.trim().parse().ok()?;
    let inches: f64 = parts.next()?.trim().parse().ok()?;
    Some((12.0 * feet + inches).round() as i64)
}
