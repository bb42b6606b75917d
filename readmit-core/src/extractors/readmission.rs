//! Readmission labels.
//!
//! Emits `days_to_readmit` (complete days after discharge before the next
//! admission, null when the patient never came back) together with
//! `admit_date_time` and `discharge_date_time`, which the evaluation harness
//! uses to drop visits that were not observed long enough.

use super::ROW_KEY_COLUMN;
use crate::error::Result;
use crate::extractor::{Emitter, ExtractionContext, FeatureExtractor};
use tracing::info;

const QUERY: &str = "SELECT * FROM {schema}.bayes_vw_feature_labels";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadmissionExtractor;

impl FeatureExtractor for ReadmissionExtractor {
    fn name(&self) -> &str {
        "ReadmissionExtractor"
    }

    fn version(&self) -> u32 {
        1
    }

    fn definition(&self) -> String {
        QUERY.to_string()
    }

    fn extract(&self, ctx: &ExtractionContext<'_>, out: &mut Emitter) -> Result<()> {
        let mut table = ctx.query_table(QUERY, ROW_KEY_COLUMN)?;
        let dropped = table.dedup_keep_first();
        if dropped > 0 {
            info!(dropped, "dropped duplicate visits from labels");
        }
        out.emit_table(table)
    }
}
