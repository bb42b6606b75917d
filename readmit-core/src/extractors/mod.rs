//! Bundled feature extractors.
//!
//! - [`ReadmissionExtractor`]: readmission labels and the admit/discharge timestamps
//! - [`VitalsExtractor`]: last measured vital signs
//! - [`HospitalProblemsExtractor`]: one flag per HCUP CCS category plus a count
//! - [`SqlExtractor`]: feature groups declared in configuration

pub mod hospital_problems;
pub mod readmission;
pub mod sql;
pub mod vitals;

pub use hospital_problems::HospitalProblemsExtractor;
pub use readmission::ReadmissionExtractor;
pub use sql::SqlExtractor;
pub use vitals::VitalsExtractor;

use crate::config::ExtractionConfig;
use crate::extractor::FeatureExtractor;

/// Index column shared by every bundled query.
pub const ROW_KEY_COLUMN: &str = "hsp_acct_study_id";

/// The built-in extractors followed by every configured SQL extractor.
pub fn default_extractors(config: &ExtractionConfig) -> Vec<Box<dyn FeatureExtractor>> {
    let mut extractors: Vec<Box<dyn FeatureExtractor>> = vec![
        Box::new(ReadmissionExtractor),
        Box::new(VitalsExtractor),
        Box::new(HospitalProblemsExtractor),
    ];
    extractors.extend(
        config
            .extractors
            .iter()
            .cloned()
            .map(|def| Box::new(SqlExtractor::new(def)) as Box<dyn FeatureExtractor>),
    );
    extractors
}
