//! Configuration types for the evaluation harness.
//!
//! Loaded as the `[evaluation]` section of the layered readmit configuration.

use crate::dataset::parse_timestamp;
use crate::error::{MlError, Result};
use crate::splitters::{Holdout, KFold, Splitter, Temporal};
use readmit_core::extractor::KEY_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Evaluation harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Feature matrix written by the Databuilder.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    /// Readmission window; a visit is positive when readmitted within it.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,
    #[serde(default)]
    pub splitter: SplitterConfig,
    /// Seed for random splitters, samplers and searches.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Share of visits flagged for intervention in single evaluations.
    #[serde(default = "default_intervention_pct")]
    pub intervention_pct: f64,
    /// Percentages compared by the intervention simulation.
    #[serde(default = "default_intervention_pcts")]
    pub intervention_pcts: Vec<f64>,
    /// Column prefix of the per-condition cohort flags.
    #[serde(default = "default_cohort_prefix")]
    pub cohort_prefix: String,
    /// Restrict evaluation to visits with any of these conditions.
    #[serde(default)]
    pub health_conditions: Vec<String>,
    /// Dummify text columns ending in `_cat` instead of dropping them.
    #[serde(default = "default_true")]
    pub dummify_categorical: bool,
    #[serde(default)]
    pub labels: LabelColumns,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            horizon_days: default_horizon_days(),
            splitter: SplitterConfig::default(),
            seed: None,
            intervention_pct: default_intervention_pct(),
            intervention_pcts: default_intervention_pcts(),
            cohort_prefix: default_cohort_prefix(),
            health_conditions: Vec::new(),
            dummify_categorical: true,
            labels: LabelColumns::default(),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("features.csv")
}

fn default_horizon_days() -> i64 {
    30
}

fn default_intervention_pct() -> f64 {
    25.0
}

fn default_intervention_pcts() -> Vec<f64> {
    vec![5.0, 10.0, 15.0, 20.0, 25.0]
}

fn default_cohort_prefix() -> String {
    "HospitalProblemsExtractor__hcup_category_".to_string()
}

fn default_true() -> bool {
    true
}

/// Matrix columns holding the label inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelColumns {
    #[serde(default = "default_days_to_readmit")]
    pub days_to_readmit: String,
    #[serde(default = "default_admit_date_time")]
    pub admit_date_time: String,
    #[serde(default = "default_discharge_date_time")]
    pub discharge_date_time: String,
}

impl Default for LabelColumns {
    fn default() -> Self {
        Self {
            days_to_readmit: default_days_to_readmit(),
            admit_date_time: default_admit_date_time(),
            discharge_date_time: default_discharge_date_time(),
        }
    }
}

impl LabelColumns {
    /// Feature-key prefix shared by the label columns, e.g.
    /// `ReadmissionExtractor__`. Every column under it is kept out of the
    /// feature frame.
    pub fn group_prefix(&self) -> Option<&str> {
        self.days_to_readmit
            .find(KEY_SEPARATOR)
            .map(|i| &self.days_to_readmit[..i + KEY_SEPARATOR.len()])
    }

    pub fn is_label_column(&self, column: &str) -> bool {
        match self.group_prefix() {
            Some(prefix) => column.starts_with(prefix),
            None => {
                column == self.days_to_readmit
                    || column == self.admit_date_time
                    || column == self.discharge_date_time
            }
        }
    }
}

fn default_days_to_readmit() -> String {
    "ReadmissionExtractor__days_to_readmit".to_string()
}

fn default_admit_date_time() -> String {
    "ReadmissionExtractor__admit_date_time".to_string()
}

fn default_discharge_date_time() -> String {
    "ReadmissionExtractor__discharge_date_time".to_string()
}

/// Which splitter to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitterConfig {
    Holdout { test_size: f64 },
    KFold { n_folds: usize },
    /// `split_at` is a date (`2020-03-01`) or timestamp (`2020-03-01 12:00:00`).
    Temporal { split_at: String },
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::Holdout { test_size: 0.3 }
    }
}

impl SplitterConfig {
    pub fn build(&self) -> Result<Box<dyn Splitter>> {
        let splitter: Box<dyn Splitter> = match self {
            Self::Holdout { test_size } => Box::new(Holdout::new(*test_size)?),
            Self::KFold { n_folds } => Box::new(KFold::new(*n_folds)?),
            Self::Temporal { split_at } => {
                let cutoff = parse_timestamp(split_at).ok_or_else(|| {
                    MlError::config(format!("split_at '{split_at}' is not a date or timestamp"))
                })?;
                Box::new(Temporal::new(cutoff))
            }
        };
        Ok(splitter)
    }
}
