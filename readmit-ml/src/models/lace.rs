//! The LACE index as a fixed scoring model.
//!
//! LACE sums four points-based components (length of stay, acuity,
//! comorbidity and emergency visits). The maximum score is 19, so dividing by
//! 20 maps it into `[0, 1)`.

use super::{Params, Trainable, unknown_param};
use crate::error::{MlError, Result};
use crate::frame::FeatureFrame;

/// Feature keys of the four LACE components.
pub const LACE_COLUMNS: [&str; 4] = [
    "DischargeExtractor__length_of_stay_lace",
    "AdmissionExtractor__acuity_lace",
    "ComorbiditiesExtractor__charlson_index_lace",
    "UtilizationExtractor__er_visits_lace",
];

const LACE_SCALE: f64 = 20.0;

#[derive(Debug, Clone, Default)]
pub struct LaceModel;

impl LaceModel {
    pub fn new() -> Self {
        Self
    }

    fn positions(x: &FeatureFrame) -> Result<Vec<usize>> {
        LACE_COLUMNS
            .iter()
            .map(|c| {
                x.column_index(c)
                    .ok_or_else(|| MlError::model(format!("LACE column '{c}' missing")))
            })
            .collect()
    }
}

impl Trainable for LaceModel {
    fn name(&self) -> &str {
        "lace"
    }

    fn fresh_copy(&self) -> Box<dyn Trainable> {
        Box::new(Self)
    }

    fn params(&self) -> Params {
        Params::new()
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        match params.keys().next() {
            Some(name) => Err(unknown_param(self.name(), name)),
            None => Ok(()),
        }
    }

    fn fit(&mut self, x: &FeatureFrame, _y: &[u8]) -> Result<()> {
        Self::positions(x).map(|_| ())
    }

    fn predict_proba(&self, x: &FeatureFrame) -> Result<Vec<f64>> {
        let positions = Self::positions(x)?;
        Ok(x.rows()
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|&j| row[j])
                    .filter(|v| v.is_finite())
                    .sum::<f64>()
                    / LACE_SCALE
            })
            .collect())
    }
}
