//! Trainable models.

pub mod lace;
pub mod logistic;

pub use lace::LaceModel;
pub use logistic::LogisticRegression;

use crate::error::{MlError, Result};
use crate::frame::FeatureFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hyperparameters by name.
pub type Params = BTreeMap<String, serde_json::Value>;

/// What [`Trainable::fresh_copy`] carries over from the source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopySemantics {
    /// Hyperparameters only; the copy is unfitted.
    Reset,
    /// Hyperparameters and fitted weights, used as the starting point of the
    /// next fit.
    WarmStart,
}

/// A binary classifier the evaluation pipeline can train per fold.
pub trait Trainable {
    fn name(&self) -> &str;

    /// A copy to fit on a new fold. The source model is never mutated by the
    /// pipeline; every fold trains its own copy.
    fn fresh_copy(&self) -> Box<dyn Trainable>;

    fn copy_semantics(&self) -> CopySemantics {
        CopySemantics::Reset
    }

    fn params(&self) -> Params;

    fn set_params(&mut self, params: &Params) -> Result<()>;

    fn fit(&mut self, x: &FeatureFrame, y: &[u8]) -> Result<()>;

    /// Probability of the positive class for every row of `x`.
    fn predict_proba(&self, x: &FeatureFrame) -> Result<Vec<f64>>;
}

pub(crate) fn param_f64(name: &str, value: &serde_json::Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| MlError::model(format!("parameter '{name}' expects a number, got {value}")))
}

pub(crate) fn param_usize(name: &str, value: &serde_json::Value) -> Result<usize> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0 && v.fract() == 0.0).map(|v| v as u64))
        .map(|v| v as usize)
        .ok_or_else(|| MlError::model(format!("parameter '{name}' expects a count, got {value}")))
}

pub(crate) fn param_bool(name: &str, value: &serde_json::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| MlError::model(format!("parameter '{name}' expects a boolean, got {value}")))
}

pub(crate) fn unknown_param(model: &str, name: &str) -> MlError {
    MlError::model(format!("unknown parameter '{name}' for model '{model}'"))
}
