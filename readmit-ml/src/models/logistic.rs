//! L2-regularized logistic regression trained by batch gradient descent.

use super::{CopySemantics, Params, Trainable, param_bool, param_f64, param_usize, unknown_param};
use crate::error::{MlError, Result};
use crate::frame::FeatureFrame;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub l2: f64,
    pub tol: f64,
    pub warm_start: bool,
    weights: Option<Vec<f64>>,
    bias: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 500,
            l2: 0.0,
            tol: 1e-6,
            warm_start: false,
            weights: None,
            bias: 0.0,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn cell(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn is_fitted(&self) -> bool {
        self.weights.is_some()
    }

    fn score(&self, weights: &[f64], row: &[f64]) -> f64 {
        self.bias + row.iter().zip(weights).map(|(&x, w)| cell(x) * w).sum::<f64>()
    }
}

impl Trainable for LogisticRegression {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn fresh_copy(&self) -> Box<dyn Trainable> {
        let mut copy = self.clone();
        if !self.warm_start {
            copy.weights = None;
            copy.bias = 0.0;
        }
        Box::new(copy)
    }

    fn copy_semantics(&self) -> CopySemantics {
        if self.warm_start {
            CopySemantics::WarmStart
        } else {
            CopySemantics::Reset
        }
    }

    fn params(&self) -> Params {
        Params::from([
            ("learning_rate".to_string(), json!(self.learning_rate)),
            ("max_iter".to_string(), json!(self.max_iter)),
            ("l2".to_string(), json!(self.l2)),
            ("tol".to_string(), json!(self.tol)),
            ("warm_start".to_string(), json!(self.warm_start)),
        ])
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "learning_rate" => self.learning_rate = param_f64(name, value)?,
                "max_iter" => self.max_iter = param_usize(name, value)?,
                "l2" => self.l2 = param_f64(name, value)?,
                "tol" => self.tol = param_f64(name, value)?,
                "warm_start" => self.warm_start = param_bool(name, value)?,
                _ => return Err(unknown_param(self.name(), name)),
            }
        }
        if self.learning_rate <= 0.0 || self.l2 < 0.0 {
            return Err(MlError::model(format!(
                "invalid parameters: learning_rate={}, l2={}",
                self.learning_rate, self.l2
            )));
        }
        Ok(())
    }

    fn fit(&mut self, x: &FeatureFrame, y: &[u8]) -> Result<()> {
        if x.n_rows() != y.len() {
            return Err(MlError::invalid_input(format!(
                "{} rows for {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(MlError::model("cannot fit on zero rows"));
        }
        let p = x.n_cols();
        let n = x.n_rows() as f64;
        let mut weights = match self.weights.take() {
            Some(w) if self.warm_start && w.len() == p => w,
            _ => {
                self.bias = 0.0;
                vec![0.0; p]
            }
        };

        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let mut grad = vec![0.0; p];
            let mut grad_bias = 0.0;
            for (row, &label) in x.rows().iter().zip(y) {
                let err = sigmoid(self.score(&weights, row)) - f64::from(label);
                grad_bias += err;
                for (g, &v) in grad.iter_mut().zip(row) {
                    *g += err * cell(v);
                }
            }
            let mut largest = (grad_bias / n).abs();
            for (g, w) in grad.iter_mut().zip(&weights) {
                *g = *g / n + self.l2 * w;
                largest = largest.max(g.abs());
            }
            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= self.learning_rate * g;
            }
            self.bias -= self.learning_rate * grad_bias / n;
            if largest < self.tol {
                break;
            }
        }
        debug!(iterations, features = p, "fitted logistic regression");
        self.weights = Some(weights);
        Ok(())
    }

    fn predict_proba(&self, x: &FeatureFrame) -> Result<Vec<f64>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| MlError::model("logistic regression is not fitted"))?;
        if x.n_cols() != weights.len() {
            return Err(MlError::invalid_input(format!(
                "model fitted on {} features, got {}",
                weights.len(),
                x.n_cols()
            )));
        }
        Ok(x.rows().iter().map(|row| sigmoid(self.score(weights, row))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (FeatureFrame, Vec<u8>) {
        let data: Vec<Vec<f64>> = vec![
            vec![-2.0],
            vec![-1.5],
            vec![-1.0],
            vec![1.0],
            vec![1.5],
            vec![2.0],
        ];
        let keys = (0..data.len()).map(|i| i.to_string()).collect();
        (
            FeatureFrame::new(vec!["x".into()], keys, data).unwrap(),
            vec![0, 0, 0, 1, 1, 1],
        )
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        let p = model.predict_proba(&x).unwrap();
        assert!(p[0] < 0.2);
        assert!(p[5] > 0.8);
        assert!(p.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_non_finite_inputs_count_as_zero() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        let nan = FeatureFrame::new(vec!["x".into()], vec!["n".into()], vec![vec![f64::NAN]]).unwrap();
        let zero = FeatureFrame::new(vec!["x".into()], vec!["z".into()], vec![vec![0.0]]).unwrap();
        assert_eq!(model.predict_proba(&nan).unwrap(), model.predict_proba(&zero).unwrap());
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let (x, _) = separable();
        assert!(matches!(LogisticRegression::new().predict_proba(&x), Err(MlError::Model(_))));
    }

    #[test]
    fn test_fresh_copy_resets_unless_warm_start() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.copy_semantics(), CopySemantics::Reset);
        assert!(model.fresh_copy().predict_proba(&x).is_err());

        model.warm_start = true;
        assert_eq!(model.copy_semantics(), CopySemantics::WarmStart);
        assert!(model.fresh_copy().predict_proba(&x).is_ok());
    }

    #[test]
    fn test_set_params() {
        let mut model = LogisticRegression::new();
        let params = Params::from([
            ("learning_rate".to_string(), json!(0.5)),
            ("max_iter".to_string(), json!(20)),
        ]);
        model.set_params(&params).unwrap();
        assert_eq!(model.learning_rate, 0.5);
        assert_eq!(model.max_iter, 20);

        let bad = Params::from([("depth".to_string(), json!(3))]);
        assert!(model.set_params(&bad).is_err());
        let negative = Params::from([("l2".to_string(), json!(-1.0))]);
        assert!(model.set_params(&negative).is_err());
    }
}
