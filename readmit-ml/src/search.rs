//! Randomized hyperparameter search scored by cross-validated AUC.

use crate::error::{MlError, Result};
use crate::frame::FeatureFrame;
use crate::metrics::roc_auc;
use crate::models::{Params, Trainable};
use crate::pipeline::Preprocessing;
use crate::splitters::{kfold_indices, rng_for};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Parameter distribution for random search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamDistribution {
    Uniform { min: f64, max: f64 },
    LogUniform { min: f64, max: f64 },
    Choice { values: Vec<serde_json::Value> },
    IntRange { min: i64, max: i64 },
}

impl ParamDistribution {
    fn validate(&self, name: &str) -> Result<()> {
        let ok = match self {
            Self::Uniform { min, max } => min <= max,
            Self::LogUniform { min, max } => *min > 0.0 && min <= max,
            Self::Choice { values } => !values.is_empty(),
            Self::IntRange { min, max } => min <= max,
        };
        if ok {
            Ok(())
        } else {
            Err(MlError::config(format!("invalid distribution for '{name}': {self:?}")))
        }
    }

    pub fn sample(&self, rng: &mut StdRng) -> serde_json::Value {
        match self {
            Self::Uniform { min, max } if min < max => rng.gen_range(*min..*max).into(),
            Self::Uniform { min, .. } => (*min).into(),
            Self::LogUniform { min, max } if min < max => rng.gen_range(min.ln()..max.ln()).exp().into(),
            Self::LogUniform { min, .. } => (*min).into(),
            Self::Choice { values } => values[rng.gen_range(0..values.len())].clone(),
            Self::IntRange { min, max } => rng.gen_range(*min..=*max).into(),
        }
    }
}

/// Search space by parameter name.
pub type SearchSpace = BTreeMap<String, ParamDistribution>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Failed,
}

/// A single search trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTrial {
    pub trial_number: usize,
    pub params: Params,
    /// Mean AUC over the inner folds where it is defined.
    pub metric: Option<f64>,
    pub status: TrialStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub model: String,
    pub trials: Vec<SearchTrial>,
    pub best_trial: Option<usize>,
}

impl SearchResult {
    pub fn best(&self) -> Option<&SearchTrial> {
        self.best_trial.and_then(|i| self.trials.get(i))
    }

    pub fn best_params(&self) -> Option<&Params> {
        self.best().map(|t| &t.params)
    }
}

/// Random search over a [`SearchSpace`], each candidate scored by k-fold
/// cross validation on a single training set.
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    pub space: SearchSpace,
    pub n_iter: usize,
    pub cv: usize,
    pub seed: Option<u64>,
}

impl RandomizedSearch {
    pub fn new(space: SearchSpace, n_iter: usize) -> Self {
        Self {
            space,
            n_iter,
            cv: 3,
            seed: None,
        }
    }

    pub fn with_cv(mut self, cv: usize) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Candidate parameter sets, reproducible for a fixed seed.
    pub fn generate_trials(&self) -> Result<Vec<Params>> {
        for (name, dist) in &self.space {
            dist.validate(name)?;
        }
        let mut rng = rng_for(self.seed);
        Ok((0..self.n_iter)
            .map(|_| {
                self.space
                    .iter()
                    .map(|(name, dist)| (name.clone(), dist.sample(&mut rng)))
                    .collect()
            })
            .collect())
    }

    pub fn run(
        &self,
        model: &dyn Trainable,
        train: &FeatureFrame,
        labels: &[u8],
        mut pre: Preprocessing<'_>,
    ) -> Result<SearchResult> {
        if self.n_iter == 0 {
            return Err(MlError::config("n_iter must be at least 1"));
        }
        if self.cv < 2 || train.n_rows() < self.cv {
            return Err(MlError::config(format!(
                "cannot run {}-fold cross validation on {} rows",
                self.cv,
                train.n_rows()
            )));
        }
        let candidates = self.generate_trials()?;
        let groups = kfold_indices(train.n_rows(), self.cv, self.seed);
        info!(
            model = model.name(),
            n_iter = self.n_iter,
            cv = self.cv,
            "starting randomized search"
        );

        let mut result = SearchResult {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.name().to_string(),
            trials: Vec::with_capacity(candidates.len()),
            best_trial: None,
        };
        for (trial_number, params) in candidates.into_iter().enumerate() {
            let trial = match self.score(model, &params, train, labels, &groups, &mut pre) {
                Ok(metric) => SearchTrial {
                    trial_number,
                    params,
                    metric,
                    status: TrialStatus::Completed,
                    error: None,
                },
                Err(e) => {
                    warn!(trial_number, error = %e, "search trial failed");
                    SearchTrial {
                        trial_number,
                        params,
                        metric: None,
                        status: TrialStatus::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };
            result.trials.push(trial);
        }

        result.best_trial = result
            .trials
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.metric.map(|m| (i, m)))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i);
        match result.best() {
            Some(best) => info!(trial = best.trial_number, auc = ?best.metric, "best search trial"),
            None => {
                return Err(MlError::evaluation(format!(
                    "no search trial for '{}' produced an AUC",
                    model.name()
                )));
            }
        }
        Ok(result)
    }

    fn score(
        &self,
        model: &dyn Trainable,
        params: &Params,
        train: &FeatureFrame,
        labels: &[u8],
        groups: &[Vec<usize>],
        pre: &mut Preprocessing<'_>,
    ) -> Result<Option<f64>> {
        let mut aucs = Vec::with_capacity(groups.len());
        for (g, held_out) in groups.iter().enumerate() {
            let inner: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != g)
                .flat_map(|(_, group)| group.iter().copied())
                .collect();
            let inner_labels: Vec<u8> = inner.iter().map(|&i| labels[i]).collect();
            let held_labels: Vec<u8> = held_out.iter().map(|&i| labels[i]).collect();
            let (x_train, y_train, x_test) =
                pre.apply(&train.take_rows(&inner), &inner_labels, &train.take_rows(held_out))?;

            let mut candidate = model.fresh_copy();
            candidate.set_params(params)?;
            candidate.fit(&x_train, &y_train)?;
            let scores = candidate.predict_proba(&x_test)?;
            if let Some(auc) = roc_auc(&held_labels, &scores) {
                aucs.push(auc);
            }
        }
        Ok((!aucs.is_empty()).then(|| aucs.iter().sum::<f64>() / aucs.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogisticRegression;
    use serde_json::json;

    fn space() -> SearchSpace {
        SearchSpace::from([
            (
                "learning_rate".to_string(),
                ParamDistribution::LogUniform { min: 0.01, max: 1.0 },
            ),
            ("max_iter".to_string(), ParamDistribution::IntRange { min: 10, max: 50 }),
            (
                "warm_start".to_string(),
                ParamDistribution::Choice {
                    values: vec![json!(false)],
                },
            ),
        ])
    }

    fn frame() -> (FeatureFrame, Vec<u8>) {
        let data: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels = (0..12).map(|i| u8::from(i >= 6)).collect();
        let keys = (0..12).map(|i| i.to_string()).collect();
        (
            FeatureFrame::new(vec!["x".into(), "noise".into()], keys, data).unwrap(),
            labels,
        )
    }

    #[test]
    fn test_trials_are_sampled_within_bounds_and_reproducible() {
        let search = RandomizedSearch::new(space(), 8).with_seed(Some(5));
        let a = search.generate_trials().unwrap();
        assert_eq!(a, search.generate_trials().unwrap());
        for params in &a {
            let lr = params["learning_rate"].as_f64().unwrap();
            assert!((0.01..=1.0).contains(&lr));
            let iters = params["max_iter"].as_i64().unwrap();
            assert!((10..=50).contains(&iters));
            assert_eq!(params["warm_start"], json!(false));
        }
    }

    #[test]
    fn test_invalid_distribution_rejected() {
        let bad = SearchSpace::from([(
            "lr".to_string(),
            ParamDistribution::LogUniform { min: 0.0, max: 1.0 },
        )]);
        assert!(RandomizedSearch::new(bad, 1).generate_trials().is_err());
    }

    #[test]
    fn test_search_picks_a_best_trial() {
        let (x, y) = frame();
        let search = RandomizedSearch::new(space(), 3).with_cv(3).with_seed(Some(2));
        let result = search
            .run(&LogisticRegression::new(), &x, &y, Preprocessing::default())
            .unwrap();
        assert_eq!(result.trials.len(), 3);
        let best = result.best().unwrap();
        assert!(result.trials.iter().all(|t| t.metric <= best.metric));
        assert!(result.best_params().unwrap().contains_key("learning_rate"));
    }

    #[test]
    fn test_failed_trials_are_recorded() {
        let (x, y) = frame();
        let space = SearchSpace::from([(
            "depth".to_string(),
            ParamDistribution::IntRange { min: 1, max: 3 },
        )]);
        let err = RandomizedSearch::new(space, 2)
            .with_seed(Some(1))
            .run(&LogisticRegression::new(), &x, &y, Preprocessing::default());
        assert!(matches!(err, Err(MlError::Evaluation(_))));
    }
}
