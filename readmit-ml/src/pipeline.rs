//! The evaluation pipeline: build folds, train models per fold, evaluate and
//! compare them.

use crate::dataset::Dataset;
use crate::error::{MlError, Result};
use crate::frame::FeatureFrame;
use crate::metrics::{FoldMetrics, combine_fold_metrics, get_metrics, percentile};
use crate::models::{Params, Trainable};
use crate::normalize::Normalizer;
use crate::sampling::Sampler;
use crate::search::{RandomizedSearch, SearchResult, SearchSpace};
use crate::selectors::FeatureSelector;
use crate::splitters::{Fold, Splitter};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Optional preprocessing applied per fold, fitted on training rows only.
#[derive(Default)]
pub struct Preprocessing<'a> {
    pub selector: Option<&'a mut dyn FeatureSelector>,
    pub normalizer: Option<&'a mut dyn Normalizer>,
    pub sampler: Option<&'a mut dyn Sampler>,
}

impl<'a> Preprocessing<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(mut self, selector: &'a mut dyn FeatureSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_normalizer(mut self, normalizer: &'a mut dyn Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_sampler(mut self, sampler: &'a mut dyn Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Select, normalize, then resample. Returns the training frame, its
    /// (possibly resampled) labels and the transformed test frame.
    pub fn apply(
        &mut self,
        train: &FeatureFrame,
        labels: &[u8],
        test: &FeatureFrame,
    ) -> Result<(FeatureFrame, Vec<u8>, FeatureFrame)> {
        let (mut train, mut test) = (train.clone(), test.clone());
        if let Some(selector) = self.selector.as_deref_mut() {
            selector.fit(&train, labels)?;
            train = selector.select(&train)?;
            test = selector.select(&test)?;
        }
        if let Some(normalizer) = self.normalizer.as_deref_mut() {
            normalizer.fit(&train)?;
            train = normalizer.transform(&train)?;
            test = normalizer.transform(&test)?;
        }
        let mut labels = labels.to_vec();
        if let Some(sampler) = self.sampler.as_deref_mut() {
            (train, labels) = sampler.fit_sample(&train, &labels)?;
        }
        Ok((train, labels, test))
    }
}

/// Restricts evaluation to test rows whose `column` satisfies `predicate`.
pub struct RowFilter {
    pub column: String,
    pub predicate: Box<dyn Fn(f64) -> bool>,
}

impl RowFilter {
    pub fn new(column: impl Into<String>, predicate: impl Fn(f64) -> bool + 'static) -> Self {
        Self {
            column: column.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Rows where the flag column equals 1.
    pub fn flag(column: impl Into<String>) -> Self {
        Self::new(column, |v| v == 1.0)
    }
}

/// One model trained on one fold.
pub struct ModelRun {
    pub id: Uuid,
    pub model: Box<dyn Trainable>,
    pub train_predictions: Vec<f64>,
    pub test_predictions: Vec<f64>,
    pub train_time_secs: f64,
    pub trained_at: DateTime<Utc>,
}

/// One row of an intervention simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRow {
    #[serde(rename = "%")]
    pub pct: f64,
    pub num_intervened: Option<f64>,
    pub num_intervened_correct: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub specificity: Option<f64>,
}

fn round3(value: Option<f64>) -> Option<f64> {
    value.map(|v| (v * 1000.0).round() / 1000.0)
}

pub struct Pipeline {
    dataset: Dataset,
    cohort_prefix: String,
    folds: Vec<Fold>,
    models: BTreeMap<String, Vec<ModelRun>>,
}

impl Pipeline {
    pub fn new(dataset: Dataset, cohort_prefix: impl Into<String>) -> Self {
        Self {
            dataset,
            cohort_prefix: cohort_prefix.into(),
            folds: Vec::new(),
            models: BTreeMap::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn model_runs(&self, name: &str) -> Option<&[ModelRun]> {
        self.models.get(name).map(Vec::as_slice)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn num_features(&self) -> usize {
        self.dataset.features.n_cols()
    }

    pub fn clear_models(&mut self) {
        self.models.clear();
    }

    /// Build the folds every model is trained and evaluated on.
    ///
    /// Only visits discharged strictly before the latest admission minus
    /// `horizon_days` are kept. With
    /// `health_conditions`, only visits flagged with at least one of them are
    /// kept. Previously built folds and trained models are discarded, also
    /// when splitting fails.
    pub fn build_train_and_test_sets(
        &mut self,
        horizon_days: i64,
        splitter: &dyn Splitter,
        seed: Option<u64>,
        health_conditions: &[String],
    ) -> Result<()> {
        let labels = &self.dataset.labels;
        let latest = labels
            .admit
            .iter()
            .flatten()
            .max()
            .copied()
            .ok_or_else(|| MlError::dataset("no admission timestamps in dataset"))?;
        let cutoff = latest - Duration::days(horizon_days);
        let mut keep: Vec<bool> = labels
            .discharge
            .iter()
            .map(|d| d.is_some_and(|d| d < cutoff))
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        info!(
            "Dropping {} visits discharged after {} ({} days before the last admission).",
            dropped, cutoff, horizon_days
        );

        if !health_conditions.is_empty() {
            let features = &self.dataset.features;
            let mut in_cohort = vec![false; features.n_rows()];
            for condition in health_conditions {
                let column = format!("{}{}", self.cohort_prefix, condition);
                let Some(j) = features.column_index(&column) else {
                    warn!(condition = %condition, column = %column, "unknown health condition");
                    continue;
                };
                for (i, row) in features.rows().iter().enumerate() {
                    in_cohort[i] |= row[j] == 1.0;
                }
            }
            for (k, c) in keep.iter_mut().zip(&in_cohort) {
                *k &= *c;
            }
            info!(conditions = ?health_conditions, "restricted to health condition cohort");
        }

        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.then_some(i))
            .collect();
        if indices.is_empty() {
            return Err(MlError::dataset("no visits left after filtering"));
        }
        let subset = self.dataset.take_rows(&indices);
        self.folds.clear();
        self.models.clear();
        self.folds = splitter.split(&subset, horizon_days as f64, seed)?;
        info!(
            splitter = splitter.name(),
            rows = subset.len(),
            folds = self.folds.len(),
            "built train and test sets"
        );
        Ok(())
    }

    /// Train `model` on every fold and store the runs under `name`.
    ///
    /// Each fold trains its own [`Trainable::fresh_copy`] with `params`
    /// applied; the source model is left untouched.
    pub fn train_model(
        &mut self,
        name: &str,
        model: &dyn Trainable,
        mut pre: Preprocessing<'_>,
        params: &Params,
    ) -> Result<()> {
        if self.folds.is_empty() {
            return Err(MlError::evaluation(
                "no folds; build train and test sets before training",
            ));
        }
        info!("Training {} model on {} fold(s) ...", name, self.folds.len());
        let mut runs = Vec::with_capacity(self.folds.len());
        for (k, fold) in self.folds.iter().enumerate() {
            let start = Instant::now();
            let (x_train, y_train, x_test) = pre.apply(&fold.train, &fold.train_labels, &fold.test)?;
            let mut trained = model.fresh_copy();
            trained.set_params(params)?;
            trained.fit(&x_train, &y_train)?;
            let test_predictions = trained.predict_proba(&x_test)?;
            let train_predictions = trained.predict_proba(&x_train)?;
            let elapsed = start.elapsed().as_secs_f64();
            debug!(fold = k, secs = elapsed, features = x_train.n_cols(), "trained fold");
            runs.push(ModelRun {
                id: Uuid::new_v4(),
                model: trained,
                train_predictions,
                test_predictions,
                train_time_secs: elapsed,
                trained_at: Utc::now(),
            });
        }
        self.models.insert(name.to_string(), runs);
        Ok(())
    }

    /// Per-fold metrics of a trained model on its test sets.
    ///
    /// The intervention threshold is the `(100 - intervention_pct)`-th
    /// percentile of the model's training predictions, so roughly
    /// `intervention_pct` percent of training visits would be flagged.
    pub fn evaluate_model(
        &self,
        name: &str,
        filter: Option<&RowFilter>,
        intervention_pct: f64,
    ) -> Result<Vec<FoldMetrics>> {
        let runs = self
            .models
            .get(name)
            .ok_or_else(|| MlError::not_found(format!("model '{name}'")))?;
        let mut metrics = Vec::with_capacity(runs.len());
        for (fold, run) in self.folds.iter().zip(runs) {
            let start = Instant::now();
            let threshold = percentile(&run.train_predictions, 100.0 - intervention_pct)
                .ok_or_else(|| {
                    MlError::evaluation(format!(
                        "no intervention threshold for {intervention_pct}% of {} training predictions",
                        run.train_predictions.len()
                    ))
                })?;

            let (predictions, actual) = match filter {
                Some(filter) => {
                    let j = fold
                        .test
                        .column_index(&filter.column)
                        .ok_or_else(|| MlError::filter(format!("no such column: {}", filter.column)))?;
                    let mask: Vec<bool> = fold.test.rows().iter().map(|r| (filter.predicate)(r[j])).collect();
                    if !mask.contains(&true) {
                        return Err(MlError::filter("condition returned zero rows"));
                    }
                    let keep = |i: &usize| mask[*i];
                    (
                        (0..mask.len()).filter(keep).map(|i| run.test_predictions[i]).collect(),
                        (0..mask.len()).filter(keep).map(|i| fold.test_labels[i]).collect(),
                    )
                }
                None => (run.test_predictions.clone(), fold.test_labels.clone()),
            };

            let mut fold_metrics = get_metrics(&predictions, &actual, Some(threshold))?;
            fold_metrics.train_time_secs = run.train_time_secs;
            fold_metrics.test_time_secs = start.elapsed().as_secs_f64();
            fold_metrics.total_time_secs = fold_metrics.train_time_secs + fold_metrics.test_time_secs;
            metrics.push(fold_metrics);
        }
        Ok(metrics)
    }

    /// Compare every trained model at each intervention percentage using
    /// fold-averaged metrics rounded to three decimals.
    pub fn simulate_interventions(&self, pcts: &[f64]) -> Result<BTreeMap<String, Vec<InterventionRow>>> {
        let first = self.folds.first().ok_or_else(|| {
            MlError::evaluation("no folds; build train and test sets before simulating")
        })?;
        info!(
            "Running intervention simulation on {} patients, {} of whom were readmitted ...",
            first.test_labels.len(),
            first.test_labels.iter().filter(|&&l| l == 1).count()
        );

        let mut results = BTreeMap::new();
        for name in self.models.keys() {
            let mut rows = Vec::with_capacity(pcts.len());
            for &pct in pcts {
                let combined = combine_fold_metrics(&self.evaluate_model(name, None, pct)?);
                rows.push(InterventionRow {
                    pct: (pct * 1000.0).round() / 1000.0,
                    num_intervened: round3(combined.get("num_intervened")),
                    num_intervened_correct: round3(combined.get("num_intervened_correct")),
                    precision: round3(combined.get("precision")),
                    recall: round3(combined.get("recall")),
                    specificity: round3(combined.get("specificity")),
                });
            }
            results.insert(name.clone(), rows);
        }
        Ok(results)
    }

    /// Randomized search over `space` on the first fold's training set,
    /// scored by AUC under `cv`-fold cross validation.
    #[allow(clippy::too_many_arguments)]
    pub fn grid_search<'a>(
        &self,
        model: &dyn Trainable,
        space: SearchSpace,
        n_iter: usize,
        selector: Option<&'a mut dyn FeatureSelector>,
        normalizer: Option<&'a mut dyn Normalizer>,
        cv: usize,
        seed: Option<u64>,
    ) -> Result<SearchResult> {
        let fold = self.folds.first().ok_or_else(|| {
            MlError::evaluation("no folds; build train and test sets before searching")
        })?;
        let pre = Preprocessing {
            selector,
            normalizer,
            sampler: None,
        };
        RandomizedSearch::new(space, n_iter)
            .with_cv(cv)
            .with_seed(seed)
            .run(model, &fold.train, &fold.train_labels, pre)
    }
}
