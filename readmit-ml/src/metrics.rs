//! Binary classification metrics and intervention statistics.

use crate::error::{MlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Receiver operating characteristic curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Decreasing score thresholds; the first is `+inf`.
    pub thresholds: Vec<f64>,
}

/// ROC curve over the distinct score thresholds, highest first.
///
/// Returns `None` unless both classes are present.
pub fn roc_curve(labels: &[u8], scores: &[f64]) -> Option<RocCurve> {
    let positives = labels.iter().filter(|&&l| l == 1).count() as f64;
    let negatives = labels.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &i) in order.iter().enumerate() {
        if labels[i] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_threshold = order
            .get(pos + 1)
            .is_none_or(|&next| scores[next] != scores[i]);
        if last_of_threshold {
            curve.fpr.push(fp / negatives);
            curve.tpr.push(tp / positives);
            curve.thresholds.push(scores[i]);
        }
    }
    Some(curve)
}

/// Area under a curve by the trapezoidal rule.
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// ROC AUC, or `None` when only one class is present.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    roc_curve(labels, scores).map(|c| auc(&c.fpr, &c.tpr))
}

/// The `q`-th percentile (0..=100) with linear interpolation between ranks.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Metrics for one fold's test predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub auc: Option<f64>,
    pub num_predictions: f64,
    pub num_positive: f64,
    pub num_negative: f64,
    pub intervention_threshold: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
    pub ppv: Option<f64>,
    pub npv: Option<f64>,
    pub num_intervened: Option<f64>,
    pub num_intervened_correct: Option<f64>,
    pub fraction_intervened: Option<f64>,
    pub tp: Option<f64>,
    pub tn: Option<f64>,
    pub fp: Option<f64>,
    #[serde(rename = "fn")]
    pub fn_: Option<f64>,
    pub train_time_secs: f64,
    pub test_time_secs: f64,
    pub total_time_secs: f64,
}

impl FoldMetrics {
    /// Every scalar metric by name; curves are excluded.
    pub fn scalars(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("auc", self.auc),
            ("num_predictions", Some(self.num_predictions)),
            ("num_positive", Some(self.num_positive)),
            ("num_negative", Some(self.num_negative)),
            ("intervention_threshold", self.intervention_threshold),
            ("precision", self.precision),
            ("recall", self.recall),
            ("sensitivity", self.sensitivity),
            ("specificity", self.specificity),
            ("ppv", self.ppv),
            ("npv", self.npv),
            ("num_intervened", self.num_intervened),
            ("num_intervened_correct", self.num_intervened_correct),
            ("fraction_intervened", self.fraction_intervened),
            ("tp", self.tp),
            ("tn", self.tn),
            ("fp", self.fp),
            ("fn", self.fn_),
            ("train_time_secs", Some(self.train_time_secs)),
            ("test_time_secs", Some(self.test_time_secs)),
            ("total_time_secs", Some(self.total_time_secs)),
        ]
    }
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    (den != 0.0).then(|| num / den)
}

/// Score `predictions` against `actual`.
///
/// With a threshold, a visit is flagged for intervention when its prediction
/// is strictly greater than the threshold; undefined ratios are `None`.
pub fn get_metrics(predictions: &[f64], actual: &[u8], threshold: Option<f64>) -> Result<FoldMetrics> {
    if predictions.len() != actual.len() {
        return Err(MlError::invalid_input(format!(
            "{} predictions for {} labels",
            predictions.len(),
            actual.len()
        )));
    }
    let num_positive = actual.iter().filter(|&&l| l == 1).count() as f64;
    let num_predictions = predictions.len() as f64;
    let curve = roc_curve(actual, predictions).unwrap_or_default();

    let mut metrics = FoldMetrics {
        auc: roc_auc(actual, predictions),
        fpr: curve.fpr,
        tpr: curve.tpr,
        num_predictions,
        num_positive,
        num_negative: num_predictions - num_positive,
        intervention_threshold: threshold,
        ..Default::default()
    };

    if let Some(threshold) = threshold {
        let (mut tp, mut tn, mut fp, mut fn_) = (0.0, 0.0, 0.0, 0.0);
        for (&p, &label) in predictions.iter().zip(actual) {
            match (p > threshold, label == 1) {
                (true, true) => tp += 1.0,
                (false, false) => tn += 1.0,
                (true, false) => fp += 1.0,
                (false, true) => fn_ += 1.0,
            }
        }
        let intervened = tp + fp;
        let passed = tn + fn_;
        metrics.precision = ratio(tp, intervened);
        metrics.recall = ratio(tp, num_positive);
        metrics.sensitivity = metrics.recall;
        metrics.specificity = ratio(tn, metrics.num_negative);
        metrics.ppv = metrics.precision;
        metrics.npv = ratio(tn, passed);
        metrics.num_intervened = Some(intervened);
        metrics.num_intervened_correct = Some(tp);
        metrics.fraction_intervened = ratio(intervened, intervened + passed);
        metrics.tp = Some(tp);
        metrics.tn = Some(tn);
        metrics.fp = Some(fp);
        metrics.fn_ = Some(fn_);
    }
    Ok(metrics)
}

/// Fold-averaged scalar metrics. A metric undefined in every fold is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinedMetrics(BTreeMap<String, Option<f64>>);

impl CombinedMetrics {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied().flatten()
    }

    pub fn insert(&mut self, name: &str, value: Option<f64>) {
        self.0.insert(name.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Average every defined scalar across folds, ignoring undefined values.
pub fn combine_fold_metrics(folds: &[FoldMetrics]) -> CombinedMetrics {
    let mut sums: BTreeMap<&'static str, (f64, usize)> = BTreeMap::new();
    for fold in folds {
        for (name, value) in fold.scalars() {
            let entry = sums.entry(name).or_insert((0.0, 0));
            if let Some(v) = value.filter(|v| v.is_finite()) {
                entry.0 += v;
                entry.1 += 1;
            }
        }
    }
    let mut combined = CombinedMetrics::default();
    for (name, (sum, count)) in sums {
        combined.insert(name, (count > 0).then(|| sum / count as f64));
    }
    combined
}
