//! Feature selection.
//!
//! Selectors are fitted on a training frame and then applied to both the
//! training and the test frame of a fold, so nothing about the test rows
//! influences which columns are kept.

use crate::error::{MlError, Result};
use crate::frame::{FeatureFrame, finite, mean};
use readmit_core::extractor::KEY_SEPARATOR;
use std::collections::BTreeSet;
use tracing::debug;

/// Suffix of the LACE component columns.
pub const LACE_SUFFIX: &str = "_lace";

pub trait FeatureSelector {
    fn name(&self) -> &str;

    /// Learn the selection from training rows only.
    fn fit(&mut self, train: &FeatureFrame, labels: &[u8]) -> Result<()>;

    /// Apply the fitted selection. Errors when called before `fit`.
    fn select(&self, frame: &FeatureFrame) -> Result<FeatureFrame>;

    fn fit_select(&mut self, train: &FeatureFrame, labels: &[u8]) -> Result<FeatureFrame> {
        self.fit(train, labels)?;
        self.select(train)
    }
}

fn not_fitted(name: &str) -> MlError {
    MlError::model(format!("selector '{name}' used before fit"))
}

fn select_fitted(name: &str, columns: &Option<Vec<String>>, frame: &FeatureFrame) -> Result<FeatureFrame> {
    let columns = columns.as_ref().ok_or_else(|| not_fitted(name))?;
    frame.select_columns(columns)
}

/// Keeps the LACE component columns.
#[derive(Debug, Clone, Default)]
pub struct LaceSelector {
    columns: Option<Vec<String>>,
}

impl LaceSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureSelector for LaceSelector {
    fn name(&self) -> &str {
        "lace"
    }

    fn fit(&mut self, train: &FeatureFrame, _labels: &[u8]) -> Result<()> {
        let columns: Vec<String> = train
            .columns()
            .iter()
            .filter(|c| c.ends_with(LACE_SUFFIX))
            .cloned()
            .collect();
        if columns.is_empty() {
            return Err(MlError::invalid_input("no LACE columns in frame"));
        }
        self.columns = Some(columns);
        Ok(())
    }

    fn select(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        select_fitted(self.name(), &self.columns, frame)
    }
}

/// Pearson correlation over the rows where the feature is finite.
/// `None` when either side is constant.
pub fn pearson(values: &[f64], labels: &[u8]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(labels)
        .filter(|(v, _)| v.is_finite())
        .map(|(&v, &l)| (v, f64::from(l)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
    }
    let r = sxy / (sxx * syy).sqrt();
    r.is_finite().then_some(r)
}

/// Keeps the `n` columns most correlated (in absolute value) with the label.
#[derive(Debug, Clone)]
pub struct TopCorrelationSelector {
    n: usize,
    columns: Option<Vec<String>>,
}

impl TopCorrelationSelector {
    pub fn new(n: usize) -> Self {
        Self { n, columns: None }
    }
}

impl FeatureSelector for TopCorrelationSelector {
    fn name(&self) -> &str {
        "top_correlation"
    }

    fn fit(&mut self, train: &FeatureFrame, labels: &[u8]) -> Result<()> {
        if self.n == 0 {
            return Err(MlError::invalid_input("top correlation selector needs n > 0"));
        }
        let mut scored: Vec<(usize, f64)> = (0..train.n_cols())
            .filter_map(|j| pearson(&train.column_values(j), labels).map(|r| (j, r.abs())))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(self.n);
        if scored.is_empty() {
            return Err(MlError::invalid_input("no column correlates with the label"));
        }
        // Keep frame order for the output columns.
        let keep: BTreeSet<usize> = scored.iter().map(|(j, _)| *j).collect();
        let columns: Vec<String> = keep.iter().map(|&j| train.columns()[j].clone()).collect();
        debug!(selected = ?columns, "top correlated columns");
        self.columns = Some(columns);
        Ok(())
    }

    fn select(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        select_fitted(self.name(), &self.columns, frame)
    }
}

/// Keeps the columns of the named extractor groups.
#[derive(Debug, Clone)]
pub struct FeatureGroupSelector {
    groups: Vec<String>,
    columns: Option<Vec<String>>,
}

impl FeatureGroupSelector {
    pub fn new<S: Into<String>>(groups: impl IntoIterator<Item = S>) -> Self {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
            columns: None,
        }
    }
}

/// The extractor prefix of a feature key, e.g. `VitalsExtractor` for
/// `VitalsExtractor__pulse`.
pub fn feature_group(column: &str) -> Option<&str> {
    column.split_once(KEY_SEPARATOR).map(|(group, _)| group)
}

impl FeatureSelector for FeatureGroupSelector {
    fn name(&self) -> &str {
        "feature_group"
    }

    fn fit(&mut self, train: &FeatureFrame, _labels: &[u8]) -> Result<()> {
        let columns: Vec<String> = train
            .columns()
            .iter()
            .filter(|c| feature_group(c).is_some_and(|g| self.groups.iter().any(|w| w == g)))
            .cloned()
            .collect();
        if columns.is_empty() {
            return Err(MlError::invalid_input(format!(
                "no columns in feature groups {:?}",
                self.groups
            )));
        }
        self.columns = Some(columns);
        Ok(())
    }

    fn select(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        select_fitted(self.name(), &self.columns, frame)
    }
}

#[derive(Debug, Clone)]
struct PcaFit {
    columns: Vec<String>,
    means: Vec<f64>,
    components: Vec<Vec<f64>>,
}

/// Projects onto the first `n` principal components of the training frame.
///
/// Components come from power iteration on the covariance matrix with
/// deflation. Missing cells are treated as the column mean.
#[derive(Debug, Clone)]
pub struct PcaSelector {
    n: usize,
    max_iter: usize,
    fit: Option<PcaFit>,
}

impl PcaSelector {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            max_iter: 200,
            fit: None,
        }
    }

    /// Fitted component vectors, one per output column.
    pub fn components(&self) -> Option<&[Vec<f64>]> {
        self.fit.as_ref().map(|f| f.components.as_slice())
    }
}

fn centered(frame: &FeatureFrame, means: &[f64]) -> Vec<Vec<f64>> {
    frame
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .zip(means)
                .map(|(&v, &m)| if v.is_finite() { v - m } else { 0.0 })
                .collect()
        })
        .collect()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum()).collect()
}

fn normalize(v: &mut [f64]) -> f64 {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    norm
}

impl FeatureSelector for PcaSelector {
    fn name(&self) -> &str {
        "pca"
    }

    fn fit(&mut self, train: &FeatureFrame, _labels: &[u8]) -> Result<()> {
        let p = train.n_cols();
        if self.n == 0 || self.n > p {
            return Err(MlError::invalid_input(format!(
                "cannot extract {} components from {p} columns",
                self.n
            )));
        }
        if train.n_rows() < 2 {
            return Err(MlError::invalid_input("PCA needs at least two rows"));
        }
        let means: Vec<f64> = (0..p)
            .map(|j| mean(&finite(&train.column_values(j))).unwrap_or(0.0))
            .collect();
        let x = centered(train, &means);
        let denom = (x.len() - 1) as f64;
        let mut cov = vec![vec![0.0; p]; p];
        for row in &x {
            for a in 0..p {
                for b in a..p {
                    cov[a][b] += row[a] * row[b] / denom;
                }
            }
        }
        for a in 0..p {
            for b in 0..a {
                cov[a][b] = cov[b][a];
            }
        }

        let mut components = Vec::with_capacity(self.n);
        for k in 0..self.n {
            let mut v: Vec<f64> = (0..p).map(|j| if j == k { 1.0 } else { 0.5 }).collect();
            normalize(&mut v);
            let mut eigenvalue = 0.0;
            for _ in 0..self.max_iter {
                let mut next = mat_vec(&cov, &v);
                eigenvalue = normalize(&mut next);
                let delta: f64 = next.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
                v = next;
                if eigenvalue == 0.0 || delta < 1e-10 {
                    break;
                }
            }
            for a in 0..p {
                for b in 0..p {
                    cov[a][b] -= eigenvalue * v[a] * v[b];
                }
            }
            components.push(v);
        }
        self.fit = Some(PcaFit {
            columns: train.columns().to_vec(),
            means,
            components,
        });
        Ok(())
    }

    fn select(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let fit = self.fit.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        frame.check_same_columns(&fit.columns)?;
        let data = centered(frame, &fit.means)
            .iter()
            .map(|row| mat_vec(&fit.components, row))
            .collect();
        let columns = (1..=fit.components.len()).map(|i| format!("pc_{i}")).collect();
        frame.with_data(columns, data)
    }
}
