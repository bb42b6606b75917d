//! Train/test splitters.
//!
//! Every splitter first turns `days_to_readmit` into a binary label against
//! the horizon, then partitions the rows into one or more [`Fold`]s.

use crate::dataset::Dataset;
use crate::error::{MlError, Result};
use crate::frame::FeatureFrame;
use chrono::NaiveDateTime;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

/// One train/test partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train: FeatureFrame,
    pub test: FeatureFrame,
    pub train_labels: Vec<u8>,
    pub test_labels: Vec<u8>,
}

impl Fold {
    fn from_indices(data: &Dataset, labels: &[u8], train: &[usize], test: &[usize]) -> Self {
        Self {
            train: data.features.take_rows(train),
            test: data.features.take_rows(test),
            train_labels: train.iter().map(|&i| labels[i]).collect(),
            test_labels: test.iter().map(|&i| labels[i]).collect(),
        }
    }
}

/// `1` when the visit was readmitted within `horizon_days`, else `0`.
/// Visits never readmitted count as negative.
pub fn binary_labels(days_to_readmit: &[Option<f64>], horizon_days: f64) -> Vec<u8> {
    days_to_readmit
        .iter()
        .map(|days| match days {
            Some(d) if *d < horizon_days => 1,
            _ => 0,
        })
        .collect()
}

/// Seeded generator, or an entropy-seeded one when no seed is given.
pub fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Partition `0..n` into `k` contiguous groups of a shuffled order. The first
/// `n % k` groups hold one extra index.
pub fn kfold_indices(n: usize, k: usize, seed: Option<u64>) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng_for(seed));
    let (base, extra) = (n / k, n % k);
    let mut groups = Vec::with_capacity(k);
    let mut start = 0;
    for g in 0..k {
        let size = base + usize::from(g < extra);
        let mut group = order[start..start + size].to_vec();
        group.sort_unstable();
        groups.push(group);
        start += size;
    }
    groups
}

/// A train/test partitioning policy.
pub trait Splitter {
    fn name(&self) -> &str;

    fn split(&self, data: &Dataset, horizon_days: f64, seed: Option<u64>) -> Result<Vec<Fold>>;
}

/// Random holdout; exactly one fold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Holdout {
    test_size: f64,
}

impl Holdout {
    pub fn new(test_size: f64) -> Result<Self> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(MlError::config(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }
        Ok(Self { test_size })
    }

    pub fn test_size(&self) -> f64 {
        self.test_size
    }
}

impl Splitter for Holdout {
    fn name(&self) -> &str {
        "holdout"
    }

    fn split(&self, data: &Dataset, horizon_days: f64, seed: Option<u64>) -> Result<Vec<Fold>> {
        let n = data.len();
        let n_test = (self.test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(MlError::split(format!(
                "cannot hold out {n_test} of {n} rows"
            )));
        }
        let test_pct = (self.test_size * 100.0).round() as u32;
        info!("Performing a {}/{} split ...", 100 - test_pct, test_pct);

        let labels = binary_labels(&data.labels.days_to_readmit, horizon_days);
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng_for(seed));
        let mut test = order[..n_test].to_vec();
        let mut train = order[n_test..].to_vec();
        test.sort_unstable();
        train.sort_unstable();
        Ok(vec![Fold::from_indices(data, &labels, &train, &test)])
    }
}

/// K-fold cross validation; `n_folds` folds, each testing one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_folds: usize,
}

impl KFold {
    pub fn new(n_folds: usize) -> Result<Self> {
        if n_folds < 2 {
            return Err(MlError::config(format!(
                "n_folds must be at least 2, got {n_folds}"
            )));
        }
        Ok(Self { n_folds })
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }
}

impl Splitter for KFold {
    fn name(&self) -> &str {
        "k_fold"
    }

    fn split(&self, data: &Dataset, horizon_days: f64, seed: Option<u64>) -> Result<Vec<Fold>> {
        let n = data.len();
        if n < self.n_folds {
            return Err(MlError::split(format!(
                "cannot split {n} rows into {} folds",
                self.n_folds
            )));
        }
        info!("Splitting into {} folds ...", self.n_folds);

        let labels = binary_labels(&data.labels.days_to_readmit, horizon_days);
        let groups = kfold_indices(n, self.n_folds, seed);
        let folds = (0..groups.len())
            .map(|g| {
                let mut train: Vec<usize> = groups
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != g)
                    .flat_map(|(_, group)| group.iter().copied())
                    .collect();
                train.sort_unstable();
                Fold::from_indices(data, &labels, &train, &groups[g])
            })
            .collect();
        Ok(folds)
    }
}

/// Temporal split: train on admissions before the cutoff, test on the rest.
/// Rows without an admission timestamp are in neither set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temporal {
    split_at: NaiveDateTime,
}

impl Temporal {
    pub fn new(split_at: NaiveDateTime) -> Self {
        Self { split_at }
    }

    pub fn split_at(&self) -> NaiveDateTime {
        self.split_at
    }
}

impl Splitter for Temporal {
    fn name(&self) -> &str {
        "temporal"
    }

    fn split(&self, data: &Dataset, horizon_days: f64, _seed: Option<u64>) -> Result<Vec<Fold>> {
        info!("Performing a temporal split around {}", self.split_at);
        let labels = binary_labels(&data.labels.days_to_readmit, horizon_days);
        let (mut train, mut test) = (Vec::new(), Vec::new());
        for (i, admit) in data.labels.admit.iter().enumerate() {
            match admit {
                Some(ts) if *ts < self.split_at => train.push(i),
                Some(_) => test.push(i),
                None => {}
            }
        }
        if train.is_empty() || test.is_empty() {
            return Err(MlError::split(format!(
                "temporal split at {} leaves {} train and {} test rows",
                self.split_at,
                train.len(),
                test.len()
            )));
        }
        Ok(vec![Fold::from_indices(data, &labels, &train, &test)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{LabelFrame, parse_timestamp};
    use pretty_assertions::assert_eq;

    fn dataset(n: usize) -> Dataset {
        let keys: Vec<String> = (0..n).map(|i| i.to_string()).collect();
        let features = FeatureFrame::new(
            vec!["x".into()],
            keys.clone(),
            (0..n).map(|i| vec![i as f64]).collect(),
        )
        .unwrap();
        let labels = LabelFrame {
            row_keys: keys,
            days_to_readmit: (0..n).map(|i| Some(i as f64 * 10.0)).collect(),
            admit: vec![None; n],
            discharge: vec![None; n],
        };
        Dataset::new(features, labels).unwrap()
    }

    #[test]
    fn test_binary_labels() {
        assert_eq!(binary_labels(&[Some(10.0), Some(40.0), None], 30.0), vec![1, 0, 0]);
        assert_eq!(binary_labels(&[Some(30.0)], 30.0), vec![0]);
    }

    #[test]
    fn test_holdout_sizes_and_seed() {
        let data = dataset(10);
        let splitter = Holdout::new(0.3).unwrap();
        let a = splitter.split(&data, 30.0, Some(7)).unwrap();
        let b = splitter.split(&data, 30.0, Some(7)).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].test.n_rows(), 3);
        assert_eq!(a[0].train.n_rows(), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_holdout_rejects_bad_size() {
        assert!(Holdout::new(0.0).is_err());
        assert!(Holdout::new(1.0).is_err());
    }

    #[test]
    fn test_kfold_partitions_every_row_once() {
        let data = dataset(11);
        let folds = KFold::new(3).unwrap().split(&data, 30.0, Some(1)).unwrap();
        assert_eq!(folds.len(), 3);
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.n_rows()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);

        let mut seen: Vec<String> = folds
            .iter()
            .flat_map(|f| f.test.row_keys().to_vec())
            .collect();
        seen.sort_by_key(|k| k.parse::<usize>().unwrap());
        let expected: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
        for fold in &folds {
            assert_eq!(fold.train.n_rows() + fold.test.n_rows(), 11);
        }
    }

    #[test]
    fn test_kfold_too_few_rows() {
        let data = dataset(2);
        assert!(KFold::new(3).unwrap().split(&data, 30.0, None).is_err());
    }

    #[test]
    fn test_temporal_split() {
        let mut data = dataset(3);
        data.labels.admit = vec![
            parse_timestamp("2020-01-01"),
            parse_timestamp("2020-06-01"),
            None,
        ];
        let splitter = Temporal::new(parse_timestamp("2020-03-01").unwrap());
        let folds = splitter.split(&data, 30.0, None).unwrap();
        assert_eq!(folds[0].train.row_keys(), &["0"]);
        assert_eq!(folds[0].test.row_keys(), &["1"]);
        assert_eq!(folds[0].train_labels, vec![1]);
        assert_eq!(folds[0].test_labels, vec![1]);
    }
}
