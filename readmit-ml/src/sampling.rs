//! Class rebalancing for training sets.
//!
//! Samplers only ever see the training rows of a fold.

use crate::error::{MlError, Result};
use crate::frame::FeatureFrame;
use crate::splitters::rng_for;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

pub trait Sampler {
    fn name(&self) -> &str;

    fn fit_sample(&mut self, frame: &FeatureFrame, labels: &[u8]) -> Result<(FeatureFrame, Vec<u8>)>;
}

fn class_indices(frame: &FeatureFrame, labels: &[u8]) -> Result<(Vec<usize>, Vec<usize>)> {
    if frame.n_rows() != labels.len() {
        return Err(MlError::invalid_input(format!(
            "{} rows for {} labels",
            frame.n_rows(),
            labels.len()
        )));
    }
    let (positive, negative): (Vec<usize>, Vec<usize>) = (0..labels.len()).partition(|&i| labels[i] == 1);
    if positive.is_empty() || negative.is_empty() {
        return Err(MlError::invalid_input("resampling needs both classes present"));
    }
    Ok((positive, negative))
}

fn gather(frame: &FeatureFrame, labels: &[u8], mut indices: Vec<usize>) -> (FeatureFrame, Vec<u8>) {
    indices.sort_unstable();
    let y = indices.iter().map(|&i| labels[i]).collect();
    (frame.take_rows(&indices), y)
}

/// Drops random majority-class rows until both classes are the same size.
#[derive(Debug, Clone, Default)]
pub struct RandomUnderSampler {
    seed: Option<u64>,
}

impl RandomUnderSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

impl Sampler for RandomUnderSampler {
    fn name(&self) -> &str {
        "random_under"
    }

    fn fit_sample(&mut self, frame: &FeatureFrame, labels: &[u8]) -> Result<(FeatureFrame, Vec<u8>)> {
        let (positive, negative) = class_indices(frame, labels)?;
        let (minority, mut majority) = if positive.len() <= negative.len() {
            (positive, negative)
        } else {
            (negative, positive)
        };
        majority.shuffle(&mut rng_for(self.seed));
        majority.truncate(minority.len());
        debug!(per_class = minority.len(), "undersampled training rows");
        Ok(gather(frame, labels, minority.into_iter().chain(majority).collect()))
    }
}

/// Repeats random minority-class rows until both classes are the same size.
#[derive(Debug, Clone, Default)]
pub struct RandomOverSampler {
    seed: Option<u64>,
}

impl RandomOverSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

impl Sampler for RandomOverSampler {
    fn name(&self) -> &str {
        "random_over"
    }

    fn fit_sample(&mut self, frame: &FeatureFrame, labels: &[u8]) -> Result<(FeatureFrame, Vec<u8>)> {
        let (positive, negative) = class_indices(frame, labels)?;
        let (minority, majority) = if positive.len() <= negative.len() {
            (positive, negative)
        } else {
            (negative, positive)
        };
        let mut rng = rng_for(self.seed);
        let extra: Vec<usize> = (0..majority.len() - minority.len())
            .map(|_| minority[rng.gen_range(0..minority.len())])
            .collect();
        debug!(per_class = majority.len(), "oversampled training rows");
        Ok(gather(
            frame,
            labels,
            minority.into_iter().chain(extra).chain(majority).collect(),
        ))
    }
}
