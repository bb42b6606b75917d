//! Column normalizers, fitted on training rows and applied to any frame with
//! the same columns.

use crate::error::{MlError, Result};
use crate::frame::{FeatureFrame, finite, mean, median};

pub trait Normalizer {
    fn name(&self) -> &str;

    fn fit(&mut self, train: &FeatureFrame) -> Result<()>;

    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame>;

    fn fit_transform(&mut self, train: &FeatureFrame) -> Result<FeatureFrame> {
        self.fit(train)?;
        self.transform(train)
    }
}

#[derive(Debug, Clone)]
struct ColumnStats {
    columns: Vec<String>,
    a: Vec<f64>,
    b: Vec<f64>,
}

impl ColumnStats {
    fn get<'a>(stats: &'a Option<Self>, name: &str, frame: &FeatureFrame) -> Result<&'a Self> {
        let stats = stats
            .as_ref()
            .ok_or_else(|| MlError::model(format!("normalizer '{name}' used before fit")))?;
        frame.check_same_columns(&stats.columns)?;
        Ok(stats)
    }
}

/// Zero mean, unit variance. Constant columns are only centered.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    stats: Option<ColumnStats>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for StandardScaler {
    fn name(&self) -> &str {
        "standard"
    }

    fn fit(&mut self, train: &FeatureFrame) -> Result<()> {
        let (mut means, mut stds) = (Vec::new(), Vec::new());
        for j in 0..train.n_cols() {
            let values = finite(&train.column_values(j));
            let m = mean(&values).unwrap_or(0.0);
            let var = mean(&values.iter().map(|v| (v - m).powi(2)).collect::<Vec<_>>()).unwrap_or(0.0);
            let std = var.sqrt();
            means.push(m);
            stds.push(if std > 0.0 { std } else { 1.0 });
        }
        self.stats = Some(ColumnStats {
            columns: train.columns().to_vec(),
            a: means,
            b: stds,
        });
        Ok(())
    }

    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let s = ColumnStats::get(&self.stats, self.name(), frame)?;
        Ok(frame.map_cells(|j, v| (v - s.a[j]) / s.b[j]))
    }
}

/// Rescales each column to `[0, 1]` over the training range.
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    stats: Option<ColumnStats>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for MinMaxScaler {
    fn name(&self) -> &str {
        "min_max"
    }

    fn fit(&mut self, train: &FeatureFrame) -> Result<()> {
        let (mut mins, mut ranges) = (Vec::new(), Vec::new());
        for j in 0..train.n_cols() {
            let values = finite(&train.column_values(j));
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if values.is_empty() {
                mins.push(0.0);
                ranges.push(1.0);
            } else {
                mins.push(min);
                ranges.push(if max > min { max - min } else { 1.0 });
            }
        }
        self.stats = Some(ColumnStats {
            columns: train.columns().to_vec(),
            a: mins,
            b: ranges,
        });
        Ok(())
    }

    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let s = ColumnStats::get(&self.stats, self.name(), frame)?;
        Ok(frame.map_cells(|j, v| (v - s.a[j]) / s.b[j]))
    }
}

/// Replaces missing cells with the training median of their column.
#[derive(Debug, Clone, Default)]
pub struct MedianImputer {
    stats: Option<ColumnStats>,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for MedianImputer {
    fn name(&self) -> &str {
        "median_imputer"
    }

    fn fit(&mut self, train: &FeatureFrame) -> Result<()> {
        let medians = (0..train.n_cols())
            .map(|j| median(&finite(&train.column_values(j))).unwrap_or(0.0))
            .collect();
        self.stats = Some(ColumnStats {
            columns: train.columns().to_vec(),
            a: medians,
            b: Vec::new(),
        });
        Ok(())
    }

    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let s = ColumnStats::get(&self.stats, self.name(), frame)?;
        Ok(frame.map_cells(|j, v| if v.is_finite() { v } else { s.a[j] }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(data: Vec<Vec<f64>>) -> FeatureFrame {
        let keys = (0..data.len()).map(|i| i.to_string()).collect();
        FeatureFrame::new(vec!["a".into(), "b".into()], keys, data).unwrap()
    }

    #[test]
    fn test_standard_scaler_uses_train_stats() {
        let train = frame(vec![vec![1.0, 5.0], vec![3.0, 5.0], vec![f64::NAN, 5.0]]);
        let mut scaler = StandardScaler::new();
        let out = scaler.fit_transform(&train).unwrap();
        let a = out.column("a").unwrap();
        assert_eq!(&a[..2], &[-1.0, 1.0]);
        assert!(a[2].is_nan());
        assert_eq!(out.column("b").unwrap(), vec![0.0, 0.0, 0.0]);

        let test = frame(vec![vec![5.0, 7.0]]);
        assert_eq!(scaler.transform(&test).unwrap().row(0), &[3.0, 2.0]);
    }

    #[test]
    fn test_min_max_scaler() {
        let train = frame(vec![vec![0.0, 2.0], vec![10.0, 2.0]]);
        let mut scaler = MinMaxScaler::new();
        let out = scaler.fit_transform(&train).unwrap();
        assert_eq!(out.row(0), &[0.0, 0.0]);
        assert_eq!(out.row(1), &[1.0, 0.0]);
    }

    #[test]
    fn test_median_imputer() {
        let train = frame(vec![vec![1.0, f64::NAN], vec![2.0, 4.0], vec![9.0, 6.0]]);
        let mut imputer = MedianImputer::new();
        let out = imputer.fit_transform(&train).unwrap();
        assert_eq!(out.column("b").unwrap(), vec![5.0, 4.0, 6.0]);
        assert_eq!(out.column("a").unwrap(), vec![1.0, 2.0, 9.0]);
    }

    #[test]
    fn test_transform_requires_fit_and_same_columns() {
        let train = frame(vec![vec![1.0, 2.0]]);
        assert!(StandardScaler::new().transform(&train).is_err());

        let mut scaler = MinMaxScaler::new();
        scaler.fit(&train).unwrap();
        let other = FeatureFrame::new(vec!["a".into()], vec!["0".into()], vec![vec![1.0]]).unwrap();
        assert!(matches!(scaler.transform(&other), Err(MlError::InvalidInput(_))));
    }
}
