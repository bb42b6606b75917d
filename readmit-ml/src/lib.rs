//! # readmit-ml
//!
//! Evaluation harness for readmission-risk models built on the feature
//! matrix produced by `readmit-core`: dataset loading, train/test splitters,
//! per-fold preprocessing, trainable models, metrics, intervention
//! simulation and randomized hyperparameter search.

// Foundation
pub mod config;
pub mod error;

// Data
pub mod dataset;
pub mod frame;
pub mod splitters;

// Preprocessing
pub mod normalize;
pub mod sampling;
pub mod selectors;

// Models & evaluation
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod search;

// Re-exports
pub use config::{EvaluationConfig, LabelColumns, SplitterConfig};
pub use dataset::{Dataset, LabelFrame};
pub use error::{MlError, Result};
pub use frame::FeatureFrame;
pub use metrics::{CombinedMetrics, FoldMetrics, combine_fold_metrics, get_metrics};
pub use models::{CopySemantics, LaceModel, LogisticRegression, Params, Trainable};
pub use normalize::{MedianImputer, MinMaxScaler, Normalizer, StandardScaler};
pub use pipeline::{InterventionRow, ModelRun, Pipeline, Preprocessing, RowFilter};
pub use sampling::{RandomOverSampler, RandomUnderSampler, Sampler};
pub use search::{ParamDistribution, RandomizedSearch, SearchResult, SearchSpace};
pub use selectors::{
    FeatureGroupSelector, FeatureSelector, LaceSelector, PcaSelector, TopCorrelationSelector,
};
pub use splitters::{Fold, Holdout, KFold, Splitter, Temporal};
