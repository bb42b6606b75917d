//! # readmit-core
//!
//! Feature extraction for readmission-risk modeling. Provides the extractor
//! contract, per-cell emission with missing-value policy enforcement, table
//! validation, the data source seam, and the Databuilder which reruns only
//! the extractors whose fingerprint changed and assembles the wide matrix.

// Values & storage
pub mod store;
pub mod table;
pub mod value;

// Extraction
pub mod extractor;
pub mod extractors;
pub mod source;
pub mod validation;

// Orchestration
pub mod cache;
pub mod databuilder;
pub mod matrix;

// Foundation
pub mod config;
pub mod error;
pub mod persistence;

// Re-export commonly used types at the crate root.
pub use cache::{CacheEntry, ExtractionCache};
pub use config::{ExtractionConfig, SqlExtractorDef, load_config};
pub use databuilder::{BuildOutput, Databuilder, RunReport};
pub use error::{ConfigError, CoreError, Result, SourceError, ValidationError};
pub use extractor::{
    Emitter, ExtractionContext, FeatureExtractor, Fingerprint, OutputMode, feature_key,
    run_extractor,
};
pub use matrix::FeatureMatrix;
pub use source::{DataSource, SqliteSource};
pub use store::{ColumnMeta, DebugRecords, ExtractorOutput, FeatureRecords, MetaStore, merge_nested};
pub use table::{RowSet, Table};
pub use value::FeatureValue;
