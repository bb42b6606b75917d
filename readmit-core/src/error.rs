//! Error types for the readmit core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering emission, validation, extraction, data access and persistence.

use crate::value::FeatureValue;
use std::path::PathBuf;

/// Result alias used across the core crate.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Top-level error type for the readmit core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A feature key received two different missing-value sentinels.
    #[error(
        "All rows must have the same missing value: feature '{feature}' was declared with {previous:?}, now {current:?}"
    )]
    MetaInconsistent {
        feature: String,
        previous: Option<FeatureValue>,
        current: Option<FeatureValue>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Extractor '{extractor}' failed: {message}")]
    Extraction { extractor: String, message: String },

    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn extraction(extractor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            extractor: extractor.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while checking an emitted table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Bad column name: {column}!")]
    BadColumnName { column: String },

    #[error("Column {column} contains non-boolean values ({values})!")]
    NonBoolean { column: String, values: String },

    #[error("Column {column} has {actual} values but the table has {expected} rows")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors from the upstream relational data collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Index column '{column}' not found in query result")]
    MissingIndexColumn { column: String },

    #[error("Query failed: {message}")]
    Query { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
}
