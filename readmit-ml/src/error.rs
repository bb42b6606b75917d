//! Error types for the readmit-ml crate.

use readmit_core::CoreError;
use thiserror::Error;

pub type Result<T, E = MlError> = std::result::Result<T, E>;

/// Top-level error type for evaluation operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Split error: {0}")]
    Split(String),

    #[error("Filter error: {0}")]
    Filter(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn split(msg: impl Into<String>) -> Self {
        Self::Split(msg.into())
    }

    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_format() {
        assert_eq!(
            MlError::filter("No such column: age!").to_string(),
            "Filter error: No such column: age!"
        );
        assert_eq!(MlError::not_found("model 'RF'").to_string(), "Not found: model 'RF'");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err = MlError::from(CoreError::extraction("A", "boom"));
        assert_eq!(err.to_string(), "Extractor 'A' failed: boom");
    }
}
