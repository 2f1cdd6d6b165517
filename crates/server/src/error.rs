//! Error types for the recommendation engine.

use data_loader::DataLoadError;
use factorization::ModelError;
use thiserror::Error;

/// Errors surfaced to callers of the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Evaluation sampling cannot meet the requested size
    #[error("Insufficient candidates: requested {requested}, only {available} qualify")]
    InsufficientCandidates { requested: usize, available: usize },

    /// The model, content table and catalog do not fit together
    #[error("Incompatible data: {0}")]
    IncompatibleData(String),

    /// Engine configuration rejected at construction time
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Data(#[from] DataLoadError),

    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for `EngineConfig`
    #[error("Failed to parse config: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    /// Failure inside a candidate source or filter
    #[error("{0:#}")]
    Pipeline(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    /// Model errors raised inside a source keep their type
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ModelError>() {
            Ok(model_err) => EngineError::Model(model_err),
            Err(err) => EngineError::Pipeline(err),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, EngineError>;
