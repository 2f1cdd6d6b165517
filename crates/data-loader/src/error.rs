//! Error types for the data-loader crate.

use thiserror::Error;

/// Errors raised while reading the storage exports into a `DataIndex`
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// A required export file is missing
    #[error("Storage export not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A record could not be split or converted
    #[error("{file}:{line}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// A field parsed but is out of its domain (e.g. a score that is not one
    /// of the ten rating levels)
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// A rating or similarity edge points at a movie the catalog lacks
    #[error("{entity} {id} is referenced but not in the catalog")]
    MissingReference { entity: String, id: u32 },

    /// Cross-record consistency check failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DataLoadError>;
