//! Error types for the factorization crate.

use thiserror::Error;

/// Errors raised by encoding, training, inference and persistence
#[derive(Error, Debug)]
pub enum ModelError {
    /// Item id outside the 1-based range the model was trained on
    #[error("Invalid item id {id}: expected 1..={n_items}")]
    InvalidItemId { id: u32, n_items: usize },

    /// User row outside the trained user space
    #[error("Invalid user index {index}: model has {n_users} users")]
    InvalidUserIndex { index: usize, n_users: usize },

    /// Bad hyperparameter or argument, rejected at call time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persisted state is inconsistent; nothing was applied
    #[error("Corrupt model state: {0}")]
    CorruptState(String),

    /// Input matrix or vector does not match the model's shape
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// The normal equations could not be factored
    #[error("Linear system is not positive definite")]
    SingularSystem,

    /// A dense factorization produced no usable result
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, ModelError>;
