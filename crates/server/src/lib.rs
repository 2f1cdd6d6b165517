//! Recommendation engine for the movie recommender.
//!
//! This crate ties the candidate sources, the filter pipeline and the
//! cluster labeler into `RecommendationEngine`, the single entry point of the
//! recommendation core, and wraps it in `SharedEngine` for concurrent callers
//! that need to hot-swap models.

pub mod config;
pub mod engine;
pub mod error;
pub mod handle;

pub use config::{EngineConfig, EvaluationConfig};
pub use engine::RecommendationEngine;
pub use error::{EngineError, Result};
pub use handle::SharedEngine;
