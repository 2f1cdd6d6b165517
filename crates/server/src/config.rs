//! Engine configuration.
//!
//! Every threshold and weight the request path uses lives here so that
//! deployments can tune them without a rebuild. Missing fields in a config
//! file take their defaults.

use crate::error::{EngineError, Result};
use factorization::InferenceStrategy;
use pipeline::{LabelerConfig, RefinementConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Filter applied to the catalog before sampling evaluation candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Minimum number of external votes
    pub min_votes: u32,
    /// Inclusive score band on the external 0-10 scale
    pub min_vote_average: f32,
    pub max_vote_average: f32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            min_votes: 300_000,
            min_vote_average: 6.0,
            max_vote_average: 9.0,
        }
    }
}

impl EvaluationConfig {
    /// Whether a movie with these vote statistics qualifies
    pub fn accepts(&self, votes: Option<u32>, vote_average: Option<f32>) -> bool {
        match (votes, vote_average) {
            (Some(votes), Some(average)) => {
                votes >= self.min_votes
                    && (self.min_vote_average..=self.max_vote_average).contains(&average)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// New-user inference strategy
    pub strategy: InferenceStrategy,
    /// Principal components of the content table to use
    pub n_components: usize,
    pub content_boost_weight: f64,
    /// Movies released before this year are discounted
    pub threshold_year: u16,
    /// Discount per year before `threshold_year`
    pub decay_rate: f64,
    /// Minimum score for a rated movie to count as a favorite
    pub favorite_threshold: f32,
    pub max_favorites: usize,
    pub similar_pool_budget: usize,
    pub per_favorite_cap: usize,
    pub edges_considered: usize,
    pub labeler: LabelerConfig,
    pub refinement: RefinementConfig,
    pub evaluation: EvaluationConfig,
    /// Fixed seed for every request; fresh OS entropy per request when unset
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: InferenceStrategy::default(),
            n_components: 25,
            content_boost_weight: 0.25,
            threshold_year: 2010,
            decay_rate: 0.015,
            favorite_threshold: 4.0,
            max_favorites: 15,
            similar_pool_budget: 30,
            per_favorite_cap: 10,
            edges_considered: 20,
            labeler: LabelerConfig::default(),
            refinement: RefinementConfig::default(),
            evaluation: EvaluationConfig::default(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_strategy(mut self, strategy: InferenceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;

        if self.n_components == 0 {
            return Err(EngineError::InvalidConfig(
                "n_components must be positive".to_string(),
            ));
        }
        if !self.content_boost_weight.is_finite() || self.content_boost_weight < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "content_boost_weight must be non-negative, got {}",
                self.content_boost_weight
            )));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "decay_rate must be non-negative, got {}",
                self.decay_rate
            )));
        }
        let labeler = &self.labeler;
        if !(labeler.majority_threshold > 0.0 && labeler.majority_threshold <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "majority_threshold must be in (0, 1], got {}",
                labeler.majority_threshold
            )));
        }
        if !(labeler.distance_threshold >= 0.0 && labeler.distance_threshold <= 2.0) {
            return Err(EngineError::InvalidConfig(format!(
                "distance_threshold must be in [0, 2], got {}",
                labeler.distance_threshold
            )));
        }
        if labeler.max_label_genres == 0 {
            return Err(EngineError::InvalidConfig(
                "max_label_genres must be positive".to_string(),
            ));
        }
        let band = &self.evaluation;
        if band.min_vote_average > band.max_vote_average {
            return Err(EngineError::InvalidConfig(format!(
                "empty evaluation score band [{}, {}]",
                band.min_vote_average, band.max_vote_average
            )));
        }
        Ok(())
    }
}
