//! Latent-factor source: scores every movie for a (possibly unseen) user and
//! ranks the ones they have not rated.
//!
//! ## Scoring
//! 1. Encode the user's ratings into a sparse vector
//! 2. Infer the user's factors against the fixed item factors
//! 3. Boost tagged movies by content affinity to the user's ratings
//! 4. Subtract `max(0, threshold_year - release_year) * decay_rate`

use crate::content::ContentFeatureTable;
use crate::types::{Candidate, CandidateSource, UserContext};
use anyhow::Result;
use data_loader::{DataIndex, MovieId};
use factorization::{InferenceStrategy, LatentModel, SparseRatingEncoder};
use ndarray::Array1;
use rand::Rng;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Release-year penalty: `max(0, threshold_year - year) * decay_rate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalDiscount {
    pub threshold_year: u16,
    pub decay_rate: f64,
}

impl Default for TemporalDiscount {
    fn default() -> Self {
        Self {
            threshold_year: 2010,
            decay_rate: 0.015,
        }
    }
}

/// Candidate source backed by the latent-factor model
pub struct LatentFactorSource {
    model: Arc<LatentModel>,
    content: Arc<ContentFeatureTable>,
    encoder: SparseRatingEncoder,
    strategy: InferenceStrategy,
    content_boost_weight: f64,
    /// Non-positive offset per item, indexed by `movie_id - 1`
    temporal_discount: Array1<f64>,
}

impl LatentFactorSource {
    /// Create a source with the default content boost (0.25). The discount
    /// table is built here once from the catalog's release years.
    pub fn new(
        model: Arc<LatentModel>,
        content: Arc<ContentFeatureTable>,
        data_index: &DataIndex,
        discount: TemporalDiscount,
    ) -> Self {
        let encoder = SparseRatingEncoder::new(model.n_items());
        let temporal_discount = compute_temporal_discount(data_index, model.n_items(), discount);
        Self {
            model,
            content,
            encoder,
            strategy: InferenceStrategy::default(),
            content_boost_weight: 0.25,
            temporal_discount,
        }
    }

    pub fn with_strategy(mut self, strategy: InferenceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_content_boost(mut self, weight: f64) -> Self {
        self.content_boost_weight = weight;
        self
    }

    pub fn encoder(&self) -> &SparseRatingEncoder {
        &self.encoder
    }

    /// Boosted and discounted score for every movie, indexed by `movie_id - 1`
    #[instrument(skip(self, user_context, rng), fields(user_id = ?user_context.user_id))]
    pub fn score_all<R: Rng + ?Sized>(
        &self,
        user_context: &UserContext,
        rng: &mut R,
    ) -> Result<Array1<f64>> {
        let x = self.encoder.encode(&user_context.ratings)?;
        let mut scores = self.model.predict_new(&x, &self.strategy, true, rng)?;
        self.content
            .apply_boost(&mut scores, &x, self.content_boost_weight);
        scores += &self.temporal_discount;
        Ok(scores)
    }

    /// The `limit` best-scored movies the user has not rated
    pub fn get_candidates<R: Rng + ?Sized>(
        &self,
        user_context: &UserContext,
        limit: usize,
        rng: &mut R,
    ) -> Result<Vec<Candidate>> {
        let scores = self.score_all(user_context, rng)?;
        let candidates: Vec<Candidate> = rank_movies(&scores)
            .into_iter()
            .filter(|&(movie_id, _)| !user_context.has_rated(movie_id))
            .take(limit)
            .map(|(movie_id, score)| Candidate::new(movie_id, CandidateSource::LatentFactor, score))
            .collect();

        debug!(candidates = candidates.len(), "Generated latent-factor candidates");
        Ok(candidates)
    }
}

/// (movie, score) pairs in descending score order; ties by ascending id
fn rank_movies(scores: &Array1<f64>) -> Vec<(MovieId, f64)> {
    let mut ranked: Vec<(MovieId, f64)> = scores
        .iter()
        .enumerate()
        .map(|(col, &score)| ((col + 1) as MovieId, score))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    ranked
}

/// `-max(0, threshold_year - year) * decay_rate` per item; unknown years and
/// movies missing from the catalog are not discounted
fn compute_temporal_discount(
    data_index: &DataIndex,
    n_items: usize,
    discount: TemporalDiscount,
) -> Array1<f64> {
    let TemporalDiscount {
        threshold_year,
        decay_rate,
    } = discount;
    let discount: Vec<f64> = (0..n_items)
        .into_par_iter()
        .map(|col| {
            let year = data_index
                .get_movie((col + 1) as MovieId)
                .and_then(|movie| movie.year);
            match year {
                Some(year) if year < threshold_year => {
                    -((threshold_year - year) as f64) * decay_rate
                }
                _ => 0.0,
            }
        })
        .collect();
    Array1::from(discount)
}
