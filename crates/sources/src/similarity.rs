//! Similar-items source: expands the user's favorites through precomputed
//! item-item similarity edges.
//!
//! ## Algorithm
//! 1. Take up to `max_favorites` of the user's highest-scored movies with
//!    score >= `favorite_threshold`
//! 2. Give each favorite a share of the pool:
//!    `min(pool_budget / n_favorites, per_favorite_cap)`
//! 3. Sample that many neighbors without replacement from the favorite's top
//!    `edges_considered` edges (all of them if there are fewer)
//! 4. Drop movies the user already rated and duplicates across favorites

use crate::types::{Candidate, CandidateSource, UserContext};
use data_loader::{DataIndex, MovieId};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Candidate source backed by the precomputed similarity table
pub struct SimilarItemsSource {
    /// Shared reference to the data index (read-only, so no Mutex needed)
    data_index: Arc<DataIndex>,

    /// Minimum score for a rated movie to count as a favorite
    favorite_threshold: f32,

    max_favorites: usize,

    /// Total number of similar items to draw across all favorites
    pool_budget: usize,

    per_favorite_cap: usize,

    /// How many of a favorite's top edges are eligible for sampling
    edges_considered: usize,
}

impl SimilarItemsSource {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self {
            data_index,
            favorite_threshold: 4.0,
            max_favorites: 15,
            pool_budget: 30,
            per_favorite_cap: 10,
            edges_considered: 20,
        }
    }

    /// Configure the favorite threshold (default: 4.0)
    pub fn with_favorite_threshold(mut self, threshold: f32) -> Self {
        self.favorite_threshold = threshold;
        self
    }

    /// Configure how many favorites are expanded (default: 15)
    pub fn with_max_favorites(mut self, max: usize) -> Self {
        self.max_favorites = max;
        self
    }

    /// Configure the sampling budget (defaults: 30 total, 10 per favorite,
    /// drawn from the top 20 edges)
    pub fn with_sampling(
        mut self,
        pool_budget: usize,
        per_favorite_cap: usize,
        edges_considered: usize,
    ) -> Self {
        self.pool_budget = pool_budget;
        self.per_favorite_cap = per_favorite_cap;
        self.edges_considered = edges_considered;
        self
    }

    /// Sample similar items of the user's favorites
    #[instrument(skip(self, user_context, rng), fields(user_id = ?user_context.user_id))]
    pub fn get_candidates<R: Rng + ?Sized>(
        &self,
        user_context: &UserContext,
        rng: &mut R,
    ) -> Vec<Candidate> {
        let favorites = user_context.favorites(self.favorite_threshold, self.max_favorites);
        if favorites.is_empty() {
            debug!("No favorites, skipping similarity expansion");
            return Vec::new();
        }
        let per_favorite = (self.pool_budget / favorites.len()).min(self.per_favorite_cap);

        let mut seen: HashSet<MovieId> = HashSet::new();
        let mut candidates = Vec::new();
        for &favorite in &favorites {
            let edges = self.data_index.get_similar(favorite, self.edges_considered);
            for edge in edges.choose_multiple(rng, per_favorite) {
                let movie_id = edge.other_movie_id;
                if user_context.has_rated(movie_id) || !seen.insert(movie_id) {
                    continue;
                }
                candidates.push(
                    Candidate::new(movie_id, CandidateSource::Similarity, edge.score as f64)
                        .with_anchor(favorite),
                );
            }
        }

        debug!(
            favorites = favorites.len(),
            per_favorite,
            candidates = candidates.len(),
            "Generated similarity candidates"
        );
        candidates
    }
}
