//! Filter to drop candidates outside the model's item range.
//!
//! Similarity edges are read from storage and may point at movies added
//! after the model was trained.

use crate::traits::Filter;
use anyhow::Result;
use sources::{Candidate, UserContext};
use tracing::warn;

/// Removes candidates whose id is 0 or above `n_items`
pub struct KnownItemFilter {
    n_items: usize,
}

impl KnownItemFilter {
    pub fn new(n_items: usize) -> Self {
        Self { n_items }
    }
}

impl Filter for KnownItemFilter {
    fn name(&self) -> &str {
        "KnownItemFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, _context: &UserContext) -> Result<Vec<Candidate>> {
        let before = candidates.len();
        let filtered: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| candidate.movie_id >= 1 && candidate.movie_id as usize <= self.n_items)
            .collect();

        if filtered.len() < before {
            warn!(
                dropped = before - filtered.len(),
                n_items = self.n_items,
                "Dropped candidates unknown to the model"
            );
        }
        Ok(filtered)
    }
}
