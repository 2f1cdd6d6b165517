//! Filter to keep one candidate per movie.

use crate::traits::Filter;
use anyhow::Result;
use sources::{Candidate, UserContext};
use std::collections::HashSet;

/// Keeps the first occurrence of each movie.
///
/// Similarity candidates come before latent ones in the pool, so a movie
/// proposed by both keeps its similarity anchor.
pub struct DedupFilter;

impl Filter for DedupFilter {
    fn name(&self) -> &str {
        "DedupFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, _context: &UserContext) -> Result<Vec<Candidate>> {
        let mut seen = HashSet::with_capacity(candidates.len());
        Ok(candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.movie_id))
            .collect())
    }
}
