//! Filter to remove movies the user has already rated.
//!
//! Runs first in the pipeline: a rated movie is never a recommendation.

use crate::traits::Filter;
use anyhow::Result;
use sources::{Candidate, UserContext};

/// Removes candidates the user has already rated.
///
/// Uses the rated set in `UserContext` for O(1) lookups.
pub struct AlreadyRatedFilter;

impl Filter for AlreadyRatedFilter {
    fn name(&self) -> &str {
        "AlreadyRatedFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &UserContext) -> Result<Vec<Candidate>> {
        Ok(candidates
            .into_iter()
            .filter(|candidate| !context.has_rated(candidate.movie_id))
            .collect())
    }
}
