//! Core trait for the candidate filtering pipeline.

use anyhow::Result;
use sources::{Candidate, UserContext};

/// A composable step that removes candidates from a pool.
///
/// - `Send + Sync` so one pipeline can serve concurrent requests
/// - Filters take ownership of the Vec<Candidate> and return the survivors,
///   keeping their relative order
pub trait Filter: Send + Sync {
    /// Name of this filter (for logging)
    fn name(&self) -> &str;

    fn apply(&self, candidates: Vec<Candidate>, context: &UserContext) -> Result<Vec<Candidate>>;
}
