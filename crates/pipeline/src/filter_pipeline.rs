//! The FilterPipeline chains candidate filters using the builder pattern.

use crate::traits::Filter;
use anyhow::Result;
use sources::{Candidate, UserContext};
use tracing::debug;

/// Chains multiple filters together into a processing pipeline.
///
/// ## Usage
/// ```ignore
/// let pipeline = FilterPipeline::new()
///     .add_filter(KnownItemFilter::new(model.n_items()))
///     .add_filter(AlreadyRatedFilter)
///     .add_filter(DedupFilter);
///
/// let pool = pipeline.apply(candidates, &context)?;
/// ```
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter to the end of the pipeline
    pub fn add_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply all filters in order. Candidate order is preserved.
    pub fn apply(&self, candidates: Vec<Candidate>, context: &UserContext) -> Result<Vec<Candidate>> {
        let mut current = candidates;
        for filter in &self.filters {
            let input = current.len();
            current = filter.apply(current, context)?;
            debug!(
                filter = filter.name(),
                input,
                output = current.len(),
                "Filter applied"
            );
        }
        Ok(current)
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{AlreadyRatedFilter, DedupFilter, KnownItemFilter};
    use sources::CandidateSource;

    #[test]
    fn test_empty_pipeline() {
        let pipeline = FilterPipeline::new();
        let context = UserContext::default();

        let candidates = vec![
            Candidate::new(1, CandidateSource::Similarity, 0.9),
            Candidate::new(2, CandidateSource::LatentFactor, 4.2),
        ];

        let filtered = pipeline.apply(candidates, &context).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_filters_compose_in_order() {
        let context = UserContext::from_ratings(None, &[(1, 5.0)]);

        let pipeline = FilterPipeline::new()
            .add_filter(KnownItemFilter::new(5))
            .add_filter(AlreadyRatedFilter)
            .add_filter(DedupFilter);
        assert_eq!(pipeline.len(), 3);

        let candidates = vec![
            Candidate::new(1, CandidateSource::Similarity, 0.9),
            Candidate::new(3, CandidateSource::Similarity, 0.8),
            Candidate::new(9, CandidateSource::Similarity, 0.7),
            Candidate::new(2, CandidateSource::LatentFactor, 4.4),
            Candidate::new(3, CandidateSource::LatentFactor, 4.1),
        ];

        let filtered = pipeline.apply(candidates, &context).unwrap();
        let ids: Vec<u32> = filtered.iter().map(|c| c.movie_id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(filtered[0].source, CandidateSource::Similarity);
    }
}
