//! Candidate and user-context types shared by the candidate sources.

use data_loader::{MovieId, UserId};
use std::collections::HashSet;

/// Which source produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSource {
    /// Precomputed item-item similarity of one of the user's favorites
    Similarity,
    /// Ranked by the latent-factor prediction
    LatentFactor,
}

/// A movie proposed for recommendation
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub movie_id: MovieId,
    pub source: CandidateSource,
    /// Edge score for similarity candidates, boosted prediction for latent ones
    pub score: f64,
    /// The favorite whose similarity edge produced this candidate
    pub anchor: Option<MovieId>,
}

impl Candidate {
    pub fn new(movie_id: MovieId, source: CandidateSource, score: f64) -> Self {
        Self {
            movie_id,
            source,
            score,
            anchor: None,
        }
    }

    pub fn with_anchor(mut self, anchor: MovieId) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// Everything candidate generation needs to know about one user.
///
/// The user may be absent from training (`user_id` is None for ad-hoc rating
/// lists).
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub user_id: Option<UserId>,
    /// (movie, score), descending by score; ties keep input order
    pub ratings: Vec<(MovieId, f32)>,
    pub rated: HashSet<MovieId>,
}

impl UserContext {
    /// Build a context from raw observations. A repeated movie keeps its
    /// last score.
    pub fn from_ratings(user_id: Option<UserId>, ratings: &[(MovieId, f32)]) -> Self {
        let mut deduped: Vec<(MovieId, f32)> = Vec::with_capacity(ratings.len());
        for &(movie_id, score) in ratings {
            match deduped.iter_mut().find(|(id, _)| *id == movie_id) {
                Some(existing) => existing.1 = score,
                None => deduped.push((movie_id, score)),
            }
        }
        deduped.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let rated = deduped.iter().map(|&(id, _)| id).collect();
        Self {
            user_id,
            ratings: deduped,
            rated,
        }
    }

    pub fn has_rated(&self, movie_id: MovieId) -> bool {
        self.rated.contains(&movie_id)
    }

    /// Up to `max` highest-scored movies with score >= `threshold`
    pub fn favorites(&self, threshold: f32, max: usize) -> Vec<MovieId> {
        self.ratings
            .iter()
            .take_while(|&&(_, score)| score >= threshold)
            .take(max)
            .map(|&(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_orders_and_deduplicates() {
        let ctx = UserContext::from_ratings(None, &[(1, 3.0), (2, 5.0), (3, 4.0), (1, 4.5)]);
        assert_eq!(ctx.ratings, vec![(2, 5.0), (1, 4.5), (3, 4.0)]);
        assert!(ctx.has_rated(1));
        assert!(!ctx.has_rated(9));
    }

    #[test]
    fn test_favorites_threshold_and_cap() {
        let ctx = UserContext::from_ratings(Some(7), &[(1, 5.0), (2, 4.0), (3, 3.5), (4, 4.5)]);
        assert_eq!(ctx.favorites(4.0, 15), vec![1, 4, 2]);
        assert_eq!(ctx.favorites(4.0, 2), vec![1, 4]);
        assert!(ctx.favorites(5.5, 15).is_empty());
    }

    #[test]
    fn test_candidate_creation() {
        let candidate = Candidate::new(1, CandidateSource::Similarity, 0.85).with_anchor(42);
        assert_eq!(candidate.movie_id, 1);
        assert_eq!(candidate.source, CandidateSource::Similarity);
        assert_eq!(candidate.score, 0.85);
        assert_eq!(candidate.anchor, Some(42));
    }
}
