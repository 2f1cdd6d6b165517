//! Core domain types for the movie catalog and the rating store.
//!
//! This module defines the read-only view the recommender has of storage:
//! - Type aliases for domain clarity (UserId, MovieId)
//! - Movies with genres, release year and external vote statistics
//! - Rating observations (one live observation per user/movie pair)
//! - Precomputed item-item similarity edges
//! - The `DataIndex` that owns all of the above

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for a movie. Ids are 1-based and dense enough that
/// `id - 1` is used as a column index by the factorization model.
pub type MovieId = u32;

/// Lowest valid rating level
pub const MIN_SCORE: f32 = 0.5;

/// Highest valid rating level
pub const MAX_SCORE: f32 = 5.0;

/// Returns true if `score` is one of the ten discrete levels 0.5, 1.0, ..., 5.0
pub fn is_valid_score(score: f32) -> bool {
    let doubled = score * 2.0;
    (MIN_SCORE..=MAX_SCORE).contains(&score) && (doubled - doubled.round()).abs() < 1e-6
}

// =============================================================================
// Movie-related Types
// =============================================================================

/// Represents a movie in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Year extracted from title (e.g., "Toy Story (1995)")
    pub year: Option<u16>,
    pub genres: Vec<Genre>,
    /// Number of external votes (popularity signal used for evaluation lists)
    pub votes: Option<u32>,
    /// External average score on a 0-10 scale
    pub vote_average: Option<f32>,
}

/// Movie genres.
///
/// `Ord` gives labels built from genres a canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Children,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Family,
    Fantasy,
    FilmNoir,
    History,
    Horror,
    Music,
    Musical,
    Mystery,
    Romance,
    SciFi,
    Thriller,
    TvMovie,
    War,
    Western,
}

impl Genre {
    /// Human-readable genre name, used in group labels
    pub fn name(&self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Children => "Children's",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Family => "Family",
            Genre::Fantasy => "Fantasy",
            Genre::FilmNoir => "Film-Noir",
            Genre::History => "History",
            Genre::Horror => "Horror",
            Genre::Music => "Music",
            Genre::Musical => "Musical",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::SciFi => "Sci-Fi",
            Genre::Thriller => "Thriller",
            Genre::TvMovie => "TV Movie",
            Genre::War => "War",
            Genre::Western => "Western",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Rating and Similarity Types
// =============================================================================

/// A single rating observation from a user for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// One of 0.5, 1.0, ..., 5.0
    pub score: f32,
    /// Unix timestamp when the rating was recorded
    pub timestamp: i64,
}

/// Precomputed similarity from `movie_id` to `other_movie_id`.
///
/// Storage is one-directional; the reverse edge may or may not exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub movie_id: MovieId,
    pub other_movie_id: MovieId,
    pub score: f32,
}

// =============================================================================
// DataIndex - The In-Memory Storage View
// =============================================================================

/// Holds the catalog, the rating observations and the similarity edges.
///
/// Loaded once at startup and shared read-only (`Arc<DataIndex>`) by every
/// component that needs storage lookups.
#[derive(Debug)]
pub struct DataIndex {
    pub(crate) movies: HashMap<MovieId, Movie>,

    /// Live observations per user, at most one per movie
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,

    /// Outgoing similarity edges per movie, sorted by descending score
    pub(crate) similarities: HashMap<MovieId, Vec<SimilarityEdge>>,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            movies: HashMap::new(),
            user_ratings: HashMap::new(),
            similarities: HashMap::new(),
        }
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Genres of a movie; empty if the movie is unknown
    pub fn get_genres(&self, id: MovieId) -> &[Genre] {
        self.movies
            .get(&id)
            .map(|m| m.genres.as_slice())
            .unwrap_or(&[])
    }

    /// All ratings made by a user, in insertion order.
    ///
    /// Returns an empty slice if the user has no ratings.
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// A user's ratings ordered by descending score (ties keep insertion order)
    pub fn get_user_ratings_by_score(&self, user_id: UserId) -> Vec<Rating> {
        let mut ratings = self.get_user_ratings(user_id).to_vec();
        ratings.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ratings
    }

    /// Top `limit` similarity edges for a movie in descending score order.
    ///
    /// Returns an empty slice if nothing was precomputed for the movie.
    pub fn get_similar(&self, movie_id: MovieId, limit: usize) -> &[SimilarityEdge] {
        let edges = self
            .similarities
            .get(&movie_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        &edges[..limit.min(edges.len())]
    }

    /// All movie ids, ascending
    pub fn get_all_movie_ids(&self) -> Vec<MovieId> {
        let mut ids: Vec<MovieId> = self.movies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All users with at least one rating, ascending
    pub fn get_all_user_ids(&self) -> Vec<UserId> {
        let ids: BTreeSet<UserId> = self.user_ratings.keys().copied().collect();
        ids.into_iter().collect()
    }

    /// Largest movie id in the catalog (0 when empty)
    pub fn max_movie_id(&self) -> MovieId {
        self.movies.keys().copied().max().unwrap_or(0)
    }

    /// Iterate over every live rating observation
    pub fn iter_ratings(&self) -> impl Iterator<Item = &Rating> + '_ {
        self.user_ratings.values().flat_map(|v| v.iter())
    }

    /// Insert a movie into the index
    pub fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    /// Insert a rating observation.
    ///
    /// An existing observation for the same (user, movie) pair is superseded
    /// unless it carries a strictly newer timestamp.
    pub fn insert_rating(&mut self, rating: Rating) {
        let ratings = self.user_ratings.entry(rating.user_id).or_default();
        match ratings.iter_mut().find(|r| r.movie_id == rating.movie_id) {
            Some(existing) => {
                if rating.timestamp >= existing.timestamp {
                    *existing = rating;
                }
            }
            None => ratings.push(rating),
        }
    }

    /// Insert a similarity edge. Call `build_secondary_indices` afterwards to
    /// restore the descending-score order.
    pub fn insert_similarity(&mut self, edge: SimilarityEdge) {
        self.similarities
            .entry(edge.movie_id)
            .or_default()
            .push(edge);
    }

    /// Get counts for debugging/validation: (movies, users, ratings, edges)
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let total_ratings = self.user_ratings.values().map(|v| v.len()).sum();
        let total_edges = self.similarities.values().map(|v| v.len()).sum();
        (
            self.movies.len(),
            self.user_ratings.len(),
            total_ratings,
            total_edges,
        )
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}
