//! DataIndex building and indexing logic.
//!
//! Builds the DataIndex from parsed storage exports:
//! - Primary data (movies, ratings, similarity edges)
//! - Score-ordered similarity lists
//! - Referential integrity checks

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use std::path::Path;
use tracing::{info, warn};

impl DataIndex {
    /// Load the catalog, ratings and similarity edges from a directory
    ///
    /// `movies.dat` and `ratings.dat` are required. `similarities.dat` is
    /// optional; without it every similarity lookup is empty.
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        info!(data_dir = %data_dir.display(), "Loading dataset");

        let movies_path = data_dir.join("movies.dat");
        let ratings_path = data_dir.join("ratings.dat");
        let similarities_path = data_dir.join("similarities.dat");

        let ((movies, ratings), edges) = rayon::join(
            || {
                rayon::join(
                    || parser::parse_movies(&movies_path),
                    || parser::parse_ratings(&ratings_path),
                )
            },
            || {
                if similarities_path.exists() {
                    parser::parse_similarities(&similarities_path)
                } else {
                    warn!("similarities.dat not found, similar-item lookups will be empty");
                    Ok(Vec::new())
                }
            },
        );

        let movies = movies?;
        let ratings = ratings?;
        let edges = edges?;

        info!(
            movies = movies.len(),
            ratings = ratings.len(),
            edges = edges.len(),
            "Parsed storage files"
        );

        let mut index = DataIndex::new();

        for movie in movies {
            index.insert_movie(movie);
        }

        // Later observations for the same (user, movie) pair supersede earlier ones
        for rating in ratings {
            index.insert_rating(rating);
        }

        for edge in edges {
            index.insert_similarity(edge);
        }

        index.build_secondary_indices();
        index.validate()?;

        let (n_movies, n_users, n_ratings, n_edges) = index.counts();
        info!(
            movies = n_movies,
            users = n_users,
            ratings = n_ratings,
            edges = n_edges,
            "DataIndex built and validated"
        );
        Ok(index)
    }

    /// Build secondary indices after primary data is loaded
    ///
    /// Sorts every movie's similarity edges by descending score (ties by
    /// neighbor id).
    pub fn build_secondary_indices(&mut self) {
        for edges in self.similarities.values_mut() {
            edges.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.other_movie_id.cmp(&b.other_movie_id))
            });
        }
    }

    /// Validate data integrity
    ///
    /// Every rating and both ends of every similarity edge must reference a
    /// movie in the catalog, and every score must be a valid level.
    pub fn validate(&self) -> Result<()> {
        for rating in self.iter_ratings() {
            if !self.movies.contains_key(&rating.movie_id) {
                return Err(DataLoadError::MissingReference {
                    entity: "Movie".to_string(),
                    id: rating.movie_id,
                });
            }
            if !is_valid_score(rating.score) {
                return Err(DataLoadError::InvalidValue {
                    field: "score".to_string(),
                    value: rating.score.to_string(),
                });
            }
        }

        for edge in self.similarities.values().flatten() {
            for id in [edge.movie_id, edge.other_movie_id] {
                if !self.movies.contains_key(&id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "Movie".to_string(),
                        id,
                    });
                }
            }
        }
        Ok(())
    }
}
