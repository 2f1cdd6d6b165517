//! Content feature table: principal components of content features for the
//! subset of "tagged" movies.
//!
//! Used two ways: to boost latent-factor predictions toward movies that look
//! like what the user rated, and as the vector space for clustering a
//! candidate list.

use anyhow::{Context, Result, bail};
use data_loader::MovieId;
use data_loader::parser::parse_features;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use sprs::CsVec;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Read-only table of content vectors, one row per tagged movie
#[derive(Debug, Clone)]
pub struct ContentFeatureTable {
    /// Tagged movie ids, ascending; row `i` belongs to `ids[i]`
    ids: Vec<MovieId>,
    positions: HashMap<MovieId, usize>,
    features: Array2<f64>,
    /// Rows scaled to unit length (all-zero rows stay zero)
    normalized: Array2<f64>,
}

impl ContentFeatureTable {
    /// Load `features.dat`, keeping the first `n_components` columns
    pub fn load(path: &Path, n_components: usize) -> Result<Self> {
        let rows = parse_features(path)
            .with_context(|| format!("Failed to read content features from {}", path.display()))?;
        let table = Self::from_rows(rows, n_components)?;
        info!(
            tagged = table.len(),
            components = table.dim(),
            "Loaded content feature table"
        );
        Ok(table)
    }

    /// Build a table from (movie, components) rows.
    ///
    /// Rows narrower than `n_components` keep all of their columns.
    pub fn from_rows(mut rows: Vec<(MovieId, Vec<f32>)>, n_components: usize) -> Result<Self> {
        if n_components == 0 {
            bail!("n_components must be positive");
        }
        rows.sort_by_key(|(id, _)| *id);
        if let Some(pair) = rows.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            bail!("Duplicate content features for movie {}", pair[0].0);
        }

        let width = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
        if rows.iter().any(|(_, v)| v.len() != width) {
            bail!("Content feature rows have inconsistent widths");
        }
        let dim = width.min(n_components);
        if !rows.is_empty() && dim < n_components {
            warn!(
                requested = n_components,
                available = dim,
                "Content table has fewer components than requested"
            );
        }

        let ids: Vec<MovieId> = rows.iter().map(|(id, _)| *id).collect();
        let positions = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut features = Array2::<f64>::zeros((rows.len(), dim));
        for (i, (_, values)) in rows.iter().enumerate() {
            for (j, &value) in values.iter().take(dim).enumerate() {
                features[[i, j]] = value as f64;
            }
        }

        let normalized_rows: Vec<Vec<f64>> = (0..rows.len())
            .into_par_iter()
            .map(|i| {
                let row = features.row(i);
                let norm = row.dot(&row).sqrt();
                if norm > 0.0 {
                    row.iter().map(|v| v / norm).collect()
                } else {
                    vec![0.0; dim]
                }
            })
            .collect();
        let flat: Vec<f64> = normalized_rows.into_iter().flatten().collect();
        let normalized = Array2::from_shape_vec((rows.len(), dim), flat)?;

        Ok(Self {
            ids,
            positions,
            features,
            normalized,
        })
    }

    /// Number of tagged movies
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of components per vector
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn contains(&self, movie_id: MovieId) -> bool {
        self.positions.contains_key(&movie_id)
    }

    pub fn tagged_ids(&self) -> &[MovieId] {
        &self.ids
    }

    /// Raw content vector of a tagged movie
    pub fn get(&self, movie_id: MovieId) -> Option<ArrayView1<'_, f64>> {
        self.positions
            .get(&movie_id)
            .map(|&i| self.features.row(i))
    }

    /// Cosine similarity of every tagged movie to the user's content profile.
    ///
    /// The profile is the rating-weighted sum of the content vectors of the
    /// tagged movies the user rated. Returns (movie, similarity) in table
    /// order, or an empty vector when the user rated no tagged movie.
    pub fn user_affinity(&self, x: &CsVec<f64>) -> Vec<(MovieId, f64)> {
        let mut profile = Array1::<f64>::zeros(self.dim());
        for (col, &score) in x.iter() {
            let movie_id = (col + 1) as MovieId;
            if let Some(&row) = self.positions.get(&movie_id) {
                profile.scaled_add(score, &self.features.row(row));
            }
        }
        let norm = profile.dot(&profile).sqrt();
        if norm == 0.0 {
            return Vec::new();
        }
        profile.mapv_inplace(|v| v / norm);

        let similarities = self.normalized.dot(&profile);
        self.ids.iter().copied().zip(similarities.iter().copied()).collect()
    }

    /// Add `weight * affinity` to the predicted scores of tagged movies.
    ///
    /// `scores` is indexed by `movie_id - 1`; tagged ids beyond its length
    /// are skipped.
    pub fn apply_boost(&self, scores: &mut Array1<f64>, x: &CsVec<f64>, weight: f64) {
        for (movie_id, similarity) in self.user_affinity(x) {
            let Some(col) = (movie_id as usize).checked_sub(1) else {
                continue;
            };
            if let Some(score) = scores.get_mut(col) {
                *score += weight * similarity;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_table() -> ContentFeatureTable {
        ContentFeatureTable::from_rows(
            vec![
                (4, vec![0.0, 2.0, 9.0]),
                (1, vec![1.0, 0.0, 9.0]),
                (2, vec![2.0, 0.1, 9.0]),
                (5, vec![0.0, 0.0, 9.0]),
            ],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_rows_are_sorted_and_truncated() {
        let table = create_test_table();
        assert_eq!(table.tagged_ids(), &[1, 2, 4, 5]);
        assert_eq!(table.dim(), 2);
        assert_eq!(table.get(4).unwrap().to_vec(), vec![0.0, 2.0]);
        assert!(table.contains(5));
        assert!(!table.contains(3));
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let result = ContentFeatureTable::from_rows(vec![(1, vec![1.0]), (1, vec![2.0])], 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_user_affinity() {
        let table = create_test_table();
        // Rated movie 1 (id 1 -> column 0) and an untagged movie 3
        let x = CsVec::new(6, vec![0, 2], vec![5.0, 4.0]);
        let affinity: HashMap<MovieId, f64> = table.user_affinity(&x).into_iter().collect();

        assert!((affinity[&1] - 1.0).abs() < 1e-12);
        assert!(affinity[&2] > 0.99);
        assert!(affinity[&4].abs() < 1e-12);
        // Zero vector has no direction
        assert_eq!(affinity[&5], 0.0);
    }

    #[test]
    fn test_apply_boost_touches_only_tagged_movies() {
        let table = create_test_table();
        let x = CsVec::new(6, vec![0], vec![5.0]);
        let mut scores = Array1::<f64>::from_elem(6, 3.0);
        table.apply_boost(&mut scores, &x, 0.25);

        assert!((scores[0] - 3.25).abs() < 1e-12);
        assert_eq!(scores[2], 3.0);
        assert_eq!(scores[5], 3.0);

        // No tagged ratings, no boost
        let untagged = CsVec::new(6, vec![2], vec![5.0]);
        let mut unchanged = Array1::<f64>::from_elem(6, 3.0);
        table.apply_boost(&mut unchanged, &untagged, 0.25);
        assert!(unchanged.iter().all(|&s| s == 3.0));
    }
}
