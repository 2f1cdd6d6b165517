//! Conversion of rating observations into fixed-width sparse vectors.
//!
//! Item ids are 1-based; item `id` lives at column `id - 1`.

use crate::error::{ModelError, Result};
use data_loader::MovieId;
use sprs::{CsMat, CsVec, TriMat};
use std::collections::BTreeMap;

/// Users x items rating matrix in CSR layout
pub type RatingMatrix = CsMat<f64>;

/// Encodes (item, score) observations into vectors of width `n_items`
#[derive(Debug, Clone, Copy)]
pub struct SparseRatingEncoder {
    n_items: usize,
}

impl SparseRatingEncoder {
    pub fn new(n_items: usize) -> Self {
        Self { n_items }
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Column for a 1-based item id
    pub fn column(&self, id: MovieId) -> Result<usize> {
        let col = (id as usize).wrapping_sub(1);
        if id == 0 || col >= self.n_items {
            return Err(ModelError::InvalidItemId {
                id,
                n_items: self.n_items,
            });
        }
        Ok(col)
    }

    /// Encode one user's observations. A repeated id keeps the last score.
    pub fn encode(&self, ratings: &[(MovieId, f32)]) -> Result<CsVec<f64>> {
        let mut entries = BTreeMap::new();
        for &(id, score) in ratings {
            entries.insert(self.column(id)?, score as f64);
        }
        let (indices, data): (Vec<usize>, Vec<f64>) = entries.into_iter().unzip();
        Ok(CsVec::new(self.n_items, indices, data))
    }

    /// Build a users x items CSR matrix from (row, item id, score) triples.
    ///
    /// A repeated (row, item) pair keeps the last score.
    pub fn encode_matrix<I>(&self, observations: I, n_users: usize) -> Result<RatingMatrix>
    where
        I: IntoIterator<Item = (usize, MovieId, f32)>,
    {
        let mut entries = BTreeMap::new();
        for (row, id, score) in observations {
            if row >= n_users {
                return Err(ModelError::InvalidUserIndex {
                    index: row,
                    n_users,
                });
            }
            entries.insert((row, self.column(id)?), score as f64);
        }

        let mut triplets = TriMat::with_capacity((n_users, self.n_items), entries.len());
        for ((row, col), score) in entries {
            triplets.add_triplet(row, col, score);
        }
        Ok(triplets.to_csr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_reads_back_observed_positions() {
        let encoder = SparseRatingEncoder::new(10);
        let x = encoder.encode(&[(3, 4.5), (1, 2.0), (10, 0.5)]).unwrap();

        assert_eq!(x.dim(), 10);
        assert_eq!(x.nnz(), 3);
        assert_eq!(x.get(2), Some(&4.5));
        assert_eq!(x.get(0), Some(&2.0));
        assert_eq!(x.get(9), Some(&0.5));
        // Unobserved positions are implicit zeros
        assert_eq!(x.get(4), None);
        assert_eq!(x.to_dense()[4], 0.0);
    }

    #[test]
    fn test_duplicates_overwrite() {
        let encoder = SparseRatingEncoder::new(5);
        let x = encoder.encode(&[(2, 1.0), (2, 4.0)]).unwrap();
        assert_eq!(x.nnz(), 1);
        assert_eq!(x.get(1), Some(&4.0));
    }

    #[test]
    fn test_out_of_range_ids_are_rejected() {
        let encoder = SparseRatingEncoder::new(5);
        assert!(matches!(
            encoder.encode(&[(0, 3.0)]),
            Err(ModelError::InvalidItemId { id: 0, n_items: 5 })
        ));
        assert!(matches!(
            encoder.encode(&[(6, 3.0)]),
            Err(ModelError::InvalidItemId { id: 6, .. })
        ));
    }

    #[test]
    fn test_encode_matrix() {
        let encoder = SparseRatingEncoder::new(4);
        let x = encoder
            .encode_matrix(vec![(0, 1, 5.0), (1, 4, 3.0), (0, 1, 2.0)], 3)
            .unwrap();

        assert_eq!(x.rows(), 3);
        assert_eq!(x.cols(), 4);
        assert_eq!(x.nnz(), 2);
        assert_eq!(x.get(0, 0), Some(&2.0));
        assert_eq!(x.get(1, 3), Some(&3.0));
        assert_eq!(x.outer_view(2).map(|row| row.nnz()), Some(0));

        assert!(encoder.encode_matrix(vec![(3, 1, 5.0)], 3).is_err());
    }
}
