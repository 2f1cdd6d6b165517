//! Agglomerative hierarchical clustering over cosine distance.
//!
//! No fixed cluster count: pairs of clusters are merged, closest first, while
//! their linkage distance is below `distance_threshold`.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Distance between two clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Largest pairwise distance between members
    Complete,
    /// Mean pairwise distance between members
    Average,
}

#[derive(Debug, Clone, Copy)]
pub struct AgglomerativeClustering {
    linkage: Linkage,
    distance_threshold: f64,
}

impl AgglomerativeClustering {
    pub fn new(linkage: Linkage, distance_threshold: f64) -> Self {
        Self {
            linkage,
            distance_threshold,
        }
    }

    /// Cluster the rows of `points`.
    ///
    /// Returns one label per row. Labels are numbered 0.. in order of each
    /// cluster's first row, so equal inputs always give equal labels.
    pub fn fit_predict(&self, points: ArrayView2<'_, f64>) -> Vec<usize> {
        let n = points.nrows();
        if n == 0 {
            return Vec::new();
        }

        let mut distances = cosine_distances(points);
        let mut sizes = vec![1usize; n];
        let mut active = vec![true; n];
        // Each row starts in its own cluster, identified by its row index
        let mut assignment: Vec<usize> = (0..n).collect();
        let mut merges = 0;

        loop {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in (0..n).filter(|&i| active[i]) {
                for j in ((i + 1)..n).filter(|&j| active[j]) {
                    let d = distances[[i, j]];
                    if best.is_none_or(|(_, _, best_d)| d < best_d) {
                        best = Some((i, j, d));
                    }
                }
            }
            let Some((keep, absorb, d)) = best else { break };
            if !(d < self.distance_threshold) {
                break;
            }

            // Lance-Williams update for the merged cluster
            for other in (0..n).filter(|&o| active[o] && o != keep && o != absorb) {
                let d_keep = distances[[keep, other]];
                let d_absorb = distances[[absorb, other]];
                let merged = match self.linkage {
                    Linkage::Complete => d_keep.max(d_absorb),
                    Linkage::Average => {
                        (sizes[keep] as f64 * d_keep + sizes[absorb] as f64 * d_absorb)
                            / (sizes[keep] + sizes[absorb]) as f64
                    }
                };
                distances[[keep, other]] = merged;
                distances[[other, keep]] = merged;
            }
            sizes[keep] += sizes[absorb];
            active[absorb] = false;
            for label in assignment.iter_mut() {
                if *label == absorb {
                    *label = keep;
                }
            }
            merges += 1;
        }

        // Renumber by first appearance
        let mut renumbered = vec![usize::MAX; n];
        let mut next = 0;
        let labels = assignment
            .iter()
            .map(|&root| {
                if renumbered[root] == usize::MAX {
                    renumbered[root] = next;
                    next += 1;
                }
                renumbered[root]
            })
            .collect();

        debug!(points = n, merges, clusters = next, "Agglomerative clustering done");
        labels
    }
}

/// Pairwise `1 - cos(a, b)`. A zero vector is at distance 1 from everything.
pub fn cosine_distances(points: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = points.nrows();
    let norms: Vec<f64> = points.outer_iter().map(|row| row.dot(&row).sqrt()).collect();

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        0.0
                    } else if norms[i] == 0.0 || norms[j] == 0.0 {
                        1.0
                    } else {
                        let cos = points.row(i).dot(&points.row(j)) / (norms[i] * norms[j]);
                        (1.0 - cos).max(0.0)
                    }
                })
                .collect()
        })
        .collect();

    Array2::from_shape_fn((n, n), |(i, j)| rows[i][j])
}
