//! Clustering of a candidate list into genre-labeled groups.
//!
//! ## Algorithm
//! 1. Candidates absent from the content table go straight to the
//!    uncategorized group
//! 2. The rest are clustered on their content vectors
//! 3. Only the `k` largest clusters are kept
//! 4. A kept cluster is labeled with the genres shared by at least
//!    `majority_threshold` of its members (at most `max_label_genres`, most
//!    frequent first); clusters with no such genre are not labeled
//! 5. Everything not placed in a labeled group is uncategorized
//!
//! Labels are compared by their sorted genre set, so `(A, B)` and `(B, A)`
//! always land in the same group.

use crate::clustering::{AgglomerativeClustering, Linkage};
use data_loader::{DataIndex, Genre, MovieId};
use ndarray::Array2;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sources::ContentFeatureTable;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Clustering and labeling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Number of largest clusters considered for labeling
    pub k: usize,
    pub linkage: Linkage,
    pub distance_threshold: f64,
    /// Share of members a genre must appear in to become part of the label
    pub majority_threshold: f64,
    pub max_label_genres: usize,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            k: 10,
            linkage: Linkage::Complete,
            distance_threshold: 0.5,
            majority_threshold: 0.66,
            max_label_genres: 2,
        }
    }
}

/// Second pass over an oversized uncategorized group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Refine only when the uncategorized group is larger than this
    pub trigger_size: usize,
    pub linkage: Linkage,
    /// Smallest recovered cluster that may open a new group
    pub min_group_size: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            trigger_size: 20,
            linkage: Linkage::Average,
            min_group_size: 4,
        }
    }
}

/// Label of a recommendation group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLabel {
    /// One or two genres, most frequent first
    Genres(Vec<Genre>),
    /// Candidates without a confident label
    Uncategorized,
}

impl GroupLabel {
    pub fn is_uncategorized(&self) -> bool {
        matches!(self, GroupLabel::Uncategorized)
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupLabel::Genres(genres) => {
                let names: Vec<&str> = genres.iter().map(|g| g.name()).collect();
                f.write_str(&names.join(" / "))
            }
            GroupLabel::Uncategorized => f.write_str("Uncategorized"),
        }
    }
}

/// One labeled group of movie ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledGroup {
    pub label: GroupLabel,
    pub movie_ids: Vec<MovieId>,
}

/// Partition of a candidate list into labeled groups plus the uncategorized
/// group
#[derive(Debug, Clone, Default)]
pub struct LabeledGroups {
    /// Labeled groups in creation order
    groups: Vec<LabeledGroup>,
    /// Sorted genre set -> position in `groups`
    index: HashMap<Vec<Genre>, usize>,
    uncategorized: Vec<MovieId>,
}

impl LabeledGroups {
    pub fn new() -> Self {
        Self::default()
    }

    fn canonical(genres: &[Genre]) -> Vec<Genre> {
        let mut key = genres.to_vec();
        key.sort();
        key
    }

    /// Group for a label in either genre order
    pub fn get(&self, genres: &[Genre]) -> Option<&LabeledGroup> {
        self.index
            .get(&Self::canonical(genres))
            .map(|&i| &self.groups[i])
    }

    pub fn contains_label(&self, genres: &[Genre]) -> bool {
        self.index.contains_key(&Self::canonical(genres))
    }

    /// Append `movie_ids` to the group for `genres`, creating it if needed
    pub fn insert(&mut self, genres: Vec<Genre>, movie_ids: Vec<MovieId>) {
        let key = Self::canonical(&genres);
        match self.index.get(&key) {
            Some(&i) => self.groups[i].movie_ids.extend(movie_ids),
            None => {
                self.index.insert(key, self.groups.len());
                self.groups.push(LabeledGroup {
                    label: GroupLabel::Genres(genres),
                    movie_ids,
                });
            }
        }
    }

    pub fn labeled(&self) -> &[LabeledGroup] {
        &self.groups
    }

    pub fn uncategorized(&self) -> &[MovieId] {
        &self.uncategorized
    }

    /// Number of groups, counting the uncategorized group
    pub fn len(&self) -> usize {
        self.groups.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    pub fn total_items(&self) -> usize {
        self.groups.iter().map(|g| g.movie_ids.len()).sum::<usize>() + self.uncategorized.len()
    }

    /// Final presentation order: labeled groups by descending size (ties
    /// keep creation order), members shuffled within each group, and the
    /// uncategorized group last regardless of size.
    pub fn into_ranked<R: Rng + ?Sized>(self, rng: &mut R) -> Vec<LabeledGroup> {
        let mut groups = self.groups;
        groups.sort_by(|a, b| b.movie_ids.len().cmp(&a.movie_ids.len()));
        groups.push(LabeledGroup {
            label: GroupLabel::Uncategorized,
            movie_ids: self.uncategorized,
        });
        for group in &mut groups {
            group.movie_ids.shuffle(rng);
        }
        groups
    }
}

/// Clusters candidates on content vectors and labels clusters by genre
pub struct ClusterLabeler {
    content: Arc<ContentFeatureTable>,
    data_index: Arc<DataIndex>,
    config: LabelerConfig,
}

impl ClusterLabeler {
    pub fn new(content: Arc<ContentFeatureTable>, data_index: Arc<DataIndex>) -> Self {
        Self {
            content,
            data_index,
            config: LabelerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LabelerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LabelerConfig {
        &self.config
    }

    /// Cluster and label with the configured parameters
    pub fn label(&self, movie_ids: &[MovieId]) -> LabeledGroups {
        self.cluster_and_label(
            movie_ids,
            self.config.k,
            self.config.linkage,
            self.config.distance_threshold,
        )
    }

    /// Partition `movie_ids` into labeled groups and the uncategorized group.
    ///
    /// Repeated ids are counted once. The uncategorized group keeps input
    /// order.
    #[instrument(skip(self, movie_ids), fields(candidates = movie_ids.len()))]
    pub fn cluster_and_label(
        &self,
        movie_ids: &[MovieId],
        k: usize,
        linkage: Linkage,
        distance_threshold: f64,
    ) -> LabeledGroups {
        let mut seen = HashSet::new();
        let unique: Vec<MovieId> = movie_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let mut taggable: Vec<MovieId> = unique
            .iter()
            .copied()
            .filter(|&id| self.content.contains(id))
            .collect();
        taggable.sort_unstable();

        let mut result = LabeledGroups::new();
        let mut placed: HashSet<MovieId> = HashSet::new();

        if !taggable.is_empty() {
            let dim = self.content.dim();
            let mut points = Array2::<f64>::zeros((taggable.len(), dim));
            for (row, &id) in taggable.iter().enumerate() {
                if let Some(vector) = self.content.get(id) {
                    points.row_mut(row).assign(&vector);
                }
            }

            let labels =
                AgglomerativeClustering::new(linkage, distance_threshold).fit_predict(points.view());

            let n_clusters = labels.iter().max().map(|m| m + 1).unwrap_or(0);
            let mut members: Vec<Vec<MovieId>> = vec![Vec::new(); n_clusters];
            for (&id, &label) in taggable.iter().zip(&labels) {
                members[label].push(id);
            }

            // Largest first; ties by cluster number
            let mut order: Vec<usize> = (0..n_clusters).collect();
            order.sort_by(|&a, &b| members[b].len().cmp(&members[a].len()));

            let mut labeled = 0;
            for &cluster in order.iter().take(k) {
                let cluster_members = std::mem::take(&mut members[cluster]);
                let genres = self.representative_genres(&cluster_members);
                if genres.is_empty() {
                    continue;
                }
                placed.extend(cluster_members.iter().copied());
                result.insert(genres, cluster_members);
                labeled += 1;
            }

            debug!(
                taggable = taggable.len(),
                clusters = n_clusters,
                labeled,
                "Clustered candidates"
            );
        }

        result.uncategorized = unique.into_iter().filter(|id| !placed.contains(id)).collect();
        result
    }

    /// Genres shared by at least `majority_threshold` of `members`, most
    /// frequent first (ties in genre order), at most `max_label_genres`
    pub fn representative_genres(&self, members: &[MovieId]) -> Vec<Genre> {
        if members.is_empty() {
            return Vec::new();
        }
        let mut counts: HashMap<Genre, usize> = HashMap::new();
        for &id in members {
            for &genre in self.data_index.get_genres(id) {
                *counts.entry(genre).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(Genre, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let total = members.len() as f64;
        ranked
            .into_iter()
            .take_while(|&(_, count)| count as f64 / total >= self.config.majority_threshold)
            .take(self.config.max_label_genres)
            .map(|(genre, _)| genre)
            .collect()
    }

    /// Re-cluster an oversized uncategorized group with relaxed linkage.
    ///
    /// Recovered clusters join an existing group with the same label, or open
    /// a new group when they have at least `min_group_size` members; anything
    /// else stays uncategorized. Runs a single pass.
    #[instrument(skip(self, groups, refinement), fields(uncategorized = groups.uncategorized.len()))]
    pub fn refine(&self, mut groups: LabeledGroups, refinement: &RefinementConfig) -> LabeledGroups {
        if groups.uncategorized.len() <= refinement.trigger_size {
            return groups;
        }

        let leftovers = std::mem::take(&mut groups.uncategorized);
        let recovered = self.cluster_and_label(
            &leftovers,
            self.config.k,
            refinement.linkage,
            self.config.distance_threshold,
        );

        let mut moved: HashSet<MovieId> = HashSet::new();
        for group in recovered.groups {
            let GroupLabel::Genres(genres) = group.label else {
                continue;
            };
            if groups.contains_label(&genres) || group.movie_ids.len() >= refinement.min_group_size
            {
                moved.extend(group.movie_ids.iter().copied());
                groups.insert(genres, group.movie_ids);
            }
        }

        groups.uncategorized = leftovers.into_iter().filter(|id| !moved.contains(id)).collect();
        debug!(
            moved = moved.len(),
            remaining = groups.uncategorized.len(),
            "Refined uncategorized group"
        );
        groups
    }

    /// Label, then refine once if the uncategorized group is too large
    pub fn label_and_refine(
        &self,
        movie_ids: &[MovieId],
        refinement: &RefinementConfig,
    ) -> LabeledGroups {
        let groups = self.label(movie_ids);
        self.refine(groups, refinement)
    }
}
