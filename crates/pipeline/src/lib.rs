//! Candidate filtering, clustering and genre labeling.
//!
//! This crate provides:
//! - The `Filter` trait and `FilterPipeline` for cleaning a raw candidate pool
//! - Agglomerative clustering over cosine distance
//! - `ClusterLabeler`, which splits a pool into genre-labeled groups plus one
//!   uncategorized group
//!
//! ## Architecture
//! A recommendation request passes its candidate pool through:
//! 1. Filters that drop unknown, already rated and repeated movies
//! 2. Clustering of the surviving movies on their content vectors
//! 3. Labeling of the largest clusters by their majority genres
//! 4. An optional refinement pass over an oversized uncategorized group
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::filters::*;
//! use pipeline::{ClusterLabeler, FilterPipeline, RefinementConfig};
//!
//! let pool = FilterPipeline::new()
//!     .add_filter(AlreadyRatedFilter)
//!     .add_filter(DedupFilter)
//!     .apply(candidates, &context)?;
//!
//! let ids: Vec<MovieId> = pool.iter().map(|c| c.movie_id).collect();
//! let labeler = ClusterLabeler::new(content.clone(), index.clone());
//! let groups = labeler.label_and_refine(&ids, &RefinementConfig::default());
//! let ranked = groups.into_ranked(&mut rng);
//! ```

pub mod clustering;
pub mod filter_pipeline;
pub mod filters;
pub mod labeler;
pub mod traits;

pub use clustering::{AgglomerativeClustering, Linkage, cosine_distances};
pub use filter_pipeline::FilterPipeline;
pub use labeler::{
    ClusterLabeler, GroupLabel, LabeledGroup, LabeledGroups, LabelerConfig, RefinementConfig,
};
pub use traits::Filter;
