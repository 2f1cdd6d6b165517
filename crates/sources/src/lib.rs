//! # Sources Crate
//!
//! Candidate generation for movie recommendations.
//!
//! ## Components
//!
//! ### Similar-items source
//! Item-item expansion of the user's favorites:
//! - "Movies like the ones you loved"
//! - Samples a bounded number of precomputed neighbors per favorite
//!
//! ### Latent-factor source
//! Model-based scoring of the whole catalog:
//! - New-user inference against the trained item factors
//! - Content-affinity boost for tagged movies
//! - Temporal discount favoring contemporary movies
//!
//! ### Content feature table
//! Principal components of content features for tagged movies, shared by the
//! latent-factor boost and the clustering stage.
//!
//! ## Example Usage
//!
//! ```ignore
//! use sources::{ContentFeatureTable, LatentFactorSource, SimilarItemsSource, TemporalDiscount, user_context::build_user_context};
//! use std::sync::Arc;
//!
//! let context = build_user_context(&data_index, user_id);
//!
//! let similar = SimilarItemsSource::new(data_index.clone());
//! let latent = LatentFactorSource::new(model.clone(), content.clone(), &data_index, TemporalDiscount::default());
//!
//! let pool = similar.get_candidates(&context, &mut rng);
//! let ranked = latent.get_candidates(&context, 100, &mut rng)?;
//! ```

pub mod content;
pub mod latent;
pub mod similarity;
pub mod types;
pub mod user_context;

pub use content::ContentFeatureTable;
pub use latent::{LatentFactorSource, TemporalDiscount};
pub use similarity::SimilarItemsSource;
pub use types::{Candidate, CandidateSource, UserContext};
