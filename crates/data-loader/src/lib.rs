//! # Data Loader Crate
//!
//! Read-only view of the storage layer used by the recommender.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (Movie, Rating, SimilarityEdge, DataIndex)
//! - **parser**: Parse the `::`-separated export files into Rust structs
//! - **index**: Build the DataIndex and its secondary indices
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//!
//! let index = DataIndex::load_from_files(Path::new("data/catalog"))?;
//!
//! let movie = index.get_movie(1193).unwrap();
//! let ratings = index.get_user_ratings(1);
//! let neighbors = index.get_similar(1193, 20);
//! ```

pub mod error;
pub mod index;
pub mod parser;
pub mod types;

pub use error::{DataLoadError, Result};
pub use types::{
    is_valid_score, DataIndex, Genre, Movie, MovieId, Rating, SimilarityEdge, UserId, MAX_SCORE,
    MIN_SCORE,
};
