//! # Factorization Crate
//!
//! Latent-factor rating model: sparse encoding of observations, mini-batch
//! SGD training, new-user inference and snapshot persistence.
//!
//! ## Main Components
//!
//! - **encoder**: `SparseRatingEncoder`, (item, score) pairs to fixed-width sparse vectors
//! - **config**: training hyperparameters and new-user `InferenceStrategy`
//! - **model**: `LatentModel`, the immutable trained parameters and predictions
//! - **trainer**: `MatrixFactorization`, initialization and SGD epochs
//! - **persistence**: full and compact JSON snapshots
//! - **linalg**: Cholesky solve, Jacobi eigen-decomposition, truncated SVD
//!
//! ## Example Usage
//!
//! ```ignore
//! use factorization::{FactorizationConfig, InferenceStrategy, MatrixFactorization, SparseRatingEncoder};
//!
//! let encoder = SparseRatingEncoder::new(n_items);
//! let x = encoder.encode_matrix(observations, n_users)?;
//!
//! let mut mf = MatrixFactorization::new(FactorizationConfig::default())?;
//! mf.train(&x, 20, &mut rng)?;
//! mf.save_compact(Path::new("model.json"))?;
//!
//! let scores = mf.model().predict_new(&encoder.encode(&[(1, 5.0)])?, &InferenceStrategy::default(), true, &mut rng)?;
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod linalg;
pub mod model;
pub mod persistence;
pub mod trainer;

pub use config::{BatchSizePolicy, FactorizationConfig, InferenceStrategy, InitMethod};
pub use encoder::{RatingMatrix, SparseRatingEncoder};
pub use error::{ModelError, Result};
pub use model::{LatentModel, clip_score};
pub use trainer::MatrixFactorization;
