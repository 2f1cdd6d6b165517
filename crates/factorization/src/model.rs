//! The trained latent-factor model and its read-only prediction paths.
//!
//! A `LatentModel` is never mutated by prediction. New-user inference works
//! on a request-local latent vector and returns the score vector as its only
//! output, so one model can be shared across threads behind an `Arc`.

use crate::config::{FactorizationConfig, InferenceStrategy};
use crate::error::{ModelError, Result};
use crate::linalg;
use data_loader::{MAX_SCORE, MIN_SCORE};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use sprs::CsVec;
use tracing::debug;

/// Global factors, biases and mean of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentModel {
    pub(crate) config: FactorizationConfig,
    pub(crate) mu: f64,
    /// n_users x k; zero rows for a compact snapshot
    pub(crate) u: Array2<f64>,
    /// n_items x k
    pub(crate) v: Array2<f64>,
    pub(crate) user_bias: Array1<f64>,
    pub(crate) item_bias: Array1<f64>,
}

impl LatentModel {
    /// An untrained model with zero users and items
    pub(crate) fn empty(config: FactorizationConfig) -> Self {
        let k = config.k;
        Self {
            config,
            mu: 0.0,
            u: Array2::zeros((0, k)),
            v: Array2::zeros((0, k)),
            user_bias: Array1::zeros(0),
            item_bias: Array1::zeros(0),
        }
    }

    pub fn config(&self) -> &FactorizationConfig {
        &self.config
    }

    pub fn k(&self) -> usize {
        self.config.k
    }

    pub fn n_users(&self) -> usize {
        self.u.nrows()
    }

    pub fn n_items(&self) -> usize {
        self.v.nrows()
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn item_factors(&self) -> ArrayView2<'_, f64> {
        self.v.view()
    }

    pub fn item_bias(&self) -> ArrayView1<'_, f64> {
        self.item_bias.view()
    }

    /// True when user factors were dropped on save
    pub fn is_compact(&self) -> bool {
        self.u.nrows() == 0 && self.v.nrows() > 0
    }

    /// Predicted ratings for known users (all of them when `users` is None).
    ///
    /// Rows follow the order of `users`.
    pub fn predict(&self, users: Option<&[usize]>, clip: bool) -> Result<Array2<f64>> {
        let (u, user_bias) = match users {
            None => {
                if self.n_users() == 0 {
                    return Err(ModelError::InvalidUserIndex {
                        index: 0,
                        n_users: 0,
                    });
                }
                (self.u.clone(), self.user_bias.clone())
            }
            Some(indices) => {
                for &index in indices {
                    self.check_user(index)?;
                }
                (
                    self.u.select(Axis(0), indices),
                    self.user_bias.select(Axis(0), indices),
                )
            }
        };

        let mut prediction = u.dot(&self.v.t());
        prediction += self.mu;
        prediction += &user_bias.insert_axis(Axis(1));
        prediction += &self.item_bias;
        if clip {
            prediction.mapv_inplace(clip_score);
        }
        Ok(prediction)
    }

    /// Predicted ratings for one known user
    pub fn predict_user(&self, index: usize, clip: bool) -> Result<Array1<f64>> {
        self.check_user(index)?;
        Ok(self.score_row(self.u.row(index), self.user_bias[index], clip))
    }

    /// Predict every item for a user absent from training.
    ///
    /// `x` is the user's encoded observation vector of width `n_items`.
    pub fn predict_new<R: Rng + ?Sized>(
        &self,
        x: &CsVec<f64>,
        strategy: &InferenceStrategy,
        clip: bool,
        rng: &mut R,
    ) -> Result<Array1<f64>> {
        if x.dim() != self.n_items() {
            return Err(ModelError::DimensionMismatch {
                expected: format!("vector of width {}", self.n_items()),
                actual: format!("width {}", x.dim()),
            });
        }
        strategy.validate()?;

        let (u, user_bias) = match *strategy {
            InferenceStrategy::ClosedForm { lambda } => (self.solve_for_user(x, lambda)?, 0.0),
            InferenceStrategy::GradientDescent {
                alpha,
                lambda,
                n_iter,
            } => {
                let k = self.k();
                let noise = Normal::new(0.0, 1.0 / k as f64)
                    .map_err(|e| ModelError::InvalidConfig(e.to_string()))?;
                let start = Array1::from_shape_fn(k, |_| noise.sample(rng));
                self.refine_user(x, start, 0.0, alpha, lambda, n_iter)
            }
            InferenceStrategy::Hybrid {
                alpha,
                lambda,
                n_iter,
            } => {
                let start = self.solve_for_user(x, lambda)?;
                self.refine_user(x, start, 0.0, alpha, lambda, n_iter)
            }
        };

        debug!(
            strategy = strategy.name(),
            observed = x.nnz(),
            user_norm = linalg::norm(&u),
            "Inferred new-user factors"
        );
        Ok(self.score_row(u.view(), user_bias, clip))
    }

    /// Ridge solution for one user's latent vector with `V` held fixed:
    /// `(sum_j V_j^T V_j + lambda I) u = sum_j (x_j - mu - b_j) V_j`
    fn solve_for_user(&self, x: &CsVec<f64>, lambda: f64) -> Result<Array1<f64>> {
        let k = self.k();
        let mut a = Array2::<f64>::eye(k) * lambda;
        let mut b = Array1::<f64>::zeros(k);

        for (j, &value) in x.iter() {
            let factors = self.v.row(j);
            for p in 0..k {
                for q in 0..k {
                    a[[p, q]] += factors[p] * factors[q];
                }
            }
            let residual = value - self.mu - self.item_bias[j];
            b.scaled_add(residual, &factors);
        }

        linalg::cholesky_solve(&a, &b)
    }

    /// Gradient steps on one user's latent vector and bias with `V` fixed.
    ///
    /// Uses the mean residual over observed items; with no observations the
    /// starting point is returned unchanged.
    fn refine_user(
        &self,
        x: &CsVec<f64>,
        mut u: Array1<f64>,
        mut user_bias: f64,
        alpha: f64,
        lambda: f64,
        n_iter: usize,
    ) -> (Array1<f64>, f64) {
        let count = x.nnz();
        if count == 0 {
            return (u, user_bias);
        }
        let count = count as f64;
        let use_biases = self.config.use_biases;

        for _ in 0..n_iter {
            let mut ev = Array1::<f64>::zeros(self.k());
            let mut error_sum = 0.0;
            for (j, &value) in x.iter() {
                let factors = self.v.row(j);
                let predicted = self.mu + user_bias + self.item_bias[j] + u.dot(&factors);
                let error = value - predicted;
                ev.scaled_add(error, &factors);
                error_sum += error;
            }

            let step = ev / count - &u * lambda;
            u.scaled_add(alpha, &step);
            if use_biases {
                user_bias += alpha * (error_sum / count - lambda * user_bias);
            }
        }
        (u, user_bias)
    }

    fn score_row(&self, u: ArrayView1<'_, f64>, user_bias: f64, clip: bool) -> Array1<f64> {
        let mut scores = self.v.dot(&u);
        scores += self.mu + user_bias;
        scores += &self.item_bias;
        if clip {
            scores.mapv_inplace(clip_score);
        }
        scores
    }

    fn check_user(&self, index: usize) -> Result<()> {
        if index >= self.n_users() {
            return Err(ModelError::InvalidUserIndex {
                index,
                n_users: self.n_users(),
            });
        }
        Ok(())
    }
}

/// Clamp to the valid rating range
pub fn clip_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE as f64, MAX_SCORE as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Two items pointing in orthogonal directions
    fn toy_model() -> LatentModel {
        let config = FactorizationConfig::default().with_k(2);
        LatentModel {
            config,
            mu: 3.0,
            u: array![[1.0, 0.0], [0.0, 1.0]],
            v: array![[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]],
            user_bias: array![0.5, -0.5],
            item_bias: array![0.0, 0.25, -0.25],
        }
    }

    #[test]
    fn test_predict_known_users() {
        let model = toy_model();
        let p = model.predict(None, false).unwrap();
        assert_eq!(p.dim(), (2, 3));
        // 1.0 + 3.0 + 0.5 + 0.0
        assert!((p[[0, 0]] - 4.5).abs() < 1e-12);
        // 1.0 + 3.0 - 0.5 + 0.25
        assert!((p[[1, 1]] - 3.75).abs() < 1e-12);

        let subset = model.predict(Some(&[1]), false).unwrap();
        assert_eq!(subset.row(0), p.row(1));
    }

    #[test]
    fn test_predict_clip_and_bounds() {
        let mut model = toy_model();
        model.mu = 10.0;
        let p = model.predict(None, true).unwrap();
        assert!(p.iter().all(|&s| (0.5..=5.0).contains(&s)));

        assert!(matches!(
            model.predict(Some(&[2]), false),
            Err(ModelError::InvalidUserIndex { index: 2, n_users: 2 })
        ));
        assert!(model.predict_user(5, true).is_err());
    }

    #[test]
    fn test_predict_new_never_mutates_model() {
        let model = toy_model();
        let before = model.clone();
        let x = CsVec::new(3, vec![0], vec![5.0]);
        let mut rng = StdRng::seed_from_u64(3);

        for strategy in [
            InferenceStrategy::ClosedForm { lambda: 0.5 },
            InferenceStrategy::GradientDescent {
                alpha: 0.05,
                lambda: 0.01,
                n_iter: 20,
            },
            InferenceStrategy::Hybrid {
                alpha: 0.01,
                lambda: 0.5,
                n_iter: 10,
            },
        ] {
            let scores = model.predict_new(&x, &strategy, true, &mut rng).unwrap();
            assert_eq!(scores.len(), 3);
        }
        assert_eq!(model, before);
    }

    #[test]
    fn test_closed_form_matches_ridge_solution() {
        let model = toy_model();
        let x = CsVec::new(3, vec![0], vec![5.0]);
        let mut rng = StdRng::seed_from_u64(0);
        let scores = model
            .predict_new(&x, &InferenceStrategy::ClosedForm { lambda: 1.0 }, false, &mut rng)
            .unwrap();
        // u = (5 - 3 - 0) / (1 + 1) along the first axis
        assert!((scores[0] - (1.0 + 3.0)).abs() < 1e-12);
        assert!((scores[1] - (3.0 + 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_closed_form_with_fewer_observations_than_k() {
        let model = toy_model();
        let mut rng = StdRng::seed_from_u64(0);
        let strategy = InferenceStrategy::ClosedForm { lambda: 0.5 };

        // No observations: zero latent vector, scores fall back to the biases
        let empty = CsVec::new(3, vec![], vec![]);
        let scores = model.predict_new(&empty, &strategy, false, &mut rng).unwrap();
        assert!((scores[0] - 3.0).abs() < 1e-12);
        assert!((scores[1] - 3.25).abs() < 1e-12);
        assert!((scores[2] - 2.75).abs() < 1e-12);

        let one = CsVec::new(3, vec![2], vec![4.0]);
        assert!(model.predict_new(&one, &strategy, true, &mut rng).is_ok());

        for strategy in [
            InferenceStrategy::ClosedForm { lambda: 0.0 },
            InferenceStrategy::Hybrid {
                alpha: 0.01,
                lambda: 0.0,
                n_iter: 5,
            },
        ] {
            assert!(matches!(
                model.predict_new(&empty, &strategy, true, &mut rng),
                Err(ModelError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_gradient_descent_moves_toward_observation() {
        let model = toy_model();
        let x = CsVec::new(3, vec![0], vec![5.0]);
        let mut rng = StdRng::seed_from_u64(11);
        let strategy = InferenceStrategy::GradientDescent {
            alpha: 0.1,
            lambda: 0.0,
            n_iter: 200,
        };
        let scores = model.predict_new(&x, &strategy, false, &mut rng).unwrap();
        assert!((scores[0] - 5.0).abs() < 0.05);
    }

    #[test]
    fn test_predict_new_rejects_wrong_width() {
        let model = toy_model();
        let x = CsVec::new(7, vec![0], vec![5.0]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            model.predict_new(&x, &InferenceStrategy::default(), true, &mut rng),
            Err(ModelError::DimensionMismatch { .. })
        ));
    }
}
