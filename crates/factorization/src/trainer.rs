//! Mini-batch SGD training of the latent-factor model.
//!
//! Training is an offline job: the trainer owns the only mutable copy of the
//! parameters, and the live path receives a finished `LatentModel` snapshot.

use crate::config::{FactorizationConfig, InitMethod};
use crate::error::{ModelError, Result};
use crate::linalg;
use crate::model::LatentModel;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use sprs::CsMat;
use tracing::{debug, info, instrument};

/// Subspace iterations used by the SVD initializer
const SVD_POWER_ITERATIONS: usize = 4;

/// Trainer state: the model plus everything needed to resume training
#[derive(Debug, Clone)]
pub struct MatrixFactorization {
    pub(crate) model: LatentModel,
    /// Momentum buffer for the item-factor gradient
    pub(crate) grad_v: Option<Array2<f64>>,
    pub(crate) epochs: usize,
    /// Learning rate for the next epoch, once training has started
    pub(crate) current_alpha: Option<f64>,
    /// Batch size for the next epoch, once training has started
    pub(crate) current_batch_size: Option<usize>,
    pub(crate) initialized: bool,
}

/// Per-user residuals of one batch, computed before any parameter moves
struct UserResidual {
    row: usize,
    /// (column, error) at each observed position
    errors: Vec<(usize, f64)>,
    ev: Array1<f64>,
    error_sum: f64,
}

impl MatrixFactorization {
    pub fn new(config: FactorizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model: LatentModel::empty(config),
            grad_v: None,
            epochs: 0,
            current_alpha: None,
            current_batch_size: None,
            initialized: false,
        })
    }

    pub fn config(&self) -> &FactorizationConfig {
        &self.model.config
    }

    pub fn model(&self) -> &LatentModel {
        &self.model
    }

    pub fn into_model(self) -> LatentModel {
        self.model
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Completed epochs across every `train` call
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Set `mu` and both factor matrices from the training matrix and zero the
    /// biases. Resets any training progress.
    #[instrument(skip(self, x, rng), fields(users = x.rows(), items = x.cols()))]
    pub fn initialize<R: Rng + ?Sized>(&mut self, x: &CsMat<f64>, rng: &mut R) -> Result<()> {
        let (n, d) = (x.rows(), x.cols());
        let config = &self.model.config;
        let k = config.k;

        let mu = if config.use_biases && x.nnz() > 0 {
            x.data().iter().sum::<f64>() / x.nnz() as f64
        } else {
            0.0
        };

        let (u, v) = match config.init_method {
            InitMethod::Svd => {
                let mut centered = x.clone();
                centered.map_inplace(|value| value - mu);
                let (u, s, v) = linalg::truncated_svd(&centered, k, SVD_POWER_ITERATIONS, rng)?;
                let scale = s.mapv(|sigma| sigma.sqrt() / 2.0);
                (u * &scale, v * &scale)
            }
            InitMethod::Random => {
                let noise =
                    Normal::new(0.0, 0.1).map_err(|e| ModelError::InvalidConfig(e.to_string()))?;
                let u = Array2::from_shape_fn((n, k), |_| noise.sample(rng));
                let v = Array2::from_shape_fn((d, k), |_| noise.sample(rng));
                (u, v)
            }
        };

        self.model.mu = mu;
        self.model.u = u;
        self.model.v = v;
        self.model.user_bias = Array1::zeros(n);
        self.model.item_bias = Array1::zeros(d);
        self.grad_v = None;
        self.epochs = 0;
        self.current_alpha = None;
        self.current_batch_size = None;
        self.initialized = true;

        info!(method = %self.model.config.init_method, mu, "Initialized parameters");
        Ok(())
    }

    /// Run `n_epochs` of mini-batch SGD over the users x items matrix `x`.
    ///
    /// Initializes on first use. Learning rate decay, batch growth and the
    /// momentum buffer carry over between calls.
    #[instrument(skip(self, x, rng), fields(users = x.rows(), items = x.cols()))]
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        x: &CsMat<f64>,
        n_epochs: usize,
        rng: &mut R,
    ) -> Result<()> {
        if n_epochs == 0 {
            return Err(ModelError::InvalidConfig(
                "n_epochs must be a positive integer".into(),
            ));
        }
        if !x.is_csr() {
            return Err(ModelError::InvalidConfig(
                "training matrix must be in CSR layout".into(),
            ));
        }
        if !self.initialized {
            self.initialize(x, rng)?;
        }
        let (n, d) = (x.rows(), x.cols());
        if n != self.model.n_users() || d != self.model.n_items() {
            return Err(ModelError::DimensionMismatch {
                expected: format!("{}x{}", self.model.n_users(), self.model.n_items()),
                actual: format!("{}x{}", n, d),
            });
        }

        let config = self.model.config.clone();
        let mut indices: Vec<usize> = (0..n).collect();

        for _ in 0..n_epochs {
            let batch_size = self
                .current_batch_size
                .unwrap_or_else(|| config.batch_size.resolve(n, config.max_batch_size));
            let alpha = self.current_alpha.unwrap_or(config.alpha);

            indices.shuffle(rng);
            for batch in indices.chunks(batch_size) {
                self.update_batch(x, batch, alpha);
            }
            self.epochs += 1;

            let grown = (batch_size as f64 * config.batch_growth) as usize;
            self.current_batch_size = Some(grown.min(config.max_batch_size).min(n).max(1));
            self.current_alpha = Some(alpha / (1.0 + config.decay));

            info!(
                epoch = self.epochs,
                batch_size,
                alpha,
                user_bias_norm = linalg::norm(&self.model.user_bias),
                item_bias_norm = linalg::norm(&self.model.item_bias),
                u_norm = linalg::norm(&self.model.u),
                v_norm = linalg::norm(&self.model.v),
                "Epoch finished"
            );
        }
        Ok(())
    }

    /// One SGD step on the users in `batch`.
    ///
    /// Gradients are averaged over observed entries per row (for `U` and user
    /// biases) and per column (for `V` and item biases). Rows and columns
    /// with no observations in the batch get a zero data term.
    fn update_batch(&mut self, x: &CsMat<f64>, batch: &[usize], alpha: f64) {
        let model = &self.model;
        let config = &model.config;
        let k = config.k;
        let lambda = config.lambda;

        let residuals: Vec<UserResidual> = batch
            .par_iter()
            .map(|&row| {
                let factors = model.u.row(row);
                let bias = model.user_bias[row];
                let mut ev = Array1::<f64>::zeros(k);
                let mut errors = Vec::new();
                let mut error_sum = 0.0;
                if let Some(observed) = x.outer_view(row) {
                    for (j, &value) in observed.iter() {
                        let item = model.v.row(j);
                        let predicted = model.mu + bias + model.item_bias[j] + factors.dot(&item);
                        let error = value - predicted;
                        ev.scaled_add(error, &item);
                        errors.push((j, error));
                        error_sum += error;
                    }
                }
                UserResidual {
                    row,
                    errors,
                    ev,
                    error_sum,
                }
            })
            .collect();

        // Column sums use the user factors from before this step
        let d = model.n_items();
        let mut eu = Array2::<f64>::zeros((d, k));
        let mut item_error_sums = Array1::<f64>::zeros(d);
        let mut item_counts = vec![0usize; d];
        for residual in &residuals {
            let factors = model.u.row(residual.row);
            for &(j, error) in &residual.errors {
                eu.row_mut(j).scaled_add(error, &factors);
                item_error_sums[j] += error;
                item_counts[j] += 1;
            }
        }
        for (j, &count) in item_counts.iter().enumerate() {
            if count > 0 {
                eu.row_mut(j).mapv_inplace(|value| value / count as f64);
                item_error_sums[j] /= count as f64;
            }
        }

        let use_biases = config.use_biases;
        let momentum = config.momentum;

        for residual in &residuals {
            let count = residual.errors.len();
            let row = residual.row;
            let data_term = if count > 0 {
                &residual.ev / count as f64
            } else {
                Array1::zeros(k)
            };
            let step = data_term - &self.model.u.row(row) * lambda;
            self.model.u.row_mut(row).scaled_add(alpha, &step);

            if use_biases {
                let mean_error = if count > 0 {
                    residual.error_sum / count as f64
                } else {
                    0.0
                };
                let bias = self.model.user_bias[row];
                self.model.user_bias[row] += alpha * (mean_error - lambda * bias);
            }
        }

        let fresh = eu - &self.model.v * lambda;
        let grad_v = match self.grad_v.take() {
            Some(previous) => previous * momentum + fresh * (1.0 - momentum),
            None => fresh,
        };
        self.model.v.scaled_add(alpha, &grad_v);
        self.grad_v = Some(grad_v);

        if use_biases {
            let step = item_error_sums - &self.model.item_bias * lambda;
            self.model.item_bias.scaled_add(alpha, &step);
        }

        debug!(batch = batch.len(), "Batch updated");
    }
}
