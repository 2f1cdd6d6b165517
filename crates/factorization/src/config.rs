//! Hyperparameters for training and new-user inference.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the mini-batch size is chosen for the first epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSizePolicy {
    /// Every user row in a single batch
    Full,
    /// `n / 20 + 1` rows
    Auto,
    /// A fixed number of rows
    Fixed(usize),
}

impl BatchSizePolicy {
    /// Resolve the policy against `n` users, capped by `max_batch_size` and `n`
    pub fn resolve(&self, n: usize, max_batch_size: usize) -> usize {
        let size = match *self {
            BatchSizePolicy::Full => n,
            BatchSizePolicy::Auto => n / 20 + 1,
            BatchSizePolicy::Fixed(size) => size,
        };
        size.min(max_batch_size).min(n).max(1)
    }
}

/// Initialization of the latent factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMethod {
    /// Truncated SVD of the mean-centered rating matrix
    Svd,
    /// Gaussian noise with standard deviation 0.1
    Random,
}

impl FromStr for InitMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svd" => Ok(InitMethod::Svd),
            "random" => Ok(InitMethod::Random),
            other => Err(ModelError::InvalidConfig(format!(
                "unknown init method '{}', expected 'svd' or 'random'",
                other
            ))),
        }
    }
}

impl fmt::Display for InitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitMethod::Svd => f.write_str("svd"),
            InitMethod::Random => f.write_str("random"),
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorizationConfig {
    /// Latent dimension
    pub k: usize,
    /// Learn a global mean and per-user/per-item offsets
    pub use_biases: bool,
    /// Initial learning rate
    pub alpha: f64,
    /// L2 regularization applied to factors and biases
    pub lambda: f64,
    /// Per-epoch learning rate decay: `alpha <- alpha / (1 + decay)`
    pub decay: f64,
    /// Momentum on the item-factor gradient
    pub momentum: f64,
    pub batch_size: BatchSizePolicy,
    /// Per-epoch batch growth factor
    pub batch_growth: f64,
    pub max_batch_size: usize,
    pub init_method: InitMethod,
}

impl Default for FactorizationConfig {
    fn default() -> Self {
        Self {
            k: 8,
            use_biases: true,
            alpha: 0.1,
            lambda: 0.01,
            decay: 0.1,
            momentum: 0.75,
            batch_size: BatchSizePolicy::Fixed(50),
            batch_growth: 1.0,
            max_batch_size: 1024,
            init_method: InitMethod::Random,
        }
    }
}

impl FactorizationConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_biases(mut self, use_biases: bool) -> Self {
        self.use_biases = use_biases;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_batch_size(mut self, batch_size: BatchSizePolicy) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_growth(mut self, growth: f64) -> Self {
        self.batch_growth = growth;
        self
    }

    pub fn with_init_method(mut self, init_method: InitMethod) -> Self {
        self.init_method = init_method;
        self
    }

    /// Reject hyperparameters that cannot train
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(ModelError::InvalidConfig("k must be positive".into()));
        }
        if !(self.alpha > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }
        if !(self.lambda >= 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "lambda must be non-negative, got {}",
                self.lambda
            )));
        }
        if !(self.decay >= 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "decay must be non-negative, got {}",
                self.decay
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ModelError::InvalidConfig(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        if self.batch_size == BatchSizePolicy::Fixed(0) || self.max_batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch sizes must be positive".into()));
        }
        if !(self.batch_growth >= 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "batch_growth must be at least 1.0, got {}",
                self.batch_growth
            )));
        }
        Ok(())
    }
}

/// Strategy for inferring the latent vector of a user absent from training
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum InferenceStrategy {
    /// Ridge-regression solve against the fixed item factors
    ClosedForm { lambda: f64 },
    /// Gradient steps from a small random vector
    GradientDescent { alpha: f64, lambda: f64, n_iter: usize },
    /// Closed-form warm start refined by gradient steps
    Hybrid { alpha: f64, lambda: f64, n_iter: usize },
}

impl Default for InferenceStrategy {
    fn default() -> Self {
        InferenceStrategy::GradientDescent {
            alpha: 0.05,
            lambda: 0.005,
            n_iter: 30,
        }
    }
}

impl InferenceStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            InferenceStrategy::ClosedForm { .. } => "closed_form",
            InferenceStrategy::GradientDescent { .. } => "gradient_descent",
            InferenceStrategy::Hybrid { .. } => "hybrid",
        }
    }

    /// Ridge solves need `lambda > 0`: with fewer observations than `k` the
    /// unregularized normal equations are singular.
    pub fn validate(&self) -> Result<()> {
        let (alpha, lambda) = match *self {
            InferenceStrategy::ClosedForm { lambda } => (None, lambda),
            InferenceStrategy::GradientDescent { alpha, lambda, .. }
            | InferenceStrategy::Hybrid { alpha, lambda, .. } => (Some(alpha), lambda),
        };
        let needs_ridge = !matches!(self, InferenceStrategy::GradientDescent { .. });
        if needs_ridge && !(lambda > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "{} lambda must be positive, got {}",
                self.name(),
                lambda
            )));
        }
        if !(lambda >= 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "inference lambda must be non-negative, got {}",
                lambda
            )));
        }
        if let Some(alpha) = alpha {
            if !(alpha > 0.0) {
                return Err(ModelError::InvalidConfig(format!(
                    "inference alpha must be positive, got {}",
                    alpha
                )));
            }
        }
        Ok(())
    }
}
