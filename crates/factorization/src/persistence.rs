//! JSON snapshots of trainer and model state.
//!
//! A snapshot is written to a temporary sibling file and renamed into place,
//! so readers only ever see a complete parameter set. Loading validates every
//! shape before anything is applied.

use crate::config::FactorizationConfig;
use crate::error::{ModelError, Result};
use crate::model::LatentModel;
use crate::trainer::MatrixFactorization;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Bumped whenever the snapshot layout changes
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    config: FactorizationConfig,
    mu: f64,
    u: Array2<f64>,
    v: Array2<f64>,
    user_bias: Array1<f64>,
    item_bias: Array1<f64>,
    grad_v: Option<Array2<f64>>,
    epochs: usize,
    current_alpha: Option<f64>,
    current_batch_size: Option<usize>,
}

impl Snapshot {
    fn from_trainer(mf: &MatrixFactorization, compact: bool) -> Self {
        let model = &mf.model;
        let k = model.config.k;
        let (u, user_bias, grad_v) = if compact {
            (Array2::zeros((0, k)), Array1::zeros(0), None)
        } else {
            (model.u.clone(), model.user_bias.clone(), mf.grad_v.clone())
        };
        Self {
            version: SNAPSHOT_VERSION,
            config: model.config.clone(),
            mu: model.mu,
            u,
            v: model.v.clone(),
            user_bias,
            item_bias: model.item_bias.clone(),
            grad_v,
            epochs: mf.epochs,
            current_alpha: mf.current_alpha,
            current_batch_size: mf.current_batch_size,
        }
    }

    /// Every shape must agree with `config.k` and with each other
    fn validate(&self) -> Result<()> {
        let corrupt = |reason: String| Err(ModelError::CorruptState(reason));

        if self.version != SNAPSHOT_VERSION {
            return corrupt(format!(
                "snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            ));
        }
        let k = self.config.k;
        if self.v.ncols() != k {
            return corrupt(format!("item factors have {} columns, k = {}", self.v.ncols(), k));
        }
        if self.u.ncols() != k {
            return corrupt(format!("user factors have {} columns, k = {}", self.u.ncols(), k));
        }
        if self.user_bias.len() != self.u.nrows() {
            return corrupt(format!(
                "{} user biases for {} users",
                self.user_bias.len(),
                self.u.nrows()
            ));
        }
        if self.item_bias.len() != self.v.nrows() {
            return corrupt(format!(
                "{} item biases for {} items",
                self.item_bias.len(),
                self.v.nrows()
            ));
        }
        if let Some(grad_v) = &self.grad_v {
            if grad_v.dim() != self.v.dim() {
                return corrupt(format!(
                    "momentum buffer is {:?}, item factors are {:?}",
                    grad_v.dim(),
                    self.v.dim()
                ));
            }
        }
        if !self.mu.is_finite() {
            return corrupt("global mean is not finite".into());
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)
            .map_err(|e| ModelError::CorruptState(format!("{}: {}", path.display(), e)))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn write(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn into_trainer(self) -> MatrixFactorization {
        let initialized = self.v.nrows() > 0;
        MatrixFactorization {
            model: LatentModel {
                config: self.config,
                mu: self.mu,
                u: self.u,
                v: self.v,
                user_bias: self.user_bias,
                item_bias: self.item_bias,
            },
            grad_v: self.grad_v,
            epochs: self.epochs,
            current_alpha: self.current_alpha,
            current_batch_size: self.current_batch_size,
            initialized,
        }
    }
}

impl MatrixFactorization {
    /// Persist the full training state
    pub fn save(&self, path: &Path) -> Result<()> {
        Snapshot::from_trainer(self, false).write(path)?;
        info!(path = %path.display(), epochs = self.epochs, "Saved model snapshot");
        Ok(())
    }

    /// Persist only what new-user inference needs: item factors, item biases
    /// and the global mean. User factors, user biases and the momentum buffer
    /// are dropped.
    pub fn save_compact(&self, path: &Path) -> Result<()> {
        Snapshot::from_trainer(self, true).write(path)?;
        info!(path = %path.display(), epochs = self.epochs, "Saved compact model snapshot");
        Ok(())
    }

    /// Load a trainer from a snapshot, including its own configuration
    pub fn load(path: &Path) -> Result<Self> {
        let trainer = Snapshot::read(path)?.into_trainer();
        info!(
            path = %path.display(),
            users = trainer.model.n_users(),
            items = trainer.model.n_items(),
            epochs = trainer.epochs,
            "Loaded model snapshot"
        );
        Ok(trainer)
    }

    /// Replace this trainer's state with a snapshot.
    ///
    /// The snapshot's latent dimension must match this trainer's `k`. On any
    /// error the current state is left untouched.
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        let snapshot = Snapshot::read(path)?;
        if snapshot.config.k != self.model.config.k {
            return Err(ModelError::CorruptState(format!(
                "snapshot has k = {}, trainer is configured with k = {}",
                snapshot.config.k, self.model.config.k
            )));
        }
        *self = snapshot.into_trainer();
        Ok(())
    }
}

impl LatentModel {
    /// Load just the model from a full or compact snapshot
    pub fn load(path: &Path) -> Result<Self> {
        Ok(MatrixFactorization::load(path)?.into_model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceStrategy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use sprs::{CsMat, CsVec, TriMat};
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("factorization-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn trained() -> MatrixFactorization {
        let mut tri = TriMat::new((3, 3));
        for (u, i, s) in [(0, 0, 5.0), (0, 1, 3.0), (1, 1, 4.0), (2, 2, 2.0), (2, 0, 4.5)] {
            tri.add_triplet(u, i, s);
        }
        let x: CsMat<f64> = tri.to_csr();
        let mut mf = MatrixFactorization::new(FactorizationConfig::default().with_k(2)).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        mf.train(&x, 4, &mut rng).unwrap();
        mf
    }

    #[test]
    fn test_save_and_load_full_state() {
        let mf = trained();
        let path = temp_path("full.json");
        mf.save(&path).unwrap();

        let loaded = MatrixFactorization::load(&path).unwrap();
        assert_eq!(loaded.model(), mf.model());
        assert_eq!(loaded.epochs(), 4);
        assert_eq!(loaded.current_alpha, mf.current_alpha);
        assert_eq!(loaded.grad_v, mf.grad_v);
        assert!(loaded.is_initialized());
    }

    #[test]
    fn test_compact_snapshot_serves_new_users_only() {
        let mf = trained();
        let path = temp_path("compact.json");
        mf.save_compact(&path).unwrap();

        let model = LatentModel::load(&path).unwrap();
        assert!(model.is_compact());
        assert_eq!(model.n_items(), 3);
        assert!(matches!(
            model.predict_user(0, true),
            Err(ModelError::InvalidUserIndex { .. })
        ));

        let x = CsVec::new(3, vec![0], vec![5.0]);
        let strategy = InferenceStrategy::ClosedForm { lambda: 0.5 };
        let mut rng = StdRng::seed_from_u64(0);
        let from_compact = model.predict_new(&x, &strategy, true, &mut rng).unwrap();
        let from_full = mf.model().predict_new(&x, &strategy, true, &mut rng).unwrap();
        assert_eq!(from_compact, from_full);
    }

    #[test]
    fn test_restore_rejects_other_k() {
        let mf = trained();
        let path = temp_path("restore.json");
        mf.save(&path).unwrap();

        let mut other = MatrixFactorization::new(FactorizationConfig::default().with_k(3)).unwrap();
        assert!(matches!(
            other.restore(&path),
            Err(ModelError::CorruptState(_))
        ));
        assert!(!other.is_initialized());
        assert_eq!(other.model().n_items(), 0);
    }

    #[test]
    fn test_load_rejects_inconsistent_shapes() {
        let mf = trained();
        let mut snapshot = Snapshot::from_trainer(&mf, false);
        snapshot.item_bias = Array1::zeros(7);
        let path = temp_path("corrupt.json");
        snapshot.write(&path).unwrap();

        assert!(matches!(
            MatrixFactorization::load(&path),
            Err(ModelError::CorruptState(_))
        ));
    }
}
