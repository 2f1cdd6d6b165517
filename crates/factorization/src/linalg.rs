//! Dense kernels used by initialization and inference.
//!
//! Factorizations go through `nalgebra`. Model parameters live in `ndarray`,
//! so the public functions take and return `ndarray` types and convert at the
//! boundary.

use crate::error::{ModelError, Result};
use nalgebra::{Cholesky, DMatrix, DVector, SVD};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use sprs::CsMat;

/// Extra columns sampled by the randomized range finder
const OVERSAMPLES: usize = 10;

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Solve `A x = b` for symmetric positive definite `A` via Cholesky
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(ModelError::DimensionMismatch {
            expected: format!("{n}x{n} system"),
            actual: format!("{}x{} matrix, {} rhs", a.nrows(), a.ncols(), b.len()),
        });
    }

    let cholesky = Cholesky::new(to_dmatrix(a)).ok_or(ModelError::SingularSystem)?;
    let x = cholesky.solve(&DVector::from_iterator(n, b.iter().copied()));
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::SingularSystem);
    }
    Ok(Array1::from_iter(x.iter().copied()))
}

/// Orthonormal basis of the column space of `m` (thin Q of its QR)
fn orthonormal_basis(m: DMatrix<f64>) -> DMatrix<f64> {
    m.qr().q()
}

/// `X * M` for sparse `X` (rows x cols) and dense `M` (cols x l)
fn sparse_dot(x: &CsMat<f64>, m: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::<f64>::zeros(x.rows(), m.ncols());
    for (i, row) in x.outer_iterator().enumerate() {
        for (j, &value) in row.iter() {
            for c in 0..m.ncols() {
                out[(i, c)] += value * m[(j, c)];
            }
        }
    }
    out
}

/// `X^T * M` for sparse `X` (rows x cols) and dense `M` (rows x l)
fn sparse_t_dot(x: &CsMat<f64>, m: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::<f64>::zeros(x.cols(), m.ncols());
    for (i, row) in x.outer_iterator().enumerate() {
        for (j, &value) in row.iter() {
            for c in 0..m.ncols() {
                out[(j, c)] += value * m[(i, c)];
            }
        }
    }
    out
}

/// Rank-`k` truncated SVD of a sparse matrix.
///
/// A randomized range finder with `n_power_iter` subspace iterations
/// projects `X` onto `width = k + 10` columns, and the small projection
/// `B = Q^T X` gets a dense SVD. Returns `(U, s, V)` with `U` rows x k,
/// `s` descending, `V` cols x k.
pub fn truncated_svd<R: Rng + ?Sized>(
    x: &CsMat<f64>,
    k: usize,
    n_power_iter: usize,
    rng: &mut R,
) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>)> {
    let rank_bound = x.rows().min(x.cols());
    if k == 0 || k > rank_bound {
        return Err(ModelError::InvalidConfig(format!(
            "svd rank {} must be in 1..={}",
            k, rank_bound
        )));
    }
    let width = (k + OVERSAMPLES).min(rank_bound);

    let omega = DMatrix::<f64>::from_fn(x.cols(), width, |_, _| StandardNormal.sample(rng));
    let mut q = orthonormal_basis(sparse_dot(x, &omega));
    for _ in 0..n_power_iter {
        let z = orthonormal_basis(sparse_t_dot(x, &q));
        q = orthonormal_basis(sparse_dot(x, &z));
    }

    let b = sparse_t_dot(x, &q).transpose();
    let svd = SVD::new(b, true, true);
    let (Some(w), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(ModelError::Decomposition(
            "svd returned no singular vectors".into(),
        ));
    };

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| {
        svd.singular_values[j]
            .partial_cmp(&svd.singular_values[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top = &order[..k];

    let u = &q * w.select_columns(top.iter());
    let v = v_t.select_rows(top.iter()).transpose();
    let s = Array1::from_iter(top.iter().map(|&i| svd.singular_values[i]));

    Ok((to_array2(&u), s, to_array2(&v)))
}

/// Frobenius (or Euclidean) norm of any array
pub fn norm<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    values.into_iter().map(|v| v * v).sum::<f64>().sqrt()
}
