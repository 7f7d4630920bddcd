//! Thin QR decomposition of tangent bases with a non-negative diagonal convention.
//!
//! Householder QR only fixes Q and R up to the sign of each column/row pair. We flip
//! every pair whose diagonal entry comes out negative, so the diagonal of R is the
//! (positive) growth factor along each basis direction and repeated decompositions of
//! the same input agree exactly.

use crate::error::{LyapunovError, Phase, Result};
use nalgebra::linalg::QR;
use nalgebra::DMatrix;

/// A diagonal entry of R at or below this fraction of the norm of its input column marks
/// the basis as rank-deficient. The ratio r_ii / |a_i| is the sine of the angle between
/// column i and the span of the columns before it.
pub const RANK_TOLERANCE: f64 = 1e-13;

#[derive(Debug, Clone)]
pub struct QrStep {
    /// dim x p, orthonormal columns.
    pub q: DMatrix<f64>,
    /// p x p, upper triangular with non-negative diagonal.
    pub r: DMatrix<f64>,
}

impl QrStep {
    /// Natural logarithm of each diagonal entry of R.
    pub fn log_growth(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.r.nrows()).map(move |i| self.r[(i, i)].ln())
    }
}

/// Decomposes a dim x p tangent basis (p <= dim) into Q * R.
pub fn orthonormalize(basis: DMatrix<f64>) -> Result<QrStep> {
    let (dim, p) = basis.shape();
    if p == 0 || p > dim {
        return Err(LyapunovError::DimensionMismatch {
            context: "tangent basis columns",
            expected: dim,
            found: p,
        });
    }
    if basis.iter().any(|v| !v.is_finite()) {
        return Err(LyapunovError::NonFinite {
            phase: Phase::Decomposition,
            step: 0,
        });
    }

    let column_norms: Vec<f64> = basis.column_iter().map(|c| c.norm()).collect();
    let (mut q, mut r) = QR::new(basis).unpack();
    for i in 0..p {
        if r[(i, i)] < 0.0 {
            q.column_mut(i).neg_mut();
            for col in i..p {
                r[(i, col)] = -r[(i, col)];
            }
        }
    }

    for (i, norm) in column_norms.into_iter().enumerate() {
        let diag = r[(i, i)];
        if !(diag > 0.0 && diag > RANK_TOLERANCE * norm) {
            return Err(LyapunovError::Degenerate {
                phase: Phase::Decomposition,
                step: 0,
                diagonal: diag,
            });
        }
    }

    Ok(QrStep { q, r })
}
