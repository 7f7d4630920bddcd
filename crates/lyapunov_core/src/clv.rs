//! Covariant Lyapunov vectors via the Ginelli et al. forward/backward algorithm.
//!
//! After a trajectory warm-up the computation runs three forward phases:
//!
//! - **A** (`n_a` steps): propagate and orthonormalize an arbitrary basis until it has
//!   converged onto the backward Lyapunov vectors. Nothing is stored.
//! - **B** (`n_b` steps): the window of interest. Every (Q, R) pair is stored.
//! - **C** (`n_c` steps): only the R factors are kept. Sweeping them backward from an
//!   identity seed converges the upper-triangular coefficient matrix C, which expresses
//!   the CLVs in the orthonormal basis, independently of that seed.
//!
//! The stored window is then consumed newest-first: CLV_k = Q_k C_k and
//! C_{k-1} = R_k^{-1} C_k with unit-norm columns. Column rescaling does not change the
//! directions, and keeps the coefficients from under/overflowing over long sweeps.

use crate::{
    error::{LyapunovError, Phase, Result},
    lyapunov::{validate_directions, validate_time_step},
    qr::QrStep,
    systems::{check_state, forward, State},
    tangent::{initial_basis, tangent_step},
    traits::StepOperator,
};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Deviation above which the `check` diagnostic is logged as a warning.
const CHECK_WARN_THRESHOLD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClvSettings {
    /// Trajectory-only transient.
    pub n_forward: usize,
    /// Steps for the orthonormal basis to converge onto the backward Lyapunov vectors.
    pub n_a: usize,
    /// Length of the window for which CLVs are returned.
    pub n_b: usize,
    /// Steps used to converge the coefficient matrix past the end of the window.
    pub n_c: usize,
    /// Record the state at each window step.
    pub traj: bool,
    /// Run the covariance self-check over the window.
    pub check: bool,
}

impl Default for ClvSettings {
    fn default() -> Self {
        Self {
            n_forward: 1_000,
            n_a: 1_000,
            n_b: 1_000,
            n_c: 1_000,
            traj: false,
            check: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClvCheck {
    /// State at the start of phase B; replaying from here reproduces the window.
    pub window_start: State,
    /// Largest entrywise gap between the normalized one-step image of CLV_k, rebuilt from
    /// the stored (Q, R) pairs, and CLV_{k+1}. The backward sweep makes these agree up to
    /// round-off, so a large value flags corrupted window data rather than a coefficient
    /// matrix that has not converged.
    pub max_deviation: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClvResult {
    /// One dim x p matrix per window step, chronological, unit-norm columns ordered by
    /// decreasing exponent.
    pub vectors: Vec<DMatrix<f64>>,
    /// n_b x dim; row k is the state at which `vectors[k]` is attached.
    pub trajectory: Option<DMatrix<f64>>,
    pub check: Option<ClvCheck>,
}

pub fn clv(
    op: &mut impl StepOperator,
    state: &mut State,
    p: usize,
    settings: ClvSettings,
) -> Result<ClvResult> {
    check_state(&*op, state)?;
    let dim = op.dimension();
    validate_directions(dim, p)?;
    if settings.n_b == 0 {
        return Err(LyapunovError::InvalidParameter(
            "Window size must be at least one step.".into(),
        ));
    }
    validate_time_step(op.time_step())?;

    forward(op, state, settings.n_forward, false)?;

    let mut basis = initial_basis(dim, p);
    for step in 0..settings.n_a {
        basis = tangent_step(op, state, &basis, Phase::Converge, step)?.q;
    }
    debug!(n_a = settings.n_a, p, "backward Lyapunov basis converged");

    let window_start = settings.check.then(|| state.clone());
    let mut trajectory = settings.traj.then(|| DMatrix::zeros(settings.n_b, dim));
    let mut window: Vec<QrStep> = Vec::with_capacity(settings.n_b);
    for step in 0..settings.n_b {
        let qr = tangent_step(op, state, &basis, Phase::Window, step)?;
        if let Some(trajectory) = trajectory.as_mut() {
            trajectory.row_mut(step).copy_from_slice(&state.x);
        }
        basis = qr.q.clone();
        window.push(qr);
    }
    debug!(n_b = settings.n_b, "window stored");

    let mut tail = Vec::with_capacity(settings.n_c);
    for step in 0..settings.n_c {
        let qr = tangent_step(op, state, &basis, Phase::Coefficients, step)?;
        basis = qr.q;
        tail.push(qr.r);
    }
    let mut coeffs = DMatrix::identity(p, p);
    for (step, r) in tail.iter().enumerate().rev() {
        coeffs = back_substitute(r, &coeffs).map_err(|e| e.at(Phase::Coefficients, step))?;
    }
    drop(tail);
    debug!(n_c = settings.n_c, "coefficient matrix converged");

    let mut vectors: Vec<DMatrix<f64>> = Vec::with_capacity(settings.n_b);
    let mut max_deviation = 0.0_f64;
    for step in (0..window.len()).rev() {
        let current = &window[step].q * &coeffs;

        // J_k CLV_k = Q_{k+1} R_{k+1} C_k must point along CLV_{k+1}.
        if let (true, Some(later)) = (settings.check, vectors.last()) {
            let next = &window[step + 1];
            let mut image = &next.q * (&next.r * &coeffs);
            normalize_columns(&mut image).map_err(|e| e.at(Phase::Backward, step))?;
            max_deviation = max_deviation.max((image - later).amax());
        }

        vectors.push(current);
        if step > 0 {
            coeffs = back_substitute(&window[step].r, &coeffs)
                .map_err(|e| e.at(Phase::Backward, step))?;
        }
    }
    drop(window);
    vectors.reverse();

    let check = window_start.map(|window_start| {
        if max_deviation > CHECK_WARN_THRESHOLD {
            warn!(max_deviation, "reconstructed CLVs are not covariant along the window");
        } else {
            debug!(max_deviation, "CLV covariance check passed");
        }
        ClvCheck {
            window_start,
            max_deviation,
        }
    });

    Ok(ClvResult {
        vectors,
        trajectory,
        check,
    })
}

/// Solves R X = C for upper-triangular R by back-substitution, then normalizes the
/// columns of X.
fn back_substitute(r: &DMatrix<f64>, c: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let degenerate = |diagonal: f64| LyapunovError::Degenerate {
        phase: Phase::Backward,
        step: 0,
        diagonal,
    };
    if let Some(&diag) = r.diagonal().iter().find(|d| !(d.abs() > 0.0)) {
        return Err(degenerate(diag));
    }
    let mut solved = r
        .solve_upper_triangular(c)
        .ok_or_else(|| degenerate(0.0))?;
    normalize_columns(&mut solved)?;
    Ok(solved)
}

fn normalize_columns(matrix: &mut DMatrix<f64>) -> Result<()> {
    for mut column in matrix.column_iter_mut() {
        let norm = column.norm();
        if !(norm > 0.0) || !norm.is_finite() {
            return Err(LyapunovError::Degenerate {
                phase: Phase::Backward,
                step: 0,
                diagonal: norm,
            });
        }
        column /= norm;
    }
    Ok(())
}
