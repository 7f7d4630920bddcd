use crate::{
    error::{LyapunovError, Phase, Result},
    qr::{orthonormalize, QrStep},
    systems::{advance_checked, State},
    traits::StepOperator,
};
use nalgebra::DMatrix;

/// Propagates a tangent basis one step: returns J * phi.
pub fn propagate(jacobian: &DMatrix<f64>, basis: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if !jacobian.is_square() {
        return Err(LyapunovError::DimensionMismatch {
            context: "Jacobian columns",
            expected: jacobian.nrows(),
            found: jacobian.ncols(),
        });
    }
    if jacobian.ncols() != basis.nrows() {
        return Err(LyapunovError::DimensionMismatch {
            context: "tangent basis rows",
            expected: jacobian.ncols(),
            found: basis.nrows(),
        });
    }
    Ok(jacobian * basis)
}

/// One step of the tangent dynamics: propagate `basis` with the Jacobian at the current
/// state, advance the state, then re-orthonormalize.
pub(crate) fn tangent_step(
    op: &mut impl StepOperator,
    state: &mut State,
    basis: &DMatrix<f64>,
    phase: Phase,
    step: usize,
) -> Result<QrStep> {
    let jacobian = op.jacobian(state);
    let propagated = propagate(&jacobian, basis)?;
    advance_checked(op, state, phase, step)?;
    orthonormalize(propagated).map_err(|e| e.at(phase, step))
}

/// First `p` columns of the dim x dim identity.
pub fn initial_basis(dim: usize, p: usize) -> DMatrix<f64> {
    DMatrix::identity(dim, p)
}
