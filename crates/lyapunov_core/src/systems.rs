//! Dynamical-system wrappers that turn an evolution rule into a [`StepOperator`].
//!
//! - [`DiscreteDS`]: maps x_{n+1} = f(x_n, t_n), one iteration per step.
//! - [`ContinuousDS`]: flows dx/dt = f(x, t), discretized with fixed-step RK4. The step
//!   Jacobian is the RK4 tangent-linear matrix with the Jacobian frozen at the step start.
//! - [`FnSystem`]: builds a [`DynamicalSystem`] from a pair of closures.

use crate::{
    error::{LyapunovError, Phase, Result},
    solvers::{rk4_tangent_step, DiscreteMap, RK4},
    traits::{DynamicalSystem, StepOperator, Steppable},
};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Position and time of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub x: Vec<f64>,
    pub t: f64,
}

impl State {
    pub fn new(x: Vec<f64>, t: f64) -> Self {
        Self { x, t }
    }

    pub fn dimension(&self) -> usize {
        self.x.len()
    }

    pub fn is_finite(&self) -> bool {
        self.t.is_finite() && self.x.iter().all(|v| v.is_finite())
    }
}

/// Discrete-time system x_{n+1} = f(x_n, t_n).
pub struct DiscreteDS<S: DynamicalSystem<f64>> {
    system: S,
    dt: f64,
    stepper: DiscreteMap<f64>,
    jac_buf: Vec<f64>,
}

impl<S: DynamicalSystem<f64>> DiscreteDS<S> {
    /// Wraps a map; each iteration counts as one unit of time.
    pub fn new(system: S) -> Result<Self> {
        Self::with_time_step(system, 1.0)
    }

    /// Wraps a map whose iterations represent `dt` units of time (e.g. a stroboscopic map).
    pub fn with_time_step(system: S, dt: f64) -> Result<Self> {
        let dim = validate_system(&system, dt)?;
        Ok(Self {
            system,
            dt,
            stepper: DiscreteMap::new(dim),
            jac_buf: vec![0.0; dim * dim],
        })
    }

    pub fn system(&self) -> &S {
        &self.system
    }
}

impl<S: DynamicalSystem<f64>> StepOperator for DiscreteDS<S> {
    fn dimension(&self) -> usize {
        self.system.dimension()
    }

    fn time_step(&self) -> f64 {
        self.dt
    }

    fn advance(&mut self, state: &mut State) {
        self.stepper
            .step(&self.system, &mut state.t, &mut state.x, self.dt);
    }

    fn jacobian(&mut self, state: &State) -> DMatrix<f64> {
        let dim = self.system.dimension();
        self.system.jacobian(state.t, &state.x, &mut self.jac_buf);
        DMatrix::from_row_slice(dim, dim, &self.jac_buf)
    }
}

/// Continuous-time system dx/dt = f(x, t) integrated with RK4 at a fixed step dt.
pub struct ContinuousDS<S: DynamicalSystem<f64>> {
    system: S,
    dt: f64,
    stepper: RK4<f64>,
    jac_buf: Vec<f64>,
}

impl<S: DynamicalSystem<f64>> ContinuousDS<S> {
    pub fn new(system: S, dt: f64) -> Result<Self> {
        let dim = validate_system(&system, dt)?;
        Ok(Self {
            system,
            dt,
            stepper: RK4::new(dim),
            jac_buf: vec![0.0; dim * dim],
        })
    }

    pub fn system(&self) -> &S {
        &self.system
    }
}

impl<S: DynamicalSystem<f64>> StepOperator for ContinuousDS<S> {
    fn dimension(&self) -> usize {
        self.system.dimension()
    }

    fn time_step(&self) -> f64 {
        self.dt
    }

    fn advance(&mut self, state: &mut State) {
        self.stepper
            .step(&self.system, &mut state.t, &mut state.x, self.dt);
    }

    fn jacobian(&mut self, state: &State) -> DMatrix<f64> {
        let dim = self.system.dimension();
        self.system.jacobian(state.t, &state.x, &mut self.jac_buf);
        let jac = DMatrix::from_row_slice(dim, dim, &self.jac_buf);
        rk4_tangent_step(&jac, self.dt)
    }
}

fn validate_system<S: DynamicalSystem<f64>>(system: &S, dt: f64) -> Result<usize> {
    let dim = system.dimension();
    if dim == 0 {
        return Err(LyapunovError::InvalidParameter(
            "System must have positive dimension.".into(),
        ));
    }
    if !dt.is_finite() || dt <= 0.0 {
        return Err(LyapunovError::InvalidParameter(
            "Step size dt must be positive.".into(),
        ));
    }
    Ok(dim)
}

/// A [`DynamicalSystem`] built from closures for the rule `f(t, x, out)` and its
/// row-major Jacobian `jac(t, x, out)`.
pub struct FnSystem<F, J> {
    dim: usize,
    f: F,
    jac: J,
}

impl<F, J> FnSystem<F, J>
where
    F: Fn(f64, &[f64], &mut [f64]),
    J: Fn(f64, &[f64], &mut [f64]),
{
    pub fn new(dim: usize, f: F, jac: J) -> Self {
        Self { dim, f, jac }
    }
}

impl<F, J> DynamicalSystem<f64> for FnSystem<F, J>
where
    F: Fn(f64, &[f64], &mut [f64]),
    J: Fn(f64, &[f64], &mut [f64]),
{
    fn dimension(&self) -> usize {
        self.dim
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        (self.f)(t, x, out)
    }

    fn jacobian(&self, t: f64, x: &[f64], out: &mut [f64]) {
        (self.jac)(t, x, out)
    }
}

/// Rejects a state whose dimension differs from the operator's.
pub(crate) fn check_state(op: &impl StepOperator, state: &State) -> Result<()> {
    if state.dimension() != op.dimension() {
        return Err(LyapunovError::DimensionMismatch {
            context: "initial state",
            expected: op.dimension(),
            found: state.dimension(),
        });
    }
    if !state.is_finite() {
        return Err(LyapunovError::NonFinite {
            phase: Phase::Warmup,
            step: 0,
        });
    }
    Ok(())
}

/// Advances `state` by one step and reports non-finite results.
pub(crate) fn advance_checked(
    op: &mut impl StepOperator,
    state: &mut State,
    phase: Phase,
    step: usize,
) -> Result<()> {
    op.advance(state);
    if state.is_finite() {
        Ok(())
    } else {
        Err(LyapunovError::NonFinite { phase, step })
    }
}

/// Advances the system `n_steps` times.
///
/// When `keep_traj` is set, returns an (n_steps + 1) x dim matrix whose row k is the
/// state after k steps (row 0 is the starting point).
pub fn forward(
    op: &mut impl StepOperator,
    state: &mut State,
    n_steps: usize,
    keep_traj: bool,
) -> Result<Option<DMatrix<f64>>> {
    check_state(&*op, state)?;
    let dim = op.dimension();
    let mut traj = keep_traj.then(|| DMatrix::zeros(n_steps + 1, dim));
    if let Some(traj) = traj.as_mut() {
        traj.row_mut(0).copy_from_slice(&state.x);
    }
    for step in 0..n_steps {
        advance_checked(op, state, Phase::Warmup, step)?;
        if let Some(traj) = traj.as_mut() {
            traj.row_mut(step + 1).copy_from_slice(&state.x);
        }
    }
    Ok(traj)
}

#[cfg(test)]
mod tests {
    use super::{forward, ContinuousDS, DiscreteDS, FnSystem, State};
    use crate::error::LyapunovError;
    use crate::traits::StepOperator;

    fn henon() -> FnSystem<impl Fn(f64, &[f64], &mut [f64]), impl Fn(f64, &[f64], &mut [f64])> {
        let (a, b) = (1.4, 0.3);
        FnSystem::new(
            2,
            move |_t: f64, x: &[f64], out: &mut [f64]| {
                out[0] = 1.0 - a * x[0] * x[0] + x[1];
                out[1] = b * x[0];
            },
            move |_t: f64, x: &[f64], out: &mut [f64]| {
                out.copy_from_slice(&[-2.0 * a * x[0], 1.0, b, 0.0]);
            },
        )
    }

    fn rotation(
        omega: f64,
    ) -> FnSystem<impl Fn(f64, &[f64], &mut [f64]), impl Fn(f64, &[f64], &mut [f64])> {
        FnSystem::new(
            2,
            move |_t: f64, x: &[f64], out: &mut [f64]| {
                out[0] = -omega * x[1];
                out[1] = omega * x[0];
            },
            move |_t: f64, _x: &[f64], out: &mut [f64]| {
                out.copy_from_slice(&[0.0, -omega, omega, 0.0]);
            },
        )
    }

    #[test]
    fn discrete_system_iterates_map_and_time() {
        let mut ds = DiscreteDS::new(henon()).expect("valid system");
        let mut state = State::new(vec![0.0, 0.0], 0.0);
        ds.advance(&mut state);
        assert_eq!(state.x, vec![1.0, 0.0]);
        assert_eq!(state.t, 1.0);
        let jac = ds.jacobian(&state);
        assert!((jac[(0, 0)] + 2.8).abs() < 1e-12);
        assert_eq!(jac[(0, 1)], 1.0);
        assert_eq!(jac[(1, 0)], 0.3);
    }

    #[test]
    fn continuous_system_jacobian_is_rk4_step_matrix() {
        let dt = 0.01;
        let mut ds = ContinuousDS::new(rotation(1.0), dt).expect("valid system");
        let state = State::new(vec![1.0, 0.0], 0.0);
        let m = ds.jacobian(&state);
        // A rotation stays (nearly) orthogonal over one small RK4 step.
        let gram = m.transpose() * &m;
        assert!((gram[(0, 0)] - 1.0).abs() < 1e-9);
        assert!(gram[(0, 1)].abs() < 1e-9);
        assert!((m[(1, 0)] - dt.sin()).abs() < 1e-9);
    }

    #[test]
    fn forward_records_trajectory_rows() {
        let mut ds = ContinuousDS::new(rotation(1.0), 0.001).expect("valid system");
        let mut state = State::new(vec![1.0, 0.0], 0.0);
        let traj = forward(&mut ds, &mut state, 1000, true)
            .expect("forward should run")
            .expect("trajectory requested");
        assert_eq!(traj.nrows(), 1001);
        assert_eq!(traj.ncols(), 2);
        assert_eq!(traj[(0, 0)], 1.0);
        assert!((state.t - 1.0).abs() < 1e-9);
        assert!((state.x[0] - 1.0f64.cos()).abs() < 1e-9);
        assert!((traj[(1000, 1)] - 1.0f64.sin()).abs() < 1e-9);
    }

    #[test]
    fn forward_without_trajectory_returns_none() {
        let mut ds = DiscreteDS::new(henon()).expect("valid system");
        let mut state = State::new(vec![0.1, 0.1], 0.0);
        let traj = forward(&mut ds, &mut state, 10, false).expect("forward should run");
        assert!(traj.is_none());
        assert_eq!(state.t, 10.0);
    }

    #[test]
    fn forward_rejects_state_of_wrong_dimension() {
        let mut ds = DiscreteDS::new(henon()).expect("valid system");
        let mut state = State::new(vec![0.1], 0.0);
        let err = forward(&mut ds, &mut state, 1, false).expect_err("dimension mismatch");
        assert!(matches!(
            err,
            LyapunovError::DimensionMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn forward_reports_divergence() {
        let blowup = FnSystem::new(
            1,
            |_t, x: &[f64], out: &mut [f64]| out[0] = x[0] * x[0] * 1e100,
            |_t, x: &[f64], out: &mut [f64]| out[0] = 2.0 * x[0] * 1e100,
        );
        let mut ds = DiscreteDS::new(blowup).expect("valid system");
        let mut state = State::new(vec![10.0], 0.0);
        let err = forward(&mut ds, &mut state, 20, false).expect_err("should diverge");
        assert!(matches!(err, LyapunovError::NonFinite { .. }));
    }

    #[test]
    fn wrappers_reject_invalid_time_step() {
        let err = ContinuousDS::new(rotation(1.0), 0.0)
            .err()
            .expect("dt = 0 must be rejected");
        assert!(err.to_string().contains("dt must be positive"));
        assert!(DiscreteDS::with_time_step(henon(), -1.0).is_err());
    }
}
