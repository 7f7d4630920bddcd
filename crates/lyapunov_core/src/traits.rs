use nalgebra::DMatrix;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

use crate::systems::State;

/// A trait for types that can be used as scalars in our dynamical systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// The evolution rule of a dynamical system (Flow or Map) together with its derivative.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field (flow) or map function.
    /// x: current state
    /// t: current time
    /// out: buffer to write the result (dx/dt or x_{n+1})
    fn apply(&self, t: T, x: &[T], out: &mut [T]);

    /// Evaluates the Jacobian of `apply` with respect to x.
    /// out: row-major dim x dim buffer, out[i * dim + j] = d apply_i / d x_j
    fn jacobian(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt, updating `t` and `state` in place.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// One-step operator consumed by the Lyapunov engines.
///
/// Implementors wrap a [`DynamicalSystem`] and a discretization; the engines only ever
/// see "advance one step" and "Jacobian of that step".
pub trait StepOperator {
    fn dimension(&self) -> usize;

    /// Time elapsed per call to [`StepOperator::advance`].
    fn time_step(&self) -> f64;

    /// Replaces `state` by its image after one step.
    fn advance(&mut self, state: &mut State);

    /// Jacobian (dim x dim) of the one-step map at `state`.
    fn jacobian(&mut self, state: &State) -> DMatrix<f64>;
}
