use crate::traits::{DynamicalSystem, Scalar, Steppable};
use nalgebra::DMatrix;

/// Classic fixed-step Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    stages: [Vec<T>; 4],
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let zero = T::zero();
        Self {
            stages: [
                vec![zero; dim],
                vec![zero; dim],
                vec![zero; dim],
                vec![zero; dim],
            ],
            tmp: vec![zero; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let two = T::one() + T::one();
        let half_dt = dt / two;
        let t0 = *t;
        // increments for k2..k4, each built from the previous stage
        let offsets = [half_dt, half_dt, dt];

        system.apply(t0, state, &mut self.stages[0]);
        for (s, &h) in offsets.iter().enumerate() {
            let (done, rest) = self.stages.split_at_mut(s + 1);
            let prev = &done[s];
            for i in 0..state.len() {
                self.tmp[i] = state[i] + h * prev[i];
            }
            system.apply(t0 + h, &self.tmp, &mut rest[0]);
        }

        let sixth_dt = dt / (two * (two + T::one()));
        let [k1, k2, k3, k4] = &self.stages;
        for i in 0..state.len() {
            state[i] = state[i] + sixth_dt * (k1[i] + two * (k2[i] + k3[i]) + k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Discrete Map Stepper: x_{n+1} = f(x_n), with t advanced by dt per iteration.
pub struct DiscreteMap<T: Scalar> {
    tmp: Vec<T>,
}

impl<T: Scalar> DiscreteMap<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for DiscreteMap<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        system.apply(*t, state, &mut self.tmp);
        state.copy_from_slice(&self.tmp);
        *t = *t + dt;
    }
}

/// Tangent-linear RK4 step matrix for a Jacobian frozen at the start of the step.
///
/// Applying RK4 to dW/dt = J W from W = I gives
/// M = I + dt/6 (K1 + 2 K2 + 2 K3 + K4) with K1 = J, K2 = J (I + dt/2 K1),
/// K3 = J (I + dt/2 K2), K4 = J (I + dt K3).
pub fn rk4_tangent_step(jacobian: &DMatrix<f64>, dt: f64) -> DMatrix<f64> {
    let dim = jacobian.nrows();
    let identity = DMatrix::<f64>::identity(dim, dim);
    let k1 = jacobian.clone();
    let k2 = jacobian * (&identity + &k1 * (0.5 * dt));
    let k3 = jacobian * (&identity + &k2 * (0.5 * dt));
    let k4 = jacobian * (&identity + &k3 * dt);
    identity + (k1 + (k2 + k3) * 2.0 + k4) * (dt / 6.0)
}
