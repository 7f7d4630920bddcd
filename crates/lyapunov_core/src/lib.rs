pub mod adjoint;
pub mod clv;
pub mod error;
pub mod lyapunov;
pub mod qr;
pub mod solvers;
pub mod systems;
pub mod tangent;
/// The `lyapunov_core` crate computes Lyapunov exponents, covariant Lyapunov vectors
/// (CLV) and their adjoints for discrete maps and fixed-step continuous flows.
///
/// Key components:
/// - **Traits**: `DynamicalSystem` (rule + Jacobian), `Steppable` (solvers), `StepOperator`
///   (one-step map + its Jacobian, what the engines consume).
/// - **Systems**: `DiscreteDS` and `ContinuousDS` (RK4) wrappers, `State`, `forward`.
/// - **Tangent / QR**: basis propagation and sign-normalized thin QR.
/// - **Engines**: `mlce`/`lce` (exponents), `clv` (Ginelli algorithm), `adj` (dual vectors).
pub mod traits;

pub use adjoint::adj;
pub use clv::{clv, ClvCheck, ClvResult, ClvSettings};
pub use error::{LyapunovError, Phase};
pub use lyapunov::{kaplan_yorke, lce, mlce, LceResult, LceSettings, MlceResult};
pub use systems::{forward, ContinuousDS, DiscreteDS, FnSystem, State};
pub use traits::{DynamicalSystem, StepOperator};
