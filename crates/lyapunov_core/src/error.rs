//! Error taxonomy shared by every engine in the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LyapunovError>;

/// Stage of a computation in which a numerical failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Trajectory-only transient before any tangent tracking.
    Warmup,
    /// Exponent accumulation of `mlce`/`lce`.
    Compute,
    /// Ginelli phase A: convergence onto the backward Lyapunov basis.
    Converge,
    /// Ginelli phase B: the stored window.
    Window,
    /// Ginelli phase C: convergence of the coefficient matrix.
    Coefficients,
    /// Backward sweep over the stored window.
    Backward,
    /// Standalone decomposition outside of an engine loop.
    Decomposition,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Warmup => "warm-up",
            Phase::Compute => "exponent accumulation",
            Phase::Converge => "phase A",
            Phase::Window => "phase B",
            Phase::Coefficients => "phase C",
            Phase::Backward => "backward reconstruction",
            Phase::Decomposition => "QR decomposition",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LyapunovError {
    #[error("Dimension mismatch in {context}: expected {expected}, got {found}.")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{0}")]
    InvalidParameter(String),

    #[error(
        "Encountered near-singular R matrix during {phase} at step {step} (|r| = {diagonal:e}); \
         the requested number of directions exceeds what this system resolves."
    )]
    Degenerate {
        phase: Phase,
        step: usize,
        diagonal: f64,
    },

    #[error("CLV matrix at step {step} is ill-conditioned; covariant vectors are nearly parallel.")]
    Singular { step: usize },

    #[error("Non-finite value produced during {phase} at step {step}.")]
    NonFinite { phase: Phase, step: usize },
}

impl LyapunovError {
    /// Re-tags a degeneracy or non-finite failure with the engine phase and step it occurred in.
    pub(crate) fn at(self, phase: Phase, step: usize) -> Self {
        match self {
            LyapunovError::Degenerate { diagonal, .. } => LyapunovError::Degenerate {
                phase,
                step,
                diagonal,
            },
            LyapunovError::NonFinite { .. } => LyapunovError::NonFinite { phase, step },
            other => other,
        }
    }
}
