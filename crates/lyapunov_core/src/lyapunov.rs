use crate::{
    error::{LyapunovError, Phase, Result},
    qr::orthonormalize,
    systems::{check_state, forward, State},
    tangent::{initial_basis, tangent_step},
    traits::StepOperator,
};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Seed of the random initial direction used by [`mlce`] unless overridden.
pub const DEFAULT_SEED: u64 = 0x4c43_45;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LceSettings {
    /// Trajectory steps discarded before tangent tracking starts.
    pub n_forward: usize,
    /// Steps over which log-growth is accumulated.
    pub n_compute: usize,
    /// Record the running estimate after every step.
    pub keep: bool,
    /// Seed for the initial perturbation of [`mlce`].
    pub seed: u64,
}

impl Default for LceSettings {
    fn default() -> Self {
        Self {
            n_forward: 1_000,
            n_compute: 10_000,
            keep: false,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MlceResult {
    pub exponent: f64,
    /// Running estimate after each of the n_compute steps.
    pub history: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LceResult {
    pub exponents: Vec<f64>,
    /// n_compute x p running estimates.
    pub history: Option<DMatrix<f64>>,
}

/// Maximal Lyapunov exponent.
///
/// Tracks a single perturbation, drawn uniformly from the unit cube with
/// `settings.seed` and normalized, after `settings.n_forward` transient steps.
pub fn mlce(
    op: &mut impl StepOperator,
    state: &mut State,
    settings: LceSettings,
) -> Result<MlceResult> {
    validate(&*op, state, 1, &settings)?;

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let seed_vector = DMatrix::from_fn(op.dimension(), 1, |_, _| rng.gen::<f64>());
    let basis = orthonormalize(seed_vector)?.q;

    let (mut exponents, history) = accumulate(op, state, basis, &settings)?;
    Ok(MlceResult {
        exponent: exponents.remove(0),
        history: history.map(|h| h.column(0).iter().copied().collect()),
    })
}

/// Leading `p` Lyapunov exponents, in decreasing order.
pub fn lce(
    op: &mut impl StepOperator,
    state: &mut State,
    p: usize,
    settings: LceSettings,
) -> Result<LceResult> {
    validate(&*op, state, p, &settings)?;
    let basis = initial_basis(op.dimension(), p);
    let (exponents, history) = accumulate(op, state, basis, &settings)?;
    Ok(LceResult { exponents, history })
}

fn validate(
    op: &impl StepOperator,
    state: &State,
    p: usize,
    settings: &LceSettings,
) -> Result<()> {
    check_state(op, state)?;
    validate_directions(op.dimension(), p)?;
    if settings.n_compute == 0 {
        return Err(LyapunovError::InvalidParameter(
            "Lyapunov computation requires at least one integration step.".into(),
        ));
    }
    validate_time_step(op.time_step())
}

pub(crate) fn validate_directions(dim: usize, p: usize) -> Result<()> {
    if p == 0 || p > dim {
        return Err(LyapunovError::DimensionMismatch {
            context: "number of directions (1..=dim)",
            expected: dim,
            found: p,
        });
    }
    Ok(())
}

pub(crate) fn validate_time_step(dt: f64) -> Result<()> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(LyapunovError::InvalidParameter(
            "Step size dt must be positive.".into(),
        ));
    }
    Ok(())
}

/// Warm-up, accumulation and normalization shared by [`mlce`] and [`lce`].
fn accumulate(
    op: &mut impl StepOperator,
    state: &mut State,
    mut basis: DMatrix<f64>,
    settings: &LceSettings,
) -> Result<(Vec<f64>, Option<DMatrix<f64>>)> {
    let p = basis.ncols();
    let dt = op.time_step();

    forward(op, state, settings.n_forward, false)?;
    debug!(
        n_forward = settings.n_forward,
        n_compute = settings.n_compute,
        p,
        "warm-up finished, accumulating exponents"
    );

    let mut sums = vec![0.0; p];
    let mut history = settings
        .keep
        .then(|| DMatrix::zeros(settings.n_compute, p));

    for step in 0..settings.n_compute {
        let qr = tangent_step(op, state, &basis, Phase::Compute, step)?;

        for (sum, growth) in sums.iter_mut().zip(qr.log_growth()) {
            *sum += growth;
        }
        if let Some(history) = history.as_mut() {
            let elapsed = (step + 1) as f64 * dt;
            for (j, sum) in sums.iter().enumerate() {
                history[(step, j)] = sum / elapsed;
            }
        }
        basis = qr.q;
    }

    let total_time = settings.n_compute as f64 * dt;
    let exponents: Vec<f64> = sums.into_iter().map(|s| s / total_time).collect();
    debug!(?exponents, "exponent accumulation finished");
    Ok((exponents, history))
}

/// Kaplan-Yorke (Lyapunov) dimension of an exponent spectrum.
///
/// With exponents sorted in decreasing order and k the largest index whose partial
/// sum is non-negative, D = k + (λ_1 + ... + λ_k) / |λ_{k+1}|.
pub fn kaplan_yorke(exponents: &[f64]) -> f64 {
    let mut sorted = exponents.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut partial = 0.0;
    for (k, &lambda) in sorted.iter().enumerate() {
        if partial + lambda < 0.0 {
            return k as f64 + partial / lambda.abs();
        }
        partial += lambda;
    }
    sorted.len() as f64
}
