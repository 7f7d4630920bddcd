use crate::error::{LyapunovError, Result};
use nalgebra::DMatrix;

/// Smallest admissible ratio between the extreme singular values of a CLV matrix.
pub const CONDITION_TOLERANCE: f64 = 1e-12;

/// Adjoint (dual) vectors of a sequence of CLV matrices.
///
/// For each dim x p matrix V the result A satisfies V^T A = D with D diagonal and
/// positive: A spans the same subspace as V, column j is orthogonal to every CLV but
/// the j-th, and columns are normalized to unit length (so D_jj = 1 / |(V^T)^+ e_j|).
pub fn adj(clvs: &[DMatrix<f64>]) -> Result<Vec<DMatrix<f64>>> {
    clvs.iter()
        .enumerate()
        .map(|(step, v)| adjoint_at(v, step))
        .collect()
}

fn adjoint_at(v: &DMatrix<f64>, step: usize) -> Result<DMatrix<f64>> {
    let (dim, p) = v.shape();
    if p == 0 || p > dim {
        return Err(LyapunovError::DimensionMismatch {
            context: "CLV matrix columns",
            expected: dim,
            found: p,
        });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(LyapunovError::Singular { step });
    }

    let singular_values = v.singular_values();
    if !(singular_values.min() > CONDITION_TOLERANCE * singular_values.max()) {
        return Err(LyapunovError::Singular { step });
    }

    let dual = if p == dim {
        v.transpose().lu().solve(&DMatrix::identity(dim, dim))
    } else {
        // A = V (V^T V)^{-1}, the dual basis inside span V.
        v.tr_mul(v).lu().solve(&v.transpose()).map(|x| x.transpose())
    };
    let mut dual = dual.ok_or(LyapunovError::Singular { step })?;

    for mut column in dual.column_iter_mut() {
        let norm = column.norm();
        if !(norm > 0.0) || !norm.is_finite() {
            return Err(LyapunovError::Singular { step });
        }
        column /= norm;
    }
    Ok(dual)
}

#[cfg(test)]
mod tests {
    use super::adj;
    use crate::clv::{clv, ClvSettings};
    use crate::error::LyapunovError;
    use crate::systems::{DiscreteDS, FnSystem, State};
    use nalgebra::DMatrix;

    fn assert_biorthogonal(v: &DMatrix<f64>, a: &DMatrix<f64>) {
        let d = v.transpose() * a;
        for i in 0..d.nrows() {
            for j in 0..d.ncols() {
                if i == j {
                    assert!(d[(i, j)] > 1e-8, "diagonal entry {i} = {}", d[(i, j)]);
                } else {
                    assert!(d[(i, j)].abs() < 1e-10, "off-diagonal ({i}, {j}) = {}", d[(i, j)]);
                }
            }
        }
    }

    #[test]
    fn square_adjoints_are_biorthogonal_and_unit() {
        let s = 0.5f64.sqrt();
        let v = DMatrix::from_row_slice(2, 2, &[1.0, s, 0.0, s]);
        let adjoints = adj(&[v.clone(), DMatrix::identity(2, 2)]).expect("well conditioned");
        assert_eq!(adjoints.len(), 2);
        assert_biorthogonal(&v, &adjoints[0]);
        for j in 0..2 {
            assert!((adjoints[0].column(j).norm() - 1.0).abs() < 1e-12);
        }
        // For orthonormal CLVs the adjoints are the CLVs themselves.
        assert!((&adjoints[1] - DMatrix::<f64>::identity(2, 2)).amax() < 1e-12);
    }

    #[test]
    fn rectangular_adjoints_stay_in_the_clv_span() {
        let v = DMatrix::from_row_slice(3, 2, &[1.0, 0.6, 0.0, 0.8, 0.0, 0.0]);
        let adjoints = adj(std::slice::from_ref(&v)).expect("well conditioned");
        let a = &adjoints[0];
        assert_eq!(a.shape(), (3, 2));
        assert_biorthogonal(&v, a);
        assert!(a.row(2).amax() < 1e-14);
    }

    #[test]
    fn adjoints_of_computed_clvs_are_biorthogonal_at_every_step() {
        let cat = FnSystem::new(
            2,
            |_t, x: &[f64], out: &mut [f64]| {
                out[0] = (2.0 * x[0] + x[1] + 0.05 * (x[0] * 6.0).sin()).rem_euclid(1.0);
                out[1] = (x[0] + x[1]).rem_euclid(1.0);
            },
            |_t, x: &[f64], out: &mut [f64]| {
                out.copy_from_slice(&[2.0 + 0.3 * (x[0] * 6.0).cos(), 1.0, 1.0, 1.0]);
            },
        );
        let mut ds = DiscreteDS::new(cat).expect("valid");
        let mut state = State::new(vec![0.3, 0.6], 0.0);
        let settings = ClvSettings {
            n_forward: 10,
            n_a: 50,
            n_b: 40,
            n_c: 50,
            traj: false,
            check: false,
        };
        let clvs = clv(&mut ds, &mut state, 2, settings).expect("clv").vectors;
        let adjoints = adj(&clvs).expect("adjoints");
        assert_eq!(adjoints.len(), clvs.len());
        for (v, a) in clvs.iter().zip(&adjoints) {
            assert_biorthogonal(v, a);
        }
    }

    #[test]
    fn parallel_clvs_are_rejected() {
        let good = DMatrix::<f64>::identity(2, 2);
        let parallel = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 0.0]);
        let err = adj(&[good, parallel]).expect_err("singular");
        assert!(matches!(err, LyapunovError::Singular { step: 1 }));
        assert!(err.to_string().contains("nearly parallel"));
    }

    #[test]
    fn too_many_columns_is_a_dimension_error() {
        let err = adj(&[DMatrix::zeros(2, 3)]).expect_err("p > dim");
        assert!(matches!(err, LyapunovError::DimensionMismatch { .. }));
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(adj(&[]).expect("nothing to do").is_empty());
    }
}
