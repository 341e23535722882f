use crate::core::distribution::{clamp_unit, standard_normal_cdf, standard_normal_quantile};
use crate::correlation::matrix::{CorrelationError, CorrelationMatrix};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Dependence structure used to couple the marginals of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Copula {
    /// Correlated normals; no extra tail dependence.
    #[default]
    Gaussian,
    /// Chi-squared-scaled normals. Lower `degrees_of_freedom` means stronger
    /// joint tail co-movement (simultaneous stress).
    StudentT { degrees_of_freedom: f64 },
}

impl Copula {
    pub fn student_t(degrees_of_freedom: f64) -> Result<Self, CorrelationError> {
        let copula = Copula::StudentT { degrees_of_freedom };
        copula.validate()?;
        Ok(copula)
    }

    pub fn validate(&self) -> Result<(), CorrelationError> {
        match *self {
            Copula::Gaussian => Ok(()),
            Copula::StudentT { degrees_of_freedom }
                if degrees_of_freedom.is_finite() && degrees_of_freedom > 0.0 =>
            {
                Ok(())
            }
            Copula::StudentT { degrees_of_freedom } => {
                Err(CorrelationError::InvalidDegreesOfFreedom(degrees_of_freedom))
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Kernel {
    /// Identity matrix: uniforms pass through untouched.
    Independent,
    Gaussian,
    StudentT {
        degrees_of_freedom: f64,
        marginal: StudentsT,
        mixing: ChiSquared<f64>,
    },
}

/// A copula prepared against one correlation matrix.
///
/// Built once per run and shared read-only by every worker. An identity
/// matrix short-circuits to independence for either copula, so the default
/// "no correlations supplied" path is exactly independent sampling rather
/// than a numerical round trip.
#[derive(Debug, Clone)]
pub struct CopulaSampler {
    matrix: CorrelationMatrix,
    kernel: Kernel,
}

impl CopulaSampler {
    pub fn new(matrix: &CorrelationMatrix, copula: Copula) -> Result<Self, CorrelationError> {
        copula.validate()?;
        let kernel = if matrix.is_identity() {
            Kernel::Independent
        } else {
            match copula {
                Copula::Gaussian => Kernel::Gaussian,
                Copula::StudentT { degrees_of_freedom } => Kernel::StudentT {
                    degrees_of_freedom,
                    marginal: StudentsT::new(0.0, 1.0, degrees_of_freedom)
                        .map_err(|_| CorrelationError::InvalidDegreesOfFreedom(degrees_of_freedom))?,
                    mixing: ChiSquared::new(degrees_of_freedom)
                        .map_err(|_| CorrelationError::InvalidDegreesOfFreedom(degrees_of_freedom))?,
                },
            }
        };
        Ok(Self {
            matrix: matrix.clone(),
            kernel,
        })
    }

    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    pub fn is_independent(&self) -> bool {
        matches!(self.kernel, Kernel::Independent)
    }

    /// Transform one row of independent uniforms (one per variable) into
    /// jointly dependent uniforms, in place.
    ///
    /// `rng` is only drawn from by the Student-t kernel (one chi-squared
    /// mixing variate per row).
    pub fn transform_row<R: Rng + ?Sized>(
        &self,
        uniforms: &mut [f64],
        rng: &mut R,
    ) -> Result<(), CorrelationError> {
        if uniforms.len() != self.dim() {
            return Err(CorrelationError::DimensionMismatch {
                expected: self.dim(),
                got: uniforms.len(),
            });
        }
        if self.is_independent() {
            return Ok(());
        }

        let z: Vec<f64> = uniforms
            .iter()
            .map(|&u| standard_normal_quantile(clamp_unit(u)))
            .collect();
        let mut correlated = vec![0.0; z.len()];
        self.matrix.correlate_normals(&z, &mut correlated);

        match &self.kernel {
            Kernel::Independent => {}
            Kernel::Gaussian => {
                for (u, x) in uniforms.iter_mut().zip(&correlated) {
                    *u = standard_normal_cdf(*x);
                }
            }
            Kernel::StudentT {
                degrees_of_freedom,
                marginal,
                mixing,
            } => {
                let w: f64 = mixing.sample(rng);
                let scale = (degrees_of_freedom / w.max(f64::MIN_POSITIVE)).sqrt();
                for (u, x) in uniforms.iter_mut().zip(&correlated) {
                    *u = marginal.cdf(x * scale);
                }
            }
        }
        Ok(())
    }
}

/// Couple per-variable uniform samples through `copula`.
///
/// `per_variable_uniforms[i]` holds the uniforms for variable `i` of
/// `matrix`; every column must have the same length. Returns correlated
/// uniforms in the same layout, ready for each variable's inverse CDF.
pub fn correlated_samples<R: Rng + ?Sized>(
    matrix: &CorrelationMatrix,
    per_variable_uniforms: &[Vec<f64>],
    copula: Copula,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>, CorrelationError> {
    let sampler = CopulaSampler::new(matrix, copula)?;
    if per_variable_uniforms.len() != sampler.dim() {
        return Err(CorrelationError::DimensionMismatch {
            expected: sampler.dim(),
            got: per_variable_uniforms.len(),
        });
    }
    let rows = per_variable_uniforms.first().map_or(0, Vec::len);
    if let Some(bad) = per_variable_uniforms.iter().find(|c| c.len() != rows) {
        return Err(CorrelationError::DimensionMismatch {
            expected: rows,
            got: bad.len(),
        });
    }

    let mut out: Vec<Vec<f64>> = per_variable_uniforms.to_vec();
    if sampler.is_independent() {
        return Ok(out);
    }

    let mut row = vec![0.0; sampler.dim()];
    for r in 0..rows {
        for (slot, column) in row.iter_mut().zip(per_variable_uniforms) {
            *slot = column[r];
        }
        sampler.transform_row(&mut row, rng)?;
        for (column, value) in out.iter_mut().zip(&row) {
            column[r] = *value;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::matrix::{build_matrix, PairwiseCorrelation};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn uniforms(columns: usize, rows: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..columns)
            .map(|_| (0..rows).map(|_| rng.gen::<f64>()).collect())
            .collect()
    }

    fn pearson(x: &[f64], y: &[f64]) -> f64 {
        let n = x.len() as f64;
        let mx = x.iter().sum::<f64>() / n;
        let my = y.iter().sum::<f64>() / n;
        let cov: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
        let vx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
        let vy: f64 = y.iter().map(|b| (b - my).powi(2)).sum();
        cov / (vx * vy).sqrt()
    }

    #[test]
    fn test_identity_passes_uniforms_through() {
        let m = CorrelationMatrix::identity(&["a", "b"]).unwrap();
        let input = uniforms(2, 100, 3);
        let mut rng = StdRng::seed_from_u64(0);
        let out = correlated_samples(&m, &input, Copula::Gaussian, &mut rng).unwrap();
        assert_eq!(out, input);

        let t = correlated_samples(&m, &input, Copula::student_t(4.0).unwrap(), &mut rng).unwrap();
        assert_eq!(t, input);
    }

    #[test]
    fn test_gaussian_copula_induces_dependence() {
        let m = build_matrix(&["a", "b"], &[PairwiseCorrelation::new("a", "b", 0.8)]).unwrap();
        let input = uniforms(2, 20_000, 5);
        let mut rng = StdRng::seed_from_u64(0);
        let out = correlated_samples(&m, &input, Copula::Gaussian, &mut rng).unwrap();

        let za: Vec<f64> = out[0].iter().map(|&u| standard_normal_quantile(clamp_unit(u))).collect();
        let zb: Vec<f64> = out[1].iter().map(|&u| standard_normal_quantile(clamp_unit(u))).collect();
        assert!((pearson(&za, &zb) - 0.8).abs() < 0.03);
        assert!(out.iter().flatten().all(|u| (0.0..=1.0).contains(u)));
    }

    #[test]
    fn test_first_variable_marginal_untouched_by_gaussian() {
        // L[0][0] = 1, so the first column maps through Φ(Φ⁻¹(u)).
        let m = build_matrix(&["a", "b"], &[PairwiseCorrelation::new("a", "b", 0.5)]).unwrap();
        let input = uniforms(2, 50, 9);
        let mut rng = StdRng::seed_from_u64(0);
        let out = correlated_samples(&m, &input, Copula::Gaussian, &mut rng).unwrap();
        for (a, b) in out[0].iter().zip(&input[0]) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_student_t_has_heavier_joint_tails() {
        let m = build_matrix(&["a", "b"], &[PairwiseCorrelation::new("a", "b", 0.5)]).unwrap();
        let input = uniforms(2, 40_000, 21);
        let joint_tail = |out: &[Vec<f64>]| {
            out[0]
                .iter()
                .zip(&out[1])
                .filter(|(a, b)| **a < 0.01 && **b < 0.01)
                .count()
        };
        let gauss =
            correlated_samples(&m, &input, Copula::Gaussian, &mut StdRng::seed_from_u64(1)).unwrap();
        let t = correlated_samples(
            &m,
            &input,
            Copula::student_t(3.0).unwrap(),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert!(joint_tail(&t) > joint_tail(&gauss));
    }

    #[test]
    fn test_dimension_mismatch() {
        let m = CorrelationMatrix::identity(&["a", "b"]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = correlated_samples(&m, &uniforms(3, 10, 1), Copula::Gaussian, &mut rng).unwrap_err();
        assert!(matches!(err, CorrelationError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_invalid_degrees_of_freedom() {
        assert!(Copula::student_t(0.0).is_err());
        assert!(Copula::student_t(f64::INFINITY).is_err());
        assert!(Copula::student_t(5.0).is_ok());
    }
}
