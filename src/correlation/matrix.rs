use log::{debug, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Largest negative eigenvalue still accepted as positive semi-definite.
pub const PSD_TOLERANCE: f64 = 1e-6;

/// Pivots below this are treated as zero by the Cholesky factorization, which
/// lets singular (but PSD) matrices such as ρ = 1 pairs factor cleanly.
const CHOLESKY_PIVOT_EPSILON: f64 = 1e-12;

/// Two entries closer than this are considered the same correlation.
const SYMMETRY_EPSILON: f64 = 1e-12;

/// Errors arising from correlation matrix construction or use.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrelationError {
    #[error(
        "conflicting correlations for {first}/{second}: {forward} vs {reverse}"
    )]
    AsymmetricInput {
        first: String,
        second: String,
        forward: f64,
        reverse: f64,
    },
    #[error(
        "correlation matrix is not positive semi-definite (min eigenvalue {min_eigenvalue:.3e}, \
         {repaired_min_eigenvalue:.3e} after nearest-PSD projection)"
    )]
    NonPositiveSemiDefinite {
        min_eigenvalue: f64,
        repaired_min_eigenvalue: f64,
    },
    #[error("correlation references unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("variable `{0}` appears more than once")]
    DuplicateVariable(String),
    #[error("correlation {value} for {first}/{second} is outside [-1, 1]")]
    OutOfRange {
        first: String,
        second: String,
        value: f64,
    },
    #[error("self-correlation of `{variable}` must be 1, got {value}")]
    InvalidSelfCorrelation { variable: String, value: f64 },
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("copula degrees of freedom must be finite and > 0, got {0}")]
    InvalidDegreesOfFreedom(f64),
}

/// A correlation link between two named variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseCorrelation {
    pub first: String,
    pub second: String,
    pub rho: f64,
}

impl PairwiseCorrelation {
    pub fn new(first: impl Into<String>, second: impl Into<String>, rho: f64) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            rho,
        }
    }
}

/// Validated correlation matrix over an ordered set of variable names.
///
/// Invariants: square, symmetric, unit diagonal, entries in [-1, 1], and
/// positive semi-definite within [`PSD_TOLERANCE`]. A matrix that fails the
/// PSD check is projected onto the nearest PSD correlation matrix; if the
/// projection still fails the tolerance, construction is rejected. Repairs
/// are recorded (`was_repaired`) and logged, never silent.
///
/// The lower Cholesky factor is computed once at construction.
///
/// # Examples
///
/// ```
/// use risk_engine::correlation::matrix::{build_matrix, PairwiseCorrelation};
///
/// let names = ["readiness", "capability"];
/// let matrix = build_matrix(&names, &[PairwiseCorrelation::new("readiness", "capability", 0.6)])
///     .unwrap();
/// assert_eq!(matrix.correlation("capability", "readiness"), Some(0.6));
/// assert!(!matrix.is_identity());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    names: Vec<String>,
    /// Row-major n × n entries.
    values: Vec<f64>,
    /// Row-major lower-triangular Cholesky factor.
    cholesky: Vec<f64>,
    repaired: bool,
}

impl CorrelationMatrix {
    /// Full independence over `names`.
    pub fn identity<S: AsRef<str>>(names: &[S]) -> Result<Self, CorrelationError> {
        build_matrix(names, &[])
    }

    /// Build from explicit rows. Rows must already be symmetric with a unit
    /// diagonal.
    pub fn from_rows<S: AsRef<str>>(
        names: &[S],
        rows: &[Vec<f64>],
    ) -> Result<Self, CorrelationError> {
        let names = unique_names(names)?;
        let n = names.len();
        if rows.len() != n {
            return Err(CorrelationError::DimensionMismatch {
                expected: n,
                got: rows.len(),
            });
        }
        let mut values = Vec::with_capacity(n * n);
        for row in rows {
            if row.len() != n {
                return Err(CorrelationError::DimensionMismatch {
                    expected: n,
                    got: row.len(),
                });
            }
            values.extend_from_slice(row);
        }

        for i in 0..n {
            let diag = values[i * n + i];
            if (diag - 1.0).abs() > SYMMETRY_EPSILON {
                return Err(CorrelationError::InvalidSelfCorrelation {
                    variable: names[i].clone(),
                    value: diag,
                });
            }
            for j in (i + 1)..n {
                let forward = values[i * n + j];
                let reverse = values[j * n + i];
                check_range(&names[i], &names[j], forward)?;
                check_range(&names[j], &names[i], reverse)?;
                if (forward - reverse).abs() > SYMMETRY_EPSILON {
                    return Err(CorrelationError::AsymmetricInput {
                        first: names[i].clone(),
                        second: names[j].clone(),
                        forward,
                        reverse,
                    });
                }
            }
        }

        Self::finalize(names, values)
    }

    fn finalize(names: Vec<String>, mut values: Vec<f64>) -> Result<Self, CorrelationError> {
        let n = names.len();
        let mut repaired = false;

        let smallest = min_eigenvalue(n, &values);
        if smallest < -PSD_TOLERANCE {
            let projected = accept_projection(n, smallest, nearest_psd(n, &values))?;
            let max_adjustment = values
                .iter()
                .zip(&projected)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            warn!(
                "correlation matrix over {:?} was not PSD (min eigenvalue {:.3e}); \
                 projected to nearest PSD matrix (max entry change {:.4})",
                names, smallest, max_adjustment
            );
            values = projected;
            repaired = true;
        }

        let cholesky = cholesky_lower_psd(n, &values);
        debug!(
            "built {}x{} correlation matrix (repaired: {})",
            n, n, repaired
        );

        Ok(Self {
            names,
            values,
            cholesky,
            repaired,
        })
    }

    // --- Accessors ---

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dim(&self) -> usize {
        self.names.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Entry (i, j). Panics on out-of-range indices, like slice indexing.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dim() + j]
    }

    /// Correlation between two named variables.
    pub fn correlation(&self, first: &str, second: &str) -> Option<f64> {
        Some(self.get(self.index_of(first)?, self.index_of(second)?))
    }

    /// Row-major entries.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Row-major lower Cholesky factor L with L Lᵀ = C.
    pub fn cholesky(&self) -> &[f64] {
        &self.cholesky
    }

    /// True when every off-diagonal entry is exactly zero.
    pub fn is_identity(&self) -> bool {
        let n = self.dim();
        (0..n).all(|i| (0..n).all(|j| i == j || self.values[i * n + j] == 0.0))
    }

    /// Whether the input had to be projected to the nearest PSD matrix.
    pub fn was_repaired(&self) -> bool {
        self.repaired
    }

    /// Smallest eigenvalue of the (possibly repaired) matrix.
    pub fn min_eigenvalue(&self) -> f64 {
        min_eigenvalue(self.dim(), &self.values)
    }

    /// `out = L z`: turns independent standard normals into correlated ones.
    pub fn correlate_normals(&self, z: &[f64], out: &mut [f64]) {
        let n = self.dim();
        for i in 0..n {
            out[i] = (0..=i).map(|k| self.cholesky[i * n + k] * z[k]).sum();
        }
    }
}

/// Build a correlation matrix over `variable_names` from a partial set of
/// pairwise correlations. Unmentioned pairs are independent.
///
/// Fails on conflicting entries for the same pair (in either order), unknown
/// or duplicated names, out-of-range values, and matrices that cannot be
/// brought within PSD tolerance.
pub fn build_matrix<S: AsRef<str>>(
    variable_names: &[S],
    pairwise: &[PairwiseCorrelation],
) -> Result<CorrelationMatrix, CorrelationError> {
    let names = unique_names(variable_names)?;
    let n = names.len();
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let lookup = |name: &str| {
        index
            .get(name)
            .copied()
            .ok_or_else(|| CorrelationError::UnknownVariable(name.to_string()))
    };

    let mut values = vec![0.0; n * n];
    for i in 0..n {
        values[i * n + i] = 1.0;
    }

    // (low index, high index) -> (value, as-supplied pair)
    let mut assigned: HashMap<(usize, usize), (f64, &PairwiseCorrelation)> = HashMap::new();

    for entry in pairwise {
        let i = lookup(&entry.first)?;
        let j = lookup(&entry.second)?;
        if i == j {
            if (entry.rho - 1.0).abs() > SYMMETRY_EPSILON {
                return Err(CorrelationError::InvalidSelfCorrelation {
                    variable: entry.first.clone(),
                    value: entry.rho,
                });
            }
            continue;
        }
        check_range(&entry.first, &entry.second, entry.rho)?;

        let key = (i.min(j), i.max(j));
        if let Some((existing, previous)) = assigned.get(&key) {
            if (existing - entry.rho).abs() > SYMMETRY_EPSILON {
                return Err(CorrelationError::AsymmetricInput {
                    first: previous.first.clone(),
                    second: previous.second.clone(),
                    forward: *existing,
                    reverse: entry.rho,
                });
            }
            continue;
        }
        assigned.insert(key, (entry.rho, entry));
        values[i * n + j] = entry.rho;
        values[j * n + i] = entry.rho;
    }

    CorrelationMatrix::finalize(names, values)
}

fn unique_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>, CorrelationError> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        if out.iter().any(|n| n == name) {
            return Err(CorrelationError::DuplicateVariable(name.to_string()));
        }
        out.push(name.to_string());
    }
    Ok(out)
}

fn check_range(first: &str, second: &str, value: f64) -> Result<(), CorrelationError> {
    if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
        return Err(CorrelationError::OutOfRange {
            first: first.to_string(),
            second: second.to_string(),
            value,
        });
    }
    Ok(())
}

fn min_eigenvalue(n: usize, values: &[f64]) -> f64 {
    if n == 0 {
        return 1.0;
    }
    DMatrix::from_row_slice(n, n, values)
        .symmetric_eigen()
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Accept a nearest-PSD projection only if it is PSD within tolerance.
///
/// Clipping can only raise the diagonal and the rescaled result is PSD up to
/// rounding, so matrices that pass the entry checks never fail here.
fn accept_projection(
    n: usize,
    original_min: f64,
    projected: Option<Vec<f64>>,
) -> Result<Vec<f64>, CorrelationError> {
    let projected_min = projected
        .as_ref()
        .map(|m| min_eigenvalue(n, m))
        .unwrap_or(f64::NEG_INFINITY);
    match projected {
        Some(projected) if projected_min >= -PSD_TOLERANCE => Ok(projected),
        _ => Err(CorrelationError::NonPositiveSemiDefinite {
            min_eigenvalue: original_min,
            repaired_min_eigenvalue: projected_min,
        }),
    }
}

/// Eigenvalue clipping followed by rescaling the diagonal back to one.
///
/// Returns `None` when a variable loses all its variance in the clipping step,
/// in which case no correlation matrix can be recovered.
fn nearest_psd(n: usize, values: &[f64]) -> Option<Vec<f64>> {
    let mut eigen = DMatrix::from_row_slice(n, n, values).symmetric_eigen();
    eigen.eigenvalues.iter_mut().for_each(|l| *l = l.max(0.0));
    let clipped = eigen.recompose();

    let scale: Vec<f64> = (0..n).map(|i| clipped[(i, i)].sqrt()).collect();
    if scale.iter().any(|s| !s.is_finite() || *s <= CHOLESKY_PIVOT_EPSILON) {
        return None;
    }

    let mut out = vec![0.0; n * n];
    for i in 0..n {
        out[i * n + i] = 1.0;
        for j in (i + 1)..n {
            let avg = 0.5 * (clipped[(i, j)] + clipped[(j, i)]);
            let rho = (avg / (scale[i] * scale[j])).clamp(-1.0, 1.0);
            out[i * n + j] = rho;
            out[j * n + i] = rho;
        }
    }
    Some(out)
}

/// Lower Cholesky factor of a PSD matrix. Zero pivots produce zero columns
/// instead of failing, so perfectly correlated pairs are representable.
fn cholesky_lower_psd(n: usize, values: &[f64]) -> Vec<f64> {
    let mut lower = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| lower[i * n + k] * lower[j * n + k]).sum();
            if i == j {
                let pivot = values[i * n + i] - sum;
                lower[i * n + i] = if pivot > CHOLESKY_PIVOT_EPSILON {
                    pivot.sqrt()
                } else {
                    0.0
                };
            } else {
                let l_jj = lower[j * n + j];
                lower[i * n + j] = if l_jj > 0.0 {
                    (values[i * n + j] - sum) / l_jj
                } else {
                    0.0
                };
            }
        }
    }
    lower
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reconstruct(m: &CorrelationMatrix) -> Vec<f64> {
        let n = m.dim();
        let l = m.cholesky();
        let mut out = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                out[i * n + j] = (0..n).map(|k| l[i * n + k] * l[j * n + k]).sum();
            }
        }
        out
    }

    #[test]
    fn test_identity_default() {
        let m = build_matrix(&["a", "b", "c"], &[]).unwrap();
        assert!(m.is_identity());
        assert!(!m.was_repaired());
        assert_eq!(m.cholesky(), m.values());
    }

    #[test]
    fn test_pairwise_fill_is_symmetric() {
        let m = build_matrix(
            &["a", "b", "c"],
            &[
                PairwiseCorrelation::new("a", "b", 0.5),
                PairwiseCorrelation::new("c", "b", -0.3),
            ],
        )
        .unwrap();
        assert_eq!(m.get(0, 1), 0.5);
        assert_eq!(m.get(1, 0), 0.5);
        assert_eq!(m.correlation("b", "c"), Some(-0.3));
        assert_eq!(m.correlation("a", "c"), Some(0.0));
    }

    #[test]
    fn test_conflicting_pair_rejected() {
        let err = build_matrix(
            &["a", "b"],
            &[
                PairwiseCorrelation::new("a", "b", 0.5),
                PairwiseCorrelation::new("b", "a", 0.4),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, CorrelationError::AsymmetricInput { .. }));
    }

    #[test]
    fn test_consistent_duplicate_accepted() {
        let m = build_matrix(
            &["a", "b"],
            &[
                PairwiseCorrelation::new("a", "b", 0.5),
                PairwiseCorrelation::new("b", "a", 0.5),
            ],
        )
        .unwrap();
        assert_eq!(m.get(1, 0), 0.5);
    }

    #[test]
    fn test_unknown_and_out_of_range() {
        let unknown = build_matrix(&["a"], &[PairwiseCorrelation::new("a", "z", 0.1)]).unwrap_err();
        assert_eq!(unknown, CorrelationError::UnknownVariable("z".into()));

        let range =
            build_matrix(&["a", "b"], &[PairwiseCorrelation::new("a", "b", 1.2)]).unwrap_err();
        assert!(matches!(range, CorrelationError::OutOfRange { .. }));

        let dup = build_matrix(&["a", "a"], &[]).unwrap_err();
        assert!(matches!(dup, CorrelationError::DuplicateVariable(_)));
    }

    #[test]
    fn test_cholesky_reconstructs_matrix() {
        let m = build_matrix(
            &["a", "b", "c"],
            &[
                PairwiseCorrelation::new("a", "b", 0.8),
                PairwiseCorrelation::new("a", "c", 0.3),
                PairwiseCorrelation::new("b", "c", 0.5),
            ],
        )
        .unwrap();
        for (x, y) in reconstruct(&m).iter().zip(m.values()) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_perfect_correlation_factors() {
        let m = build_matrix(&["a", "b"], &[PairwiseCorrelation::new("a", "b", 1.0)]).unwrap();
        let mut out = [0.0; 2];
        m.correlate_normals(&[0.7, -2.0], &mut out);
        assert_relative_eq!(out[0], out[1], epsilon = 1e-12);
    }

    #[test]
    fn test_non_psd_is_repaired() {
        let rows = vec![
            vec![1.0, 0.95, 0.95],
            vec![0.95, 1.0, -0.95],
            vec![0.95, -0.95, 1.0],
        ];
        let m = CorrelationMatrix::from_rows(&["a", "b", "c"], &rows).unwrap();
        assert!(m.was_repaired());
        assert!(m.min_eigenvalue() >= -PSD_TOLERANCE);
        for i in 0..3 {
            assert_relative_eq!(m.get(i, i), 1.0);
        }
        for (x, y) in reconstruct(&m).iter().zip(m.values()) {
            assert_relative_eq!(x, y, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_projection_still_indefinite_is_rejected() {
        // Eigenvalues -0.5 and 2.5.
        let indefinite = vec![1.0, 1.5, 1.5, 1.0];
        match accept_projection(2, -0.9, Some(indefinite)) {
            Err(CorrelationError::NonPositiveSemiDefinite {
                min_eigenvalue,
                repaired_min_eigenvalue,
            }) => {
                assert_eq!(min_eigenvalue, -0.9);
                assert_relative_eq!(repaired_min_eigenvalue, -0.5, epsilon = 1e-9);
                assert!(repaired_min_eigenvalue < -PSD_TOLERANCE);
            }
            other => panic!("expected NonPositiveSemiDefinite, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_projection_is_rejected() {
        let err = accept_projection(2, -0.3, None).unwrap_err();
        assert_eq!(
            err,
            CorrelationError::NonPositiveSemiDefinite {
                min_eigenvalue: -0.3,
                repaired_min_eigenvalue: f64::NEG_INFINITY,
            }
        );
    }

    #[test]
    fn test_psd_projection_is_accepted() {
        let projected = vec![1.0, 0.5, 0.5, 1.0];
        assert_eq!(accept_projection(2, -0.2, Some(projected.clone())), Ok(projected));
    }

    #[test]
    fn test_from_rows_rejects_asymmetry() {
        let rows = vec![vec![1.0, 0.2], vec![0.3, 1.0]];
        let err = CorrelationMatrix::from_rows(&["a", "b"], &rows).unwrap_err();
        assert!(matches!(err, CorrelationError::AsymmetricInput { .. }));
    }

    #[test]
    fn test_from_rows_rejects_bad_diagonal() {
        let rows = vec![vec![0.9, 0.2], vec![0.2, 1.0]];
        let err = CorrelationMatrix::from_rows(&["a", "b"], &rows).unwrap_err();
        assert!(matches!(err, CorrelationError::InvalidSelfCorrelation { .. }));
    }
}
