use rand::Rng;
use rand_distr::{Beta, Distribution, Exp, Gamma, LogNormal, Normal, Poisson, Uniform, Weibull};
use serde::{Deserialize, Serialize};
use statrs::distribution::{self as sd, ContinuousCDF};
use statrs::function::{erf, gamma::gamma};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest distance kept between a uniform draw and the ends of the unit
/// interval before it is fed to an inverse CDF.
pub const UNIT_INTERVAL_EPSILON: f64 = 1e-12;

/// Above this rate the Poisson quantile switches to a normal approximation,
/// since `exp(-lambda)` underflows.
const POISSON_NORMAL_APPROX_LAMBDA: f64 = 500.0;

/// Parametric families supported by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Normal,
    LogNormal,
    Uniform,
    Exponential,
    Gamma,
    Beta,
    Weibull,
    Poisson,
}

impl Family {
    pub const ALL: [Family; 8] = [
        Family::Normal,
        Family::LogNormal,
        Family::Uniform,
        Family::Exponential,
        Family::Gamma,
        Family::Beta,
        Family::Weibull,
        Family::Poisson,
    ];

    /// Identifier used in scenario definitions (`log_normal`, `weibull`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Normal => "normal",
            Family::LogNormal => "log_normal",
            Family::Uniform => "uniform",
            Family::Exponential => "exponential",
            Family::Gamma => "gamma",
            Family::Beta => "beta",
            Family::Weibull => "weibull",
            Family::Poisson => "poisson",
        }
    }

    /// Native parameter names, in the order the typed constructors take them.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            Family::Normal => &["mean", "std_dev"],
            Family::LogNormal => &["mu", "sigma"],
            Family::Uniform => &["min", "max"],
            Family::Exponential => &["rate"],
            Family::Gamma => &["shape", "scale"],
            Family::Beta => &["alpha", "beta"],
            Family::Weibull => &["shape", "scale"],
            Family::Poisson => &["lambda"],
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, Family::Poisson)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Family::Normal => "normal",
            Family::LogNormal => "log-normal",
            Family::Uniform => "uniform",
            Family::Exponential => "exponential",
            Family::Gamma => "gamma",
            Family::Beta => "beta",
            Family::Weibull => "Weibull",
            Family::Poisson => "Poisson",
        };
        f.write_str(label)
    }
}

impl FromStr for Family {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "normal" | "gaussian" => Ok(Family::Normal),
            "log_normal" | "lognormal" => Ok(Family::LogNormal),
            "uniform" => Ok(Family::Uniform),
            "exponential" | "exp" => Ok(Family::Exponential),
            "gamma" => Ok(Family::Gamma),
            "beta" => Ok(Family::Beta),
            "weibull" => Ok(Family::Weibull),
            "poisson" => Ok(Family::Poisson),
            _ => Err(DistributionError::UnknownFamily(s.to_string())),
        }
    }
}

/// Errors raised while defining or evaluating a distribution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("{parameter} must be {constraint} for {family}")]
    InvalidParameter {
        family: Family,
        parameter: String,
        constraint: String,
    },
    #[error("missing parameter `{parameter}` for {family}")]
    MissingParameter { family: Family, parameter: String },
    #[error("unknown parameter `{parameter}` for {family} (expected one of: {expected})")]
    UnknownParameter {
        family: Family,
        parameter: String,
        expected: String,
    },
    #[error(
        "moment-matched beta is degenerate (alpha = {alpha}, beta = {beta}): \
         variance {variance} is too large for mean {mean}"
    )]
    DegenerateDistribution {
        mean: f64,
        variance: f64,
        alpha: f64,
        beta: f64,
    },
    #[error("unknown distribution family `{0}`")]
    UnknownFamily(String),
    #[error("{family} evaluation failed: {reason}")]
    Evaluation { family: Family, reason: String },
}

/// Validated, typed parameters. Kept private so a spec can only be built
/// through validation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Uniform { min: f64, max: f64 },
    Exponential { rate: f64 },
    Gamma { shape: f64, scale: f64 },
    Beta { alpha: f64, beta: f64 },
    Weibull { shape: f64, scale: f64 },
    Poisson { lambda: f64 },
}

/// A parametric distribution definition for one scenario variable.
///
/// Parameters are validated against the family's domain constraints when the
/// spec is created; the spec is immutable afterwards.
///
/// # Examples
///
/// ```
/// use risk_engine::core::distribution::{DistributionSpec, Family};
///
/// let spec = DistributionSpec::normal(100.0, 15.0).unwrap();
/// assert_eq!(spec.family(), Family::Normal);
/// assert_eq!(spec.parameter("std_dev"), Some(15.0));
///
/// let err = DistributionSpec::log_normal(0.0, -1.0).unwrap_err();
/// assert_eq!(err.to_string(), "sigma must be > 0 for log-normal");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DistributionDefinition", into = "DistributionDefinition")]
pub struct DistributionSpec {
    family: Family,
    parameters: BTreeMap<String, f64>,
    units: Option<String>,
    shape: Shape,
}

/// Unvalidated wire form of a [`DistributionSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionDefinition {
    pub family: Family,
    pub parameters: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl TryFrom<DistributionDefinition> for DistributionSpec {
    type Error = DistributionError;

    fn try_from(def: DistributionDefinition) -> Result<Self, Self::Error> {
        let spec = DistributionSpec::new(def.family, def.parameters)?;
        Ok(match def.units {
            Some(units) => spec.with_units(units),
            None => spec,
        })
    }
}

impl From<DistributionSpec> for DistributionDefinition {
    fn from(spec: DistributionSpec) -> Self {
        Self {
            family: spec.family,
            parameters: spec.parameters,
            units: spec.units,
        }
    }
}

impl DistributionSpec {
    /// Build a spec from a family and a name → value parameter mapping.
    pub fn new<K, I>(family: Family, parameters: I) -> Result<Self, DistributionError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let parameters: BTreeMap<String, f64> = parameters
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        let expected = family.parameter_names();
        if let Some(unknown) = parameters.keys().find(|k| !expected.contains(&k.as_str())) {
            return Err(DistributionError::UnknownParameter {
                family,
                parameter: unknown.clone(),
                expected: expected.join(", "),
            });
        }

        let get = |name: &str| -> Result<f64, DistributionError> {
            let value = parameters.get(name).copied().ok_or_else(|| {
                DistributionError::MissingParameter {
                    family,
                    parameter: name.to_string(),
                }
            })?;
            if !value.is_finite() {
                return Err(invalid(family, name, "finite"));
            }
            Ok(value)
        };
        let positive = |name: &str| -> Result<f64, DistributionError> {
            let value = get(name)?;
            if value <= 0.0 {
                return Err(invalid(family, name, "> 0"));
            }
            Ok(value)
        };

        let shape = match family {
            Family::Normal => Shape::Normal {
                mean: get("mean")?,
                std_dev: positive("std_dev")?,
            },
            Family::LogNormal => Shape::LogNormal {
                mu: get("mu")?,
                sigma: positive("sigma")?,
            },
            Family::Uniform => {
                let min = get("min")?;
                let max = get("max")?;
                if max <= min {
                    return Err(invalid(family, "max", "> min"));
                }
                if !(max - min).is_finite() {
                    return Err(invalid(family, "max", "max - min must be finite"));
                }
                Shape::Uniform { min, max }
            }
            Family::Exponential => Shape::Exponential {
                rate: positive("rate")?,
            },
            Family::Gamma => Shape::Gamma {
                shape: positive("shape")?,
                scale: positive("scale")?,
            },
            Family::Beta => Shape::Beta {
                alpha: positive("alpha")?,
                beta: positive("beta")?,
            },
            Family::Weibull => Shape::Weibull {
                shape: positive("shape")?,
                scale: positive("scale")?,
            },
            Family::Poisson => Shape::Poisson {
                lambda: positive("lambda")?,
            },
        };

        Ok(Self {
            family,
            parameters,
            units: None,
            shape,
        })
    }

    pub fn normal(mean: f64, std_dev: f64) -> Result<Self, DistributionError> {
        Self::new(Family::Normal, [("mean", mean), ("std_dev", std_dev)])
    }

    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self, DistributionError> {
        Self::new(Family::LogNormal, [("mu", mu), ("sigma", sigma)])
    }

    pub fn uniform(min: f64, max: f64) -> Result<Self, DistributionError> {
        Self::new(Family::Uniform, [("min", min), ("max", max)])
    }

    pub fn exponential(rate: f64) -> Result<Self, DistributionError> {
        Self::new(Family::Exponential, [("rate", rate)])
    }

    pub fn gamma(shape: f64, scale: f64) -> Result<Self, DistributionError> {
        Self::new(Family::Gamma, [("shape", shape), ("scale", scale)])
    }

    pub fn beta(alpha: f64, beta: f64) -> Result<Self, DistributionError> {
        Self::new(Family::Beta, [("alpha", alpha), ("beta", beta)])
    }

    pub fn weibull(shape: f64, scale: f64) -> Result<Self, DistributionError> {
        Self::new(Family::Weibull, [("shape", shape), ("scale", scale)])
    }

    pub fn poisson(lambda: f64) -> Result<Self, DistributionError> {
        Self::new(Family::Poisson, [("lambda", lambda)])
    }

    /// Beta distribution matched to a target mean and variance.
    ///
    /// Intended for bounded quantities such as readiness factors, where
    /// analysts think in terms of "about 0.75, give or take" rather than
    /// native shape parameters.
    pub fn beta_from_moments(mean: f64, variance: f64) -> Result<Self, DistributionError> {
        let (alpha, beta) = beta_parameters_from_moments(mean, variance)?;
        Self::beta(alpha, beta)
    }

    /// Attach a unit label (e.g. "sorties/day"). Informational only.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    // --- Accessors ---

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn parameters(&self) -> &BTreeMap<String, f64> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Analytic mean of the distribution.
    pub fn mean(&self) -> f64 {
        match self.shape {
            Shape::Normal { mean, .. } => mean,
            Shape::LogNormal { mu, sigma } => (mu + sigma * sigma / 2.0).exp(),
            Shape::Uniform { min, max } => (min + max) / 2.0,
            Shape::Exponential { rate } => 1.0 / rate,
            Shape::Gamma { shape, scale } => shape * scale,
            Shape::Beta { alpha, beta } => alpha / (alpha + beta),
            Shape::Weibull { shape, scale } => scale * gamma(1.0 + 1.0 / shape),
            Shape::Poisson { lambda } => lambda,
        }
    }

    /// Analytic variance of the distribution.
    pub fn variance(&self) -> f64 {
        match self.shape {
            Shape::Normal { std_dev, .. } => std_dev * std_dev,
            Shape::LogNormal { mu, sigma } => {
                let s2 = sigma * sigma;
                (s2.exp() - 1.0) * (2.0 * mu + s2).exp()
            }
            Shape::Uniform { min, max } => (max - min).powi(2) / 12.0,
            Shape::Exponential { rate } => 1.0 / (rate * rate),
            Shape::Gamma { shape, scale } => shape * scale * scale,
            Shape::Beta { alpha, beta } => {
                let sum = alpha + beta;
                alpha * beta / (sum * sum * (sum + 1.0))
            }
            Shape::Weibull { shape, scale } => {
                let g1 = gamma(1.0 + 1.0 / shape);
                let g2 = gamma(1.0 + 2.0 / shape);
                scale * scale * (g2 - g1 * g1)
            }
            Shape::Poisson { lambda } => lambda,
        }
    }

    /// Draw a single variate.
    pub fn sample_one<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistributionError> {
        Ok(sample(self, 1, rng)?[0])
    }

    /// Inverse CDF at `u`. `u` is clamped into the open unit interval so the
    /// result is always finite.
    ///
    /// This is the marginal step of the copula path: correlated uniforms are
    /// pushed through each variable's own quantile function.
    pub fn quantile(&self, u: f64) -> Result<f64, DistributionError> {
        let u = clamp_unit(u);
        let value = match self.shape {
            Shape::Normal { mean, std_dev } => mean + std_dev * standard_normal_quantile(u),
            Shape::LogNormal { mu, sigma } => (mu + sigma * standard_normal_quantile(u)).exp(),
            Shape::Uniform { min, max } => min + u * (max - min),
            Shape::Exponential { rate } => -(1.0 - u).ln() / rate,
            Shape::Gamma { shape, scale } => sd::Gamma::new(shape, 1.0 / scale)
                .map_err(|e| self.evaluation_error(e))?
                .inverse_cdf(u),
            Shape::Beta { alpha, beta } => sd::Beta::new(alpha, beta)
                .map_err(|e| self.evaluation_error(e))?
                .inverse_cdf(u),
            Shape::Weibull { shape, scale } => scale * (-(1.0 - u).ln()).powf(1.0 / shape),
            Shape::Poisson { lambda } => poisson_quantile(lambda, u),
        };
        Ok(value)
    }

    fn evaluation_error(&self, err: impl fmt::Display) -> DistributionError {
        DistributionError::Evaluation {
            family: self.family,
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for DistributionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .family
            .parameter_names()
            .iter()
            .filter_map(|name| self.parameter(name).map(|v| format!("{}={}", name, v)))
            .collect();
        write!(f, "{}({})", self.family, params.join(", "))?;
        if let Some(units) = &self.units {
            write!(f, " [{}]", units)?;
        }
        Ok(())
    }
}

fn invalid(family: Family, parameter: &str, constraint: &str) -> DistributionError {
    DistributionError::InvalidParameter {
        family,
        parameter: parameter.to_string(),
        constraint: constraint.to_string(),
    }
}

/// Draw `count` variates from `spec` using `rng`.
///
/// Identical `(spec, count, rng state)` always yields the identical sequence.
pub fn sample<R: Rng + ?Sized>(
    spec: &DistributionSpec,
    count: usize,
    rng: &mut R,
) -> Result<Vec<f64>, DistributionError> {
    let err = |e: &dyn fmt::Display| spec.evaluation_error(e);
    let values = match spec.shape {
        Shape::Normal { mean, std_dev } => {
            draw(&Normal::new(mean, std_dev).map_err(|e| err(&e))?, count, rng)
        }
        Shape::LogNormal { mu, sigma } => {
            draw(&LogNormal::new(mu, sigma).map_err(|e| err(&e))?, count, rng)
        }
        Shape::Uniform { min, max } => draw(&Uniform::new(min, max), count, rng),
        Shape::Exponential { rate } => draw(&Exp::new(rate).map_err(|e| err(&e))?, count, rng),
        Shape::Gamma { shape, scale } => {
            draw(&Gamma::new(shape, scale).map_err(|e| err(&e))?, count, rng)
        }
        Shape::Beta { alpha, beta } => {
            draw(&Beta::new(alpha, beta).map_err(|e| err(&e))?, count, rng)
        }
        // rand_distr orders Weibull parameters as (scale, shape).
        Shape::Weibull { shape, scale } => {
            draw(&Weibull::new(scale, shape).map_err(|e| err(&e))?, count, rng)
        }
        Shape::Poisson { lambda } => {
            draw(&Poisson::new(lambda).map_err(|e| err(&e))?, count, rng)
        }
    };
    Ok(values)
}

fn draw<D, R>(dist: &D, count: usize, rng: &mut R) -> Vec<f64>
where
    D: Distribution<f64>,
    R: Rng + ?Sized,
{
    (0..count).map(|_| dist.sample(rng)).collect()
}

/// Method-of-moments beta parameters for a target mean and variance.
///
/// `alpha = mean * k`, `beta = (1 - mean) * k` with
/// `k = mean * (1 - mean) / variance - 1`.
pub fn beta_parameters_from_moments(
    mean: f64,
    variance: f64,
) -> Result<(f64, f64), DistributionError> {
    if !mean.is_finite() || mean <= 0.0 || mean >= 1.0 {
        return Err(invalid(Family::Beta, "mean", "strictly between 0 and 1"));
    }
    if !variance.is_finite() || variance <= 0.0 {
        return Err(invalid(Family::Beta, "variance", "> 0"));
    }
    let k = mean * (1.0 - mean) / variance - 1.0;
    let alpha = mean * k;
    let beta = (1.0 - mean) * k;
    if alpha <= 0.0 || beta <= 0.0 {
        return Err(DistributionError::DegenerateDistribution {
            mean,
            variance,
            alpha,
            beta,
        });
    }
    Ok((alpha, beta))
}

/// Clamp into `[UNIT_INTERVAL_EPSILON, 1 - UNIT_INTERVAL_EPSILON]`.
pub fn clamp_unit(u: f64) -> f64 {
    if u.is_nan() {
        return 0.5;
    }
    u.clamp(UNIT_INTERVAL_EPSILON, 1.0 - UNIT_INTERVAL_EPSILON)
}

/// Standard normal CDF, Φ(x).
pub fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erf::erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal quantile, Φ⁻¹(p), for `p` in (0, 1).
pub fn standard_normal_quantile(p: f64) -> f64 {
    -std::f64::consts::SQRT_2 * erf::erfc_inv(2.0 * p)
}

/// Smallest k with P(X ≤ k) ≥ u.
fn poisson_quantile(lambda: f64, u: f64) -> f64 {
    if lambda > POISSON_NORMAL_APPROX_LAMBDA {
        let approx = lambda + lambda.sqrt() * standard_normal_quantile(u);
        return approx.round().max(0.0);
    }
    let mut k = 0u64;
    let mut pmf = (-lambda).exp();
    let mut cdf = pmf;
    // The tail beyond lambda + 40 sqrt(lambda) carries no representable mass.
    let ceiling = (lambda + 40.0 * lambda.sqrt() + 40.0) as u64;
    while cdf < u && k < ceiling {
        k += 1;
        pmf *= lambda / k as f64;
        cdf += pmf;
    }
    k as f64
}
