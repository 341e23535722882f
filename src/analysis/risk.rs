use crate::analysis::statistics::{mean, quantile_sorted};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which end of the output distribution is the bad one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdverseTail {
    /// Low outcomes are adverse (capability, effectiveness, returns).
    #[default]
    Lower,
    /// High outcomes are adverse (losses, risk scores, costs).
    Upper,
}

impl AdverseTail {
    /// Quantile level at which VaR for `confidence` is read.
    pub fn quantile_level(&self, confidence: f64) -> f64 {
        match self {
            AdverseTail::Lower => 1.0 - confidence,
            AdverseTail::Upper => confidence,
        }
    }

    /// Whether `value` lies at or beyond `boundary` in the adverse direction.
    pub fn at_or_beyond(&self, value: f64, boundary: f64) -> bool {
        match self {
            AdverseTail::Lower => value <= boundary,
            AdverseTail::Upper => value >= boundary,
        }
    }

    /// Whether `value` lies strictly beyond `boundary` in the adverse
    /// direction.
    pub fn beyond(&self, value: f64, boundary: f64) -> bool {
        match self {
            AdverseTail::Lower => value < boundary,
            AdverseTail::Upper => value > boundary,
        }
    }
}

/// Value at Risk: the outcome at the adverse `confidence` quantile, in output
/// units.
///
/// # Examples
///
/// ```
/// use risk_engine::analysis::risk::{value_at_risk, AdverseTail};
///
/// let sorted: Vec<f64> = (1..=101).map(f64::from).collect();
/// assert!((value_at_risk(&sorted, 0.95, AdverseTail::Lower) - 6.0).abs() < 1e-9);
/// assert_eq!(value_at_risk(&sorted, 0.95, AdverseTail::Upper), 96.0);
/// ```
pub fn value_at_risk(sorted: &[f64], confidence: f64, tail: AdverseTail) -> f64 {
    quantile_sorted(sorted, tail.quantile_level(confidence))
}

/// Conditional VaR: mean of every outcome at or beyond VaR in the adverse
/// direction. Always at least as adverse as VaR itself.
pub fn conditional_value_at_risk(sorted: &[f64], confidence: f64, tail: AdverseTail) -> f64 {
    let var = value_at_risk(sorted, confidence, tail);
    let tail_values: Vec<f64> = match tail {
        AdverseTail::Lower => sorted
            .iter()
            .copied()
            .take_while(|&x| tail.at_or_beyond(x, var))
            .collect(),
        AdverseTail::Upper => sorted
            .iter()
            .rev()
            .copied()
            .take_while(|&x| tail.at_or_beyond(x, var))
            .collect(),
    };
    if tail_values.is_empty() {
        var
    } else {
        mean(&tail_values)
    }
}

/// Fraction of outcomes strictly beyond `threshold` in the adverse direction.
pub fn probability_of_failure(values: &[f64], threshold: f64, tail: AdverseTail) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let failures = values.iter().filter(|&&x| tail.beyond(x, threshold)).count();
    failures as f64 / values.len() as f64
}

/// VaR and CVaR at one confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailRisk {
    pub confidence: f64,
    pub var: f64,
    pub cvar: f64,
}

impl TailRisk {
    pub fn compute(sorted: &[f64], confidence: f64, tail: AdverseTail) -> Self {
        Self {
            confidence,
            var: value_at_risk(sorted, confidence, tail),
            cvar: conditional_value_at_risk(sorted, confidence, tail),
        }
    }
}

/// Tail-risk figures for one output series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub adverse_tail: AdverseTail,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub cvar_99: f64,
    /// The canonical confidence level used for the fields below.
    pub confidence_level: f64,
    pub var_at_confidence: f64,
    pub cvar_at_confidence: f64,
    /// CVaR at the canonical level.
    pub expected_shortfall: f64,
    pub failure_threshold: Option<f64>,
    pub probability_of_failure: Option<f64>,
}

impl RiskMetrics {
    /// `sorted` must be ascending, finite and non-empty.
    pub fn compute(
        sorted: &[f64],
        confidence_level: f64,
        tail: AdverseTail,
        failure_threshold: Option<f64>,
    ) -> Self {
        let at_95 = TailRisk::compute(sorted, 0.95, tail);
        let at_99 = TailRisk::compute(sorted, 0.99, tail);
        let canonical = TailRisk::compute(sorted, confidence_level, tail);
        Self {
            adverse_tail: tail,
            var_95: at_95.var,
            var_99: at_99.var,
            cvar_95: at_95.cvar,
            cvar_99: at_99.cvar,
            confidence_level,
            var_at_confidence: canonical.var,
            cvar_at_confidence: canonical.cvar,
            expected_shortfall: canonical.cvar,
            failure_threshold,
            probability_of_failure: failure_threshold
                .map(|threshold| probability_of_failure(sorted, threshold, tail)),
        }
    }
}

impl fmt::Display for RiskMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VaR95 {:.4} | VaR99 {:.4} | CVaR95 {:.4} | CVaR99 {:.4} | ES@{:.0}% {:.4}",
            self.var_95,
            self.var_99,
            self.cvar_95,
            self.cvar_99,
            self.confidence_level * 100.0,
            self.expected_shortfall
        )?;
        if let (Some(threshold), Some(p)) = (self.failure_threshold, self.probability_of_failure) {
            write!(f, " | P(fail vs {}) {:.2}%", threshold, p * 100.0)?;
        }
        Ok(())
    }
}
