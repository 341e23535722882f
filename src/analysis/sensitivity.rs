use crate::analysis::statistics::{average_ranks, mean, MetricValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Scores how strongly an input variable drives an output.
///
/// Implement this to plug a custom measure into
/// [`ResultAnalyzer::with_measure`](crate::analysis::analyzer::ResultAnalyzer::with_measure).
pub trait SensitivityMeasure: Send + Sync {
    fn name(&self) -> &str;

    /// Impact of `input` on `output` (equal-length, paired samples).
    /// `Undefined` when either series has no spread.
    fn measure(&self, input: &[f64], output: &[f64]) -> MetricValue;
}

/// Linear (product-moment) correlation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pearson;

/// Rank correlation; captures monotonic but non-linear influence.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spearman;

impl SensitivityMeasure for Pearson {
    fn name(&self) -> &str {
        "pearson"
    }

    fn measure(&self, input: &[f64], output: &[f64]) -> MetricValue {
        pearson(input, output)
    }
}

impl SensitivityMeasure for Spearman {
    fn name(&self) -> &str {
        "spearman"
    }

    fn measure(&self, input: &[f64], output: &[f64]) -> MetricValue {
        pearson(&average_ranks(input), &average_ranks(output))
    }
}

/// Built-in measures, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityMethod {
    #[default]
    Pearson,
    Spearman,
}

impl SensitivityMethod {
    pub fn measure(&self) -> Box<dyn SensitivityMeasure> {
        match self {
            SensitivityMethod::Pearson => Box::new(Pearson),
            SensitivityMethod::Spearman => Box::new(Spearman),
        }
    }
}

fn pearson(x: &[f64], y: &[f64]) -> MetricValue {
    let n = x.len().min(y.len());
    if n < 2 {
        return MetricValue::Undefined;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let (mx, my) = (mean(x), mean(y));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return MetricValue::Undefined;
    }
    MetricValue::from_finite((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// One input's influence on the analysed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityEntry {
    pub variable: String,
    pub impact: MetricValue,
    pub method: String,
}

/// Score every input against `output` and sort by descending |impact|.
/// Entries whose impact is undefined go last, in input order.
pub fn rank_sensitivity(
    inputs: &[(String, Vec<f64>)],
    output: &[f64],
    measure: &dyn SensitivityMeasure,
) -> Vec<SensitivityEntry> {
    let mut entries: Vec<SensitivityEntry> = inputs
        .iter()
        .map(|(name, column)| SensitivityEntry {
            variable: name.clone(),
            impact: measure.measure(column, output),
            method: measure.name().to_string(),
        })
        .collect();

    entries.sort_by(|a, b| match (a.impact.value(), b.impact.value()) {
        (Some(x), Some(y)) => y.abs().partial_cmp(&x.abs()).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pearson_perfect_and_inverse() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(Pearson.measure(&x, &[2.0, 4.0, 6.0, 8.0]).value().unwrap(), 1.0);
        assert_relative_eq!(Pearson.measure(&x, &[4.0, 3.0, 2.0, 1.0]).value().unwrap(), -1.0);
    }

    #[test]
    fn test_spearman_sees_monotonic_relationship() {
        let x: Vec<f64> = (1..=20).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| v.powi(5)).collect();
        assert_relative_eq!(Spearman.measure(&x, &y).value().unwrap(), 1.0, epsilon = 1e-12);
        assert!(Pearson.measure(&x, &y).value().unwrap() < 1.0);
    }

    #[test]
    fn test_constant_series_is_undefined() {
        assert_eq!(Pearson.measure(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), MetricValue::Undefined);
        assert_eq!(Spearman.measure(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]), MetricValue::Undefined);
        assert_eq!(Pearson.measure(&[1.0], &[1.0]), MetricValue::Undefined);
    }

    #[test]
    fn test_ranking_order() {
        let output = [1.0, 2.0, 3.0, 4.0, 5.0];
        let inputs = vec![
            ("flat".to_string(), vec![3.0; 5]),
            ("weak".to_string(), vec![2.0, 1.0, 3.0, 5.0, 4.0]),
            ("inverse".to_string(), vec![5.0, 4.0, 3.0, 2.0, 1.0]),
        ];
        let ranked = rank_sensitivity(&inputs, &output, &Pearson);
        let order: Vec<&str> = ranked.iter().map(|e| e.variable.as_str()).collect();
        assert_eq!(order, vec!["inverse", "weak", "flat"]);
        assert_eq!(ranked[0].method, "pearson");
        assert_eq!(ranked[2].impact, MetricValue::Undefined);
    }

    #[test]
    fn test_method_selects_measure() {
        assert_eq!(SensitivityMethod::Spearman.measure().name(), "spearman");
        assert_eq!(SensitivityMethod::default().measure().name(), "pearson");
    }
}
