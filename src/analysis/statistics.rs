use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A metric that may be mathematically undefined for the sample at hand
/// (e.g. skewness of a constant series). Never carries NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Defined(f64),
    Undefined,
}

impl MetricValue {
    /// `Defined` when `value` is finite.
    pub fn from_finite(value: f64) -> Self {
        if value.is_finite() {
            MetricValue::Defined(value)
        } else {
            MetricValue::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Defined(v) => write!(f, "{:.4}", v),
            MetricValue::Undefined => f.write_str("undefined"),
        }
    }
}

/// Value at one percentile level (`level` in [0, 1]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentile {
    pub level: f64,
    pub value: f64,
}

/// Descriptive statistics of one output series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Third standardised moment.
    pub skewness: MetricValue,
    /// Excess kurtosis (0 for a normal distribution).
    pub kurtosis: MetricValue,
    /// `std_dev / |mean|`.
    pub coefficient_of_variation: MetricValue,
    /// `mean / std_dev`.
    pub signal_to_noise: MetricValue,
    pub percentiles: Vec<Percentile>,
}

impl SampleSummary {
    pub fn percentile(&self, level: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|p| (p.level - level).abs() < 1e-12)
            .map(|p| p.value)
    }

    pub fn has_zero_variance(&self) -> bool {
        self.std_dev == 0.0
    }
}

/// Copy of `values` in ascending order.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linear interpolation between order statistics, `h = (n - 1) p`.
///
/// `sorted` must be ascending and non-empty; `p` is clamped to [0, 1].
///
/// # Examples
///
/// ```
/// use risk_engine::analysis::statistics::quantile_sorted;
///
/// let data = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(quantile_sorted(&data, 0.5), 3.0);
/// assert_eq!(quantile_sorted(&data, 0.125), 1.5);
/// ```
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Summarise an ascending, finite, non-empty sample. `None` if empty.
pub fn summarize_sorted(sorted: &[f64], percentile_levels: &[f64]) -> Option<SampleSummary> {
    let (&min, &max) = (sorted.first()?, sorted.last()?);
    let n = sorted.len() as f64;
    let mean = mean(sorted);

    // A constant series gets exactly zero spread, not rounding noise.
    let (m2, m3, m4) = if min == max {
        (0.0, 0.0, 0.0)
    } else {
        sorted.iter().fold((0.0, 0.0, 0.0), |(a, b, c), &x| {
            let d = x - mean;
            let d2 = d * d;
            (a + d2, b + d2 * d, c + d2 * d2)
        })
    };
    let variance = m2 / n;
    let std_dev = variance.sqrt();

    let (skewness, kurtosis, signal_to_noise) = if std_dev > 0.0 {
        (
            MetricValue::from_finite((m3 / n) / (variance * std_dev)),
            MetricValue::from_finite((m4 / n) / (variance * variance) - 3.0),
            MetricValue::from_finite(mean / std_dev),
        )
    } else {
        (MetricValue::Undefined, MetricValue::Undefined, MetricValue::Undefined)
    };
    let coefficient_of_variation = if mean != 0.0 {
        MetricValue::from_finite(std_dev / mean.abs())
    } else {
        MetricValue::Undefined
    };

    Some(SampleSummary {
        count: sorted.len(),
        mean,
        median: quantile_sorted(sorted, 0.5),
        std_dev,
        min,
        max,
        skewness,
        kurtosis,
        coefficient_of_variation,
        signal_to_noise,
        percentiles: percentiles_sorted(sorted, percentile_levels),
    })
}

/// Summarise an unordered sample; non-finite values must already be removed.
pub fn summarize(values: &[f64], percentile_levels: &[f64]) -> Option<SampleSummary> {
    summarize_sorted(&sorted_copy(values), percentile_levels)
}

pub fn percentiles_sorted(sorted: &[f64], levels: &[f64]) -> Vec<Percentile> {
    if sorted.is_empty() {
        return Vec::new();
    }
    levels
        .iter()
        .map(|&level| Percentile {
            level,
            value: quantile_sorted(sorted, level),
        })
        .collect()
}

/// Average (1-based) ranks; ties share the mean of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile_interpolates() {
        let data = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(quantile_sorted(&data, 0.0), 10.0);
        assert_eq!(quantile_sorted(&data, 1.0), 40.0);
        assert_relative_eq!(quantile_sorted(&data, 0.5), 25.0);
        assert_relative_eq!(quantile_sorted(&data, 0.25), 17.5);
        assert_eq!(quantile_sorted(&[3.0], 0.9), 3.0);
    }

    #[test]
    fn test_summary_moments() {
        let s = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], &[0.5]).unwrap();
        assert_eq!(s.count, 8);
        assert_relative_eq!(s.mean, 5.0);
        assert_relative_eq!(s.std_dev, 2.0);
        assert_relative_eq!(s.median, 4.5);
        assert_eq!((s.min, s.max), (2.0, 9.0));
        assert_eq!(s.percentile(0.5), Some(4.5));
        assert_relative_eq!(s.coefficient_of_variation.value().unwrap(), 0.4);
        assert_relative_eq!(s.signal_to_noise.value().unwrap(), 2.5);
        // third central moment 42/8, / 2^3
        assert_relative_eq!(s.skewness.value().unwrap(), 0.65625, epsilon = 1e-12);
    }

    #[test]
    fn test_symmetric_sample_has_zero_skew() {
        let s = summarize(&[-2.0, -1.0, 0.0, 1.0, 2.0], &[]).unwrap();
        assert_relative_eq!(s.skewness.value().unwrap(), 0.0, epsilon = 1e-12);
        // m4/m2^2 = 6.8/4 = 1.7
        assert_relative_eq!(s.kurtosis.value().unwrap(), 1.7 - 3.0, epsilon = 1e-12);
        assert_eq!(s.coefficient_of_variation, MetricValue::Undefined);
    }

    #[test]
    fn test_constant_sample_is_undefined_not_nan() {
        let s = summarize(&vec![0.1; 1_000], &[0.05, 0.95]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert!(s.has_zero_variance());
        assert_eq!(s.skewness, MetricValue::Undefined);
        assert_eq!(s.kurtosis, MetricValue::Undefined);
        assert_eq!(s.signal_to_noise, MetricValue::Undefined);
        assert!(s.coefficient_of_variation.is_defined());
    }

    #[test]
    fn test_empty_sample() {
        assert!(summarize(&[], &[0.5]).is_none());
        assert!(percentiles_sorted(&[], &[0.5]).is_empty());
    }

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[10.0, 30.0, 20.0, 30.0]), vec![1.0, 3.5, 2.0, 3.5]);
    }

    #[test]
    fn test_metric_value_display() {
        assert_eq!(MetricValue::Defined(1.5).to_string(), "1.5000");
        assert_eq!(MetricValue::Undefined.to_string(), "undefined");
        assert_eq!(MetricValue::from_finite(f64::NAN), MetricValue::Undefined);
    }
}
