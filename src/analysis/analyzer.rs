use crate::analysis::risk::{AdverseTail, RiskMetrics};
use crate::analysis::sensitivity::{rank_sensitivity, SensitivityEntry, SensitivityMeasure, SensitivityMethod};
use crate::analysis::statistics::{percentiles_sorted, sorted_copy, summarize_sorted, Percentile, SampleSummary};
use crate::core::rng::SeedSource;
use crate::simulation::run::SimulationRun;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("run {0} completed no iterations")]
    EmptyRun(Uuid),
    #[error("run has no output named `{0}`")]
    UnknownOutput(String),
    #[error("output `{0}` has no finite values")]
    NoFiniteValues(String),
    #[error("invalid analyzer configuration: {0}")]
    InvalidConfig(String),
}

/// Analyzer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Percentile levels in [0, 1] reported in summaries and bands.
    pub percentiles: Vec<f64>,
    /// Level for `expected_shortfall` and the `*_at_confidence` figures.
    /// `None` uses the run's own confidence level.
    pub canonical_confidence: Option<f64>,
    pub adverse_tail: AdverseTail,
    pub failure_threshold: Option<f64>,
    pub sensitivity: SensitivityMethod,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            percentiles: vec![0.05, 0.25, 0.50, 0.75, 0.95],
            canonical_confidence: None,
            adverse_tail: AdverseTail::Lower,
            failure_threshold: None,
            sensitivity: SensitivityMethod::Pearson,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if let Some(bad) = self.percentiles.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(AnalysisError::InvalidConfig(format!(
                "percentile {} is outside [0, 1]",
                bad
            )));
        }
        if let Some(c) = self.canonical_confidence {
            if !(c > 0.0 && c < 1.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "canonical confidence {} is outside (0, 1)",
                    c
                )));
            }
        }
        if let Some(t) = self.failure_threshold {
            if !t.is_finite() {
                return Err(AnalysisError::InvalidConfig(
                    "failure threshold must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Numeric conditions that make some metrics meaningless. Reported alongside
/// the result rather than raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degeneracy {
    /// The analysed output never varied; shape and ratio metrics are
    /// undefined.
    ZeroVariance { output: String },
    /// Some iterations produced NaN or infinite values; they were excluded.
    NonFiniteOutputs { output: String, count: usize },
}

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProvenance {
    pub run_id: Uuid,
    pub scenario_id: Uuid,
    pub scenario_name: String,
    pub output: String,
    pub requested_iterations: usize,
    pub completed_iterations: usize,
    pub partial: bool,
    pub confidence_level: f64,
    pub seed: u64,
    pub seed_source: SeedSource,
}

/// Percentile series of one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub output: String,
    pub percentiles: Vec<Percentile>,
}

/// Everything downstream consumers receive about a run. Never includes the
/// raw per-iteration buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub provenance: RunProvenance,
    pub summary: SampleSummary,
    pub risk: RiskMetrics,
    pub sensitivity: Vec<SensitivityEntry>,
    pub percentile_bands: Vec<PercentileBand>,
    pub degeneracies: Vec<Degeneracy>,
}

impl AnalysisResult {
    pub fn is_degenerate(&self) -> bool {
        !self.degeneracies.is_empty()
    }

    pub fn band(&self, output: &str) -> Option<&PercentileBand> {
        self.percentile_bands.iter().find(|b| b.output == output)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.provenance;
        let s = &self.summary;
        writeln!(
            f,
            "{} / {}: {} of {} iterations{}",
            p.scenario_name,
            p.output,
            p.completed_iterations,
            p.requested_iterations,
            if p.partial { " (PARTIAL)" } else { "" }
        )?;
        writeln!(
            f,
            "  mean {:.4}  median {:.4}  std {:.4}  min {:.4}  max {:.4}",
            s.mean, s.median, s.std_dev, s.min, s.max
        )?;
        writeln!(f, "  skewness {}  kurtosis {}", s.skewness, s.kurtosis)?;
        let bands: Vec<String> = s
            .percentiles
            .iter()
            .map(|pct| format!("p{:.0}={:.4}", pct.level * 100.0, pct.value))
            .collect();
        writeln!(f, "  {}", bands.join("  "))?;
        writeln!(f, "  {}", self.risk)?;
        for entry in &self.sensitivity {
            writeln!(f, "  {:>20}  {}", entry.variable, entry.impact)?;
        }
        for d in &self.degeneracies {
            writeln!(f, "  ! {:?}", d)?;
        }
        Ok(())
    }
}

/// Reduces a [`SimulationRun`] to an [`AnalysisResult`].
///
/// Works on partial runs as well; the completed count, not the requested
/// one, is what every statistic is based on.
pub struct ResultAnalyzer {
    config: AnalyzerConfig,
    measure: Box<dyn SensitivityMeasure>,
}

impl Default for ResultAnalyzer {
    fn default() -> Self {
        Self {
            measure: AnalyzerConfig::default().sensitivity.measure(),
            config: AnalyzerConfig::default(),
        }
    }
}

impl fmt::Debug for ResultAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultAnalyzer")
            .field("config", &self.config)
            .field("measure", &self.measure.name())
            .finish()
    }
}

impl ResultAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            measure: config.sensitivity.measure(),
            config,
        })
    }

    /// Replace the configured sensitivity measure.
    pub fn with_measure(mut self, measure: Box<dyn SensitivityMeasure>) -> Self {
        self.measure = measure;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyse the run's primary output.
    pub fn analyze(&self, run: &SimulationRun) -> Result<AnalysisResult, AnalysisError> {
        let primary = run
            .primary_output()
            .ok_or_else(|| AnalysisError::UnknownOutput(String::new()))?;
        self.analyze_output(run, primary)
    }

    pub fn analyze_output(
        &self,
        run: &SimulationRun,
        output: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let idx = run
            .output_index(output)
            .ok_or_else(|| AnalysisError::UnknownOutput(output.to_string()))?;
        if run.is_empty() {
            return Err(AnalysisError::EmptyRun(run.run_id()));
        }

        let mut degeneracies = Vec::new();
        let finite_rows: Vec<usize> = run
            .raw_results()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.outputs[idx].is_finite())
            .map(|(i, _)| i)
            .collect();
        let excluded = run.completed_iterations() - finite_rows.len();
        if excluded > 0 {
            degeneracies.push(Degeneracy::NonFiniteOutputs {
                output: output.to_string(),
                count: excluded,
            });
        }

        let records = run.raw_results();
        let values: Vec<f64> = finite_rows.iter().map(|&i| records[i].outputs[idx]).collect();
        let sorted = sorted_copy(&values);
        let summary = summarize_sorted(&sorted, &self.config.percentiles)
            .ok_or_else(|| AnalysisError::NoFiniteValues(output.to_string()))?;
        if summary.has_zero_variance() {
            degeneracies.push(Degeneracy::ZeroVariance {
                output: output.to_string(),
            });
        }

        let confidence = self
            .config
            .canonical_confidence
            .unwrap_or_else(|| run.confidence_level());
        let risk = RiskMetrics::compute(
            &sorted,
            confidence,
            self.config.adverse_tail,
            self.config.failure_threshold,
        );

        let inputs: Vec<(String, Vec<f64>)> = run
            .variable_names()
            .iter()
            .enumerate()
            .map(|(v, name)| {
                let column = finite_rows.iter().map(|&i| records[i].inputs[v]).collect();
                (name.clone(), column)
            })
            .collect();
        let sensitivity = rank_sensitivity(&inputs, &values, self.measure.as_ref());

        let percentile_bands = run
            .output_names()
            .iter()
            .enumerate()
            .map(|(o, name)| {
                let column: Vec<f64> = records
                    .iter()
                    .map(|r| r.outputs[o])
                    .filter(|x| x.is_finite())
                    .collect();
                PercentileBand {
                    output: name.clone(),
                    percentiles: percentiles_sorted(&sorted_copy(&column), &self.config.percentiles),
                }
            })
            .collect();

        debug!(
            "analyzed '{}' of run {}: {} values, {} degeneracies",
            output,
            run.run_id(),
            summary.count,
            degeneracies.len()
        );

        Ok(AnalysisResult {
            provenance: RunProvenance {
                run_id: run.run_id(),
                scenario_id: run.scenario_id(),
                scenario_name: run.scenario_name().to_string(),
                output: output.to_string(),
                requested_iterations: run.requested_iterations(),
                completed_iterations: run.completed_iterations(),
                partial: run.is_partial(),
                confidence_level: confidence,
                seed: run.seed(),
                seed_source: run.seed_source(),
            },
            summary,
            risk,
            sensitivity,
            percentile_bands,
            degeneracies,
        })
    }
}

/// Analyse `run`'s primary output with the default configuration.
pub fn analyze(run: &SimulationRun) -> Result<AnalysisResult, AnalysisError> {
    ResultAnalyzer::default().analyze(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distribution::DistributionSpec;
    use crate::scenario::archetype::Archetype;
    use crate::scenario::builder::ScenarioBuilder;
    use crate::simulation::engine::SimulationEngine;

    fn run_with<F>(transform: F, iterations: usize) -> SimulationRun
    where
        F: Fn(&crate::scenario::transform::SampleRow<'_>) -> Vec<f64> + Send + Sync + 'static,
    {
        let scenario = ScenarioBuilder::new(Archetype::Direct)
            .variable("x", DistributionSpec::uniform(0.0, 1.0).unwrap())
            .variable("noise", DistributionSpec::normal(0.0, 1.0).unwrap())
            .custom_transform(&["y"], transform)
            .build()
            .unwrap();
        SimulationEngine::default()
            .run(&scenario, iterations, 0.95, Some(11))
            .unwrap()
    }

    #[test]
    fn test_constant_output_flags_zero_variance() {
        let run = run_with(|_| vec![5.0], 200);
        let result = analyze(&run).unwrap();
        assert_eq!(result.summary.std_dev, 0.0);
        assert_eq!(result.summary.skewness, crate::analysis::statistics::MetricValue::Undefined);
        assert!(result.degeneracies.contains(&Degeneracy::ZeroVariance {
            output: "y".to_string()
        }));
        assert_eq!(result.risk.var_95, 5.0);
    }

    #[test]
    fn test_non_finite_outputs_excluded() {
        let run = run_with(
            |row| {
                let x = row.get_or("x", 0.0);
                vec![if x < 0.1 { f64::NAN } else { x }]
            },
            1_000,
        );
        let result = analyze(&run).unwrap();
        let excluded = run
            .output_column("y")
            .unwrap()
            .iter()
            .filter(|v| v.is_nan())
            .count();
        assert!(excluded > 0);
        assert_eq!(result.summary.count, 1_000 - excluded);
        assert!(result.summary.mean.is_finite());
        assert!(matches!(
            result.degeneracies[0],
            Degeneracy::NonFiniteOutputs { count, .. } if count == excluded
        ));
    }

    #[test]
    fn test_all_non_finite_is_error() {
        let run = run_with(|_| vec![f64::INFINITY], 20);
        assert_eq!(
            analyze(&run).unwrap_err(),
            AnalysisError::NoFiniteValues("y".to_string())
        );
    }

    #[test]
    fn test_sensitivity_ranks_driver_first() {
        let run = run_with(|row| vec![10.0 * row.get_or("x", 0.0)], 2_000);
        let result = analyze(&run).unwrap();
        assert_eq!(result.sensitivity[0].variable, "x");
        assert!(result.sensitivity[0].impact.value().unwrap() > 0.99);
    }

    #[test]
    fn test_unknown_output_and_config_validation() {
        let run = run_with(|row| vec![row.get_or("x", 0.0)], 10);
        assert_eq!(
            ResultAnalyzer::default().analyze_output(&run, "z").unwrap_err(),
            AnalysisError::UnknownOutput("z".to_string())
        );
        let bad = AnalyzerConfig {
            percentiles: vec![0.5, 1.5],
            ..Default::default()
        };
        assert!(matches!(ResultAnalyzer::new(bad), Err(AnalysisError::InvalidConfig(_))));
        let bad_conf = AnalyzerConfig {
            canonical_confidence: Some(1.0),
            ..Default::default()
        };
        assert!(bad_conf.validate().is_err());
    }

    #[test]
    fn test_canonical_confidence_override() {
        let run = run_with(|row| vec![row.get_or("x", 0.0)], 1_000);
        let analyzer = ResultAnalyzer::new(AnalyzerConfig {
            canonical_confidence: Some(0.99),
            ..Default::default()
        })
        .unwrap();
        let result = analyzer.analyze(&run).unwrap();
        assert_eq!(result.provenance.confidence_level, 0.99);
        assert_eq!(result.risk.expected_shortfall, result.risk.cvar_99);

        let default_result = analyze(&run).unwrap();
        assert_eq!(default_result.risk.expected_shortfall, default_result.risk.cvar_95);
    }

    #[test]
    fn test_result_serializes_without_raw_buffer() {
        let run = run_with(|row| vec![row.get_or("x", 0.0)], 100);
        let json = analyze(&run).unwrap().to_json().unwrap();
        assert!(json.contains("\"var_95\""));
        assert!(!json.contains("raw_results"));
    }
}
