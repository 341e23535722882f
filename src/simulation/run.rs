use crate::core::rng::SeedSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One iteration's sampled inputs and transform outputs, in scenario order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
}

/// Non-fatal conditions noticed while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    HighIterationCount { requested: usize, threshold: usize },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::HighIterationCount {
                requested,
                threshold,
            } => write!(
                f,
                "{} iterations requested (above {}); expect a long run",
                requested, threshold
            ),
        }
    }
}

/// The raw outcome of one simulation.
///
/// Immutable once returned. `raw_results` holds exactly
/// `completed_iterations` records; for a cancelled run that is fewer than
/// requested and `partial` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRun {
    pub(crate) run_id: Uuid,
    pub(crate) scenario_id: Uuid,
    pub(crate) scenario_name: String,
    pub(crate) variable_names: Vec<String>,
    pub(crate) output_names: Vec<String>,
    pub(crate) requested_iterations: usize,
    pub(crate) confidence_level: f64,
    pub(crate) seed: u64,
    pub(crate) seed_source: SeedSource,
    pub(crate) partial: bool,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: DateTime<Utc>,
    pub(crate) warnings: Vec<RunWarning>,
    pub(crate) raw_results: Vec<IterationRecord>,
}

impl SimulationRun {
    // --- Accessors ---

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn scenario_id(&self) -> Uuid {
        self.scenario_id
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn primary_output(&self) -> Option<&str> {
        self.output_names.first().map(String::as_str)
    }

    pub fn requested_iterations(&self) -> usize {
        self.requested_iterations
    }

    pub fn completed_iterations(&self) -> usize {
        self.raw_results.len()
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Master seed; replaying with it reproduces the run exactly.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn seed_source(&self) -> SeedSource {
        self.seed_source
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn warnings(&self) -> &[RunWarning] {
        &self.warnings
    }

    pub fn raw_results(&self) -> &[IterationRecord] {
        &self.raw_results
    }

    pub fn is_empty(&self) -> bool {
        self.raw_results.is_empty()
    }

    // --- Columns ---

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.output_names.iter().position(|n| n == name)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.variable_names.iter().position(|n| n == name)
    }

    /// Every iteration's value of output `name`, in iteration order.
    pub fn output_column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.output_index(name)?;
        Some(self.raw_results.iter().map(|r| r.outputs[idx]).collect())
    }

    /// Every iteration's sampled value of input variable `name`.
    pub fn input_column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.input_index(name)?;
        Some(self.raw_results.iter().map(|r| r.inputs[idx]).collect())
    }
}

impl fmt::Display for SimulationRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {} of '{}': {}/{} iterations{}, seed {} ({:?}), {} ms",
            self.run_id,
            self.scenario_name,
            self.completed_iterations(),
            self.requested_iterations,
            if self.partial { " (partial)" } else { "" },
            self.seed,
            self.seed_source,
            self.elapsed().num_milliseconds()
        )
    }
}
