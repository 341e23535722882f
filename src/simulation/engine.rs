use crate::core::distribution::DistributionError;
use crate::core::rng::SeedSequence;
use crate::correlation::copula::CopulaSampler;
use crate::correlation::matrix::CorrelationError;
use crate::scenario::builder::Scenario;
use crate::simulation::context::{Progress, SimulationContext};
use crate::simulation::run::{IterationRecord, RunWarning, SimulationRun};
use chrono::Utc;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that stop a run before (or instead of) producing results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("iteration count must be at least 1, got {0}")]
    InvalidIterationCount(usize),
    #[error("confidence level must be strictly between 0 and 1, got {0}")]
    InvalidConfidenceLevel(f64),
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
    #[error("transform produced {got} outputs, expected {expected}")]
    TransformOutputMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

/// How iterations are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    /// Parallel from `parallel_threshold` iterations upward.
    #[default]
    Auto,
    Sequential,
    Parallel,
}

/// Tunables for [`SimulationEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requests above this many iterations get a performance warning.
    pub high_iteration_warning: usize,
    /// Iterations per batch; cancellation and progress are checked between
    /// batches.
    pub batch_size: usize,
    pub execution: Execution,
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_iteration_warning: 100_000,
            batch_size: 10_000,
            execution: Execution::Auto,
            parallel_threshold: 20_000,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.batch_size == 0 {
            return Err(SimulationError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn runs_parallel(&self, iteration_count: usize) -> bool {
        match self.execution {
            Execution::Auto => iteration_count >= self.parallel_threshold,
            Execution::Sequential => false,
            Execution::Parallel => true,
        }
    }
}

/// Drives Monte Carlo iterations over a [`Scenario`].
///
/// Iteration `i` draws from its own random stream derived from the master
/// seed and `i`, so a seeded run produces the same records sequentially, in
/// parallel, and for any batch size or thread count.
///
/// # Examples
///
/// ```
/// use risk_engine::core::distribution::DistributionSpec;
/// use risk_engine::scenario::archetype::Archetype;
/// use risk_engine::scenario::builder::ScenarioBuilder;
/// use risk_engine::simulation::engine::SimulationEngine;
///
/// let scenario = ScenarioBuilder::new(Archetype::Direct)
///     .variable("demand", DistributionSpec::normal(100.0, 15.0).unwrap())
///     .build()
///     .unwrap();
///
/// let run = SimulationEngine::default()
///     .run(&scenario, 1_000, 0.95, Some(42))
///     .unwrap();
/// assert_eq!(run.completed_iterations(), 1_000);
/// assert!(!run.is_partial());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimulationEngine {
    config: EngineConfig,
}

impl SimulationEngine {
    pub fn new(config: EngineConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `iteration_count` iterations with a fresh context. `seed: None`
    /// draws one from entropy and records it on the run.
    pub fn run(
        &self,
        scenario: &Scenario,
        iteration_count: usize,
        confidence_level: f64,
        seed: Option<u64>,
    ) -> Result<SimulationRun, SimulationError> {
        self.run_with_context(
            scenario,
            iteration_count,
            confidence_level,
            SimulationContext::new(seed),
        )
    }

    /// Run with caller-controlled cancellation and progress observation.
    ///
    /// A cancelled run is not an error: it comes back with `partial` set and
    /// only the iterations completed before the token was seen.
    pub fn run_with_context(
        &self,
        scenario: &Scenario,
        iteration_count: usize,
        confidence_level: f64,
        mut context: SimulationContext,
    ) -> Result<SimulationRun, SimulationError> {
        self.config.validate()?;
        if iteration_count == 0 {
            return Err(SimulationError::InvalidIterationCount(iteration_count));
        }
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(SimulationError::InvalidConfidenceLevel(confidence_level));
        }

        let mut warnings = Vec::new();
        if iteration_count > self.config.high_iteration_warning {
            warnings.push(RunWarning::HighIterationCount {
                requested: iteration_count,
                threshold: self.config.high_iteration_warning,
            });
        }

        let sampler = context.take_sampler(scenario)?;
        let seeds = *context.seeds();
        let parallel = self.config.runs_parallel(iteration_count);
        let output_count = scenario.transform().output_count();
        let started_at = Utc::now();

        let iterate = |index: usize| run_iteration(scenario, &sampler, &seeds, output_count, index);

        let mut raw_results: Vec<IterationRecord> = Vec::with_capacity(iteration_count);
        let mut partial = false;
        let mut start = 0;
        while start < iteration_count {
            if context.is_cancelled() {
                partial = true;
                break;
            }
            let end = (start + self.config.batch_size).min(iteration_count);
            let batch: Vec<IterationRecord> = if parallel {
                (start..end)
                    .into_par_iter()
                    .map(iterate)
                    .collect::<Result<_, _>>()?
            } else {
                (start..end).map(iterate).collect::<Result<_, _>>()?
            };
            raw_results.extend(batch);
            start = end;
            context.report(Progress {
                completed: raw_results.len(),
                requested: iteration_count,
            });
        }

        let finished_at = Utc::now();

        Ok(SimulationRun {
            run_id: Uuid::new_v4(),
            scenario_id: scenario.id(),
            scenario_name: scenario.name().to_string(),
            variable_names: scenario.variable_names().to_vec(),
            output_names: scenario.output_names(),
            requested_iterations: iteration_count,
            confidence_level,
            seed: seeds.master(),
            seed_source: seeds.source(),
            partial,
            started_at,
            finished_at,
            warnings,
            raw_results,
        })
    }
}

/// One correlated draw per variable, then the transform.
fn run_iteration(
    scenario: &Scenario,
    sampler: &CopulaSampler,
    seeds: &SeedSequence,
    output_count: usize,
    index: usize,
) -> Result<IterationRecord, SimulationError> {
    let mut rng = seeds.iteration_rng(index as u64);
    let variables = scenario.variables();

    let inputs: Vec<f64> = if sampler.is_independent() {
        variables
            .iter()
            .map(|v| v.distribution.sample_one(&mut rng))
            .collect::<Result<_, _>>()?
    } else {
        let mut uniforms: Vec<f64> = (0..variables.len()).map(|_| rng.gen::<f64>()).collect();
        sampler.transform_row(&mut uniforms, &mut rng)?;
        variables
            .iter()
            .zip(&uniforms)
            .map(|(v, &u)| v.distribution.quantile(u))
            .collect::<Result<_, _>>()?
    };

    let outputs = scenario.evaluate(&inputs);
    if outputs.len() != output_count {
        return Err(SimulationError::TransformOutputMismatch {
            expected: output_count,
            got: outputs.len(),
        });
    }
    Ok(IterationRecord { inputs, outputs })
}
