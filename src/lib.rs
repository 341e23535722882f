//! # risk-engine
//!
//! Monte Carlo simulation and risk analytics engine.
//!
//! Given a scenario of uncertain variables (each with its own distribution),
//! optional pairwise correlations and an output formula, the engine samples
//! thousands of correlated iterations and reduces them to summary
//! statistics, percentile bands, VaR/CVaR and a sensitivity ranking.
//!
//! ## Architecture
//!
//! - **core** — Distribution specs, sampling, quantiles and seed derivation
//! - **correlation** — Correlation matrices, nearest-PSD repair, copulas
//! - **scenario** — Archetype catalogue, output transforms, scenario builder
//! - **simulation** — Batched, cancellable, reproducible iteration driver
//! - **analysis** — Summary statistics, tail risk, sensitivity
//!
//! ## Example
//!
//! ```
//! use risk_engine::prelude::*;
//!
//! let scenario = ScenarioBuilder::new(Archetype::Direct)
//!     .name("demand")
//!     .variable("demand", DistributionSpec::normal(100.0, 15.0).unwrap())
//!     .build()
//!     .unwrap();
//!
//! let result = risk_engine::evaluate(&scenario, 10_000, 0.95, Some(42)).unwrap();
//! assert!((result.summary.mean - 100.0).abs() < 1.0);
//! assert!(result.risk.var_95 > 70.0 && result.risk.var_95 < 80.0);
//! ```

pub mod analysis;
pub mod core;
pub mod correlation;
pub mod error;
pub mod scenario;
pub mod simulation;

use crate::analysis::analyzer::{AnalysisResult, ResultAnalyzer};
use crate::error::EngineError;
use crate::scenario::builder::Scenario;
use crate::simulation::engine::SimulationEngine;

/// Run `scenario` with the default engine and analyse its primary output
/// with the default analyzer.
pub fn evaluate(
    scenario: &Scenario,
    iteration_count: usize,
    confidence_level: f64,
    seed: Option<u64>,
) -> Result<AnalysisResult, EngineError> {
    let run = SimulationEngine::default().run(scenario, iteration_count, confidence_level, seed)?;
    Ok(ResultAnalyzer::default().analyze(&run)?)
}

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::analysis::analyzer::{
        analyze, AnalysisError, AnalysisResult, AnalyzerConfig, Degeneracy, ResultAnalyzer,
    };
    pub use crate::analysis::risk::{AdverseTail, RiskMetrics};
    pub use crate::analysis::sensitivity::{SensitivityMeasure, SensitivityMethod};
    pub use crate::analysis::statistics::{MetricValue, SampleSummary};
    pub use crate::core::distribution::{sample, DistributionError, DistributionSpec, Family};
    pub use crate::core::rng::SeedSource;
    pub use crate::correlation::copula::{correlated_samples, Copula};
    pub use crate::correlation::matrix::{
        build_matrix, CorrelationError, CorrelationMatrix, PairwiseCorrelation,
    };
    pub use crate::error::EngineError;
    pub use crate::scenario::archetype::{growth_multiplier, Archetype};
    pub use crate::scenario::builder::{
        build_scenario, Scenario, ScenarioBuilder, ScenarioDefinition, ScenarioError,
        VariableDefinition,
    };
    pub use crate::scenario::transform::{OutputTransform, SampleRow};
    pub use crate::simulation::context::{CancellationToken, Progress, SimulationContext};
    pub use crate::simulation::engine::{EngineConfig, Execution, SimulationEngine, SimulationError};
    pub use crate::simulation::run::{IterationRecord, RunWarning, SimulationRun};
}
