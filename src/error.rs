use crate::analysis::analyzer::AnalysisError;
use crate::core::distribution::DistributionError;
use crate::correlation::matrix::CorrelationError;
use crate::scenario::builder::ScenarioError;
use crate::simulation::engine::SimulationError;
use thiserror::Error;

/// Any error the engine can raise, for callers that drive the whole
/// pipeline and do not care which stage failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl EngineError {
    /// True for malformed inputs (distributions, matrices, scenarios, run
    /// parameters); false for problems found while analysing results.
    pub fn is_specification_error(&self) -> bool {
        !matches!(self, EngineError::Analysis(_))
    }
}
