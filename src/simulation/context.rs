use crate::core::rng::SeedSequence;
use crate::correlation::copula::CopulaSampler;
use crate::correlation::matrix::CorrelationError;
use crate::scenario::builder::Scenario;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked by the engine between batches.
///
/// Clones share the same flag, so a caller can keep one half and hand the
/// other to the run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Snapshot handed to progress observers after every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub requested: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.requested == 0 {
            return 1.0;
        }
        self.completed as f64 / self.requested as f64
    }
}

pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Everything one run owns besides the scenario: seed derivation, the
/// cancellation token, an optional progress observer and the prepared
/// copula sampler.
///
/// Created for exactly one run and consumed by it.
pub struct SimulationContext {
    seeds: SeedSequence,
    token: CancellationToken,
    progress: Option<ProgressCallback>,
    sampler: Option<CopulaSampler>,
}

impl SimulationContext {
    /// `None` draws a master seed from OS entropy; the run records it.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seeds: SeedSequence::resolve(seed),
            token: CancellationToken::new(),
            progress: None,
            sampler: None,
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn seeds(&self) -> &SeedSequence {
        &self.seeds
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn report(&self, progress: Progress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    /// Reuse a sampler prepared earlier for the same scenario.
    pub fn with_sampler(mut self, sampler: CopulaSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// The copula sampler for `scenario`: the one supplied through
    /// [`with_sampler`](Self::with_sampler) when it fits, otherwise a fresh one.
    pub(crate) fn take_sampler(&mut self, scenario: &Scenario) -> Result<CopulaSampler, CorrelationError> {
        match self.sampler.take() {
            Some(existing) if existing.dim() == scenario.variables().len() => Ok(existing),
            _ => CopulaSampler::new(scenario.correlation(), scenario.copula()),
        }
    }
}

impl fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationContext")
            .field("seeds", &self.seeds)
            .field("cancelled", &self.token.is_cancelled())
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}
