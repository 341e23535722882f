use crate::scenario::builder::ScenarioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed catalogue of scenario templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// Every variable is reported as its own output.
    Direct,
    /// `risk_score = likelihood * impact * (1 - mitigation)`.
    RiskAssessment,
    /// Sampled base capability grown linearly over a horizon.
    CapabilityGrowth,
    /// Spread between two sampled returns.
    InvestmentComparison,
    /// Weighted blend of readiness, capability and environment.
    ForceEffectiveness,
}

impl Archetype {
    pub const ALL: [Archetype; 5] = [
        Archetype::Direct,
        Archetype::RiskAssessment,
        Archetype::CapabilityGrowth,
        Archetype::InvestmentComparison,
        Archetype::ForceEffectiveness,
    ];

    pub fn as_str(&self) -> &'static str {
        self.profile().name
    }

    /// Registry entry for this archetype.
    pub fn profile(&self) -> &'static ArchetypeProfile {
        match self {
            Archetype::Direct => &REGISTRY[0],
            Archetype::RiskAssessment => &REGISTRY[1],
            Archetype::CapabilityGrowth => &REGISTRY[2],
            Archetype::InvestmentComparison => &REGISTRY[3],
            Archetype::ForceEffectiveness => &REGISTRY[4],
        }
    }

    pub fn required_variables(&self) -> &'static [&'static str] {
        self.profile().required_variables
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Archetype {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        registry()
            .iter()
            .find(|p| p.name == wanted)
            .map(|p| p.archetype)
            .ok_or_else(|| ScenarioError::UnknownArchetype(s.to_string()))
    }
}

/// What an archetype prescribes: its inputs, tunable parameters and outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchetypeProfile {
    pub archetype: Archetype,
    pub name: &'static str,
    pub description: &'static str,
    pub required_variables: &'static [&'static str],
    pub optional_variables: &'static [&'static str],
    /// Fixed parameters the archetype accepts, with their defaults.
    pub parameters: &'static [(&'static str, f64)],
}

impl ArchetypeProfile {
    pub fn default_parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    pub fn accepts_parameter(&self, name: &str) -> bool {
        self.default_parameter(name).is_some()
    }
}

pub const DEFAULT_HORIZON: f64 = 12.0;
pub const DEFAULT_TERMINAL_MULTIPLIER: f64 = 1.5;
/// Longest capability-growth horizon accepted, in periods. Each period adds
/// one output per iteration.
pub const MAX_HORIZON: f64 = 10_000.0;

static REGISTRY: [ArchetypeProfile; 5] = [
    ArchetypeProfile {
        archetype: Archetype::Direct,
        name: "direct",
        description: "each sampled variable reported unchanged",
        required_variables: &[],
        optional_variables: &[],
        parameters: &[],
    },
    ArchetypeProfile {
        archetype: Archetype::RiskAssessment,
        name: "risk_assessment",
        description: "likelihood times impact, reduced by mitigation",
        required_variables: &["likelihood", "impact"],
        optional_variables: &["mitigation"],
        parameters: &[],
    },
    ArchetypeProfile {
        archetype: Archetype::CapabilityGrowth,
        name: "capability_growth",
        description: "base capability grown linearly to a terminal multiplier",
        required_variables: &["base_capability"],
        optional_variables: &[],
        parameters: &[
            ("horizon", DEFAULT_HORIZON),
            ("terminal_multiplier", DEFAULT_TERMINAL_MULTIPLIER),
        ],
    },
    ArchetypeProfile {
        archetype: Archetype::InvestmentComparison,
        name: "investment_comparison",
        description: "spread between two uncertain returns",
        required_variables: &["return_a", "return_b"],
        optional_variables: &[],
        parameters: &[],
    },
    ArchetypeProfile {
        archetype: Archetype::ForceEffectiveness,
        name: "force_effectiveness",
        description: "normalised weighted sum of readiness, capability and environment",
        required_variables: &["readiness", "capability", "environment"],
        optional_variables: &[],
        parameters: &[
            ("weight_readiness", 0.4),
            ("weight_capability", 0.4),
            ("weight_environment", 0.2),
        ],
    },
];

/// All archetype profiles, in catalogue order.
pub fn registry() -> &'static [ArchetypeProfile] {
    &REGISTRY
}

/// Growth factor for `period_index` on a linear path from 1.0 at period 0 to
/// `terminal_multiplier` at `horizon_length`. Periods past the horizon stay at
/// the terminal value; a zero-length horizon jumps straight to it.
pub fn growth_factor(period_index: usize, horizon_length: usize, terminal_multiplier: f64) -> f64 {
    if horizon_length == 0 {
        return terminal_multiplier;
    }
    let progress = period_index.min(horizon_length) as f64 / horizon_length as f64;
    1.0 + (terminal_multiplier - 1.0) * progress
}

/// `base_value` scaled by [`growth_factor`].
///
/// # Examples
///
/// ```
/// use risk_engine::scenario::archetype::growth_multiplier;
///
/// assert_eq!(growth_multiplier(100.0, 0, 12, 1.5), 100.0);
/// assert_eq!(growth_multiplier(100.0, 6, 12, 1.5), 125.0);
/// assert_eq!(growth_multiplier(100.0, 12, 12, 1.5), 150.0);
/// ```
pub fn growth_multiplier(
    base_value: f64,
    period_index: usize,
    horizon_length: usize,
    terminal_multiplier: f64,
) -> f64 {
    base_value * growth_factor(period_index, horizon_length, terminal_multiplier)
}
