use crate::core::distribution::{DistributionError, DistributionSpec};
use crate::correlation::copula::Copula;
use crate::correlation::matrix::{build_matrix, CorrelationError, CorrelationMatrix, PairwiseCorrelation};
use crate::scenario::archetype::{Archetype, MAX_HORIZON};
use crate::scenario::transform::{OutputTransform, SampleRow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while assembling a scenario. All are detected before any
/// sampling happens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    #[error("unknown scenario archetype `{0}`")]
    UnknownArchetype(String),
    #[error("archetype {archetype} is missing required variables: {}", .missing.join(", "))]
    MissingVariables {
        archetype: Archetype,
        missing: Vec<String>,
    },
    #[error("variable `{0}` is defined more than once")]
    DuplicateVariable(String),
    #[error("scenario defines no variables")]
    NoVariables,
    #[error("invalid scenario parameter `{parameter}`: {reason}")]
    InvalidParameter { parameter: String, reason: String },
    #[error("invalid distribution: {0}")]
    Distribution(#[from] DistributionError),
    #[error("invalid correlation: {0}")]
    Correlation(#[from] CorrelationError),
}

/// A named uncertain input and its distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    pub distribution: DistributionSpec,
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>, distribution: DistributionSpec) -> Self {
        Self {
            name: name.into(),
            distribution,
        }
    }
}

/// A fully validated, read-only simulation input.
///
/// Variables keep their declaration order; that order indexes the
/// correlation matrix, every [`SampleRow`] and the run's input columns.
#[derive(Debug, Clone)]
pub struct Scenario {
    id: Uuid,
    name: String,
    archetype: Archetype,
    variables: Vec<VariableDefinition>,
    variable_names: Vec<String>,
    parameters: BTreeMap<String, f64>,
    correlation: CorrelationMatrix,
    copula: Copula,
    transform: OutputTransform,
}

impl Scenario {
    // --- Accessors ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// Effective fixed parameters, archetype defaults included.
    pub fn parameters(&self) -> &BTreeMap<String, f64> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn correlation(&self) -> &CorrelationMatrix {
        &self.correlation
    }

    pub fn copula(&self) -> Copula {
        self.copula
    }

    pub fn transform(&self) -> &OutputTransform {
        &self.transform
    }

    pub fn output_names(&self) -> Vec<String> {
        self.transform.output_names()
    }

    /// The output analysed by default.
    pub fn primary_output(&self) -> String {
        self.output_names().into_iter().next().unwrap_or_default()
    }

    /// Run the transform on one row of sampled inputs.
    pub fn evaluate(&self, inputs: &[f64]) -> Vec<f64> {
        self.transform
            .apply(&SampleRow::new(&self.variable_names, inputs))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario '{}' ({}) [{}]", self.name, self.archetype, self.id)?;
        for v in &self.variables {
            writeln!(f, "  {} ~ {}", v.name, v.distribution)?;
        }
        if !self.correlation.is_identity() {
            writeln!(f, "  correlated via {:?} copula", self.copula)?;
        }
        write!(f, "  outputs: {}", self.output_names().join(", "))
    }
}

/// Fluent construction of a [`Scenario`].
///
/// # Examples
///
/// ```
/// use risk_engine::core::distribution::DistributionSpec;
/// use risk_engine::scenario::archetype::Archetype;
/// use risk_engine::scenario::builder::ScenarioBuilder;
///
/// let scenario = ScenarioBuilder::new(Archetype::RiskAssessment)
///     .name("supply disruption")
///     .variable("likelihood", DistributionSpec::beta(2.0, 5.0).unwrap())
///     .variable("impact", DistributionSpec::log_normal(3.0, 0.4).unwrap())
///     .correlation("likelihood", "impact", 0.3)
///     .build()
///     .unwrap();
///
/// assert_eq!(scenario.primary_output(), "risk_score");
/// ```
#[derive(Clone)]
pub struct ScenarioBuilder {
    archetype: Archetype,
    name: Option<String>,
    variables: Vec<VariableDefinition>,
    correlations: Vec<PairwiseCorrelation>,
    parameters: BTreeMap<String, f64>,
    copula: Copula,
    custom: Option<OutputTransform>,
}

impl ScenarioBuilder {
    pub fn new(archetype: Archetype) -> Self {
        Self {
            archetype,
            name: None,
            variables: Vec::new(),
            correlations: Vec::new(),
            parameters: BTreeMap::new(),
            copula: Copula::default(),
            custom: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, distribution: DistributionSpec) -> Self {
        self.variables.push(VariableDefinition::new(name, distribution));
        self
    }

    pub fn variables(mut self, definitions: impl IntoIterator<Item = VariableDefinition>) -> Self {
        self.variables.extend(definitions);
        self
    }

    pub fn correlation(mut self, first: impl Into<String>, second: impl Into<String>, rho: f64) -> Self {
        self.correlations
            .push(PairwiseCorrelation::new(first, second, rho));
        self
    }

    pub fn correlations(mut self, hints: impl IntoIterator<Item = PairwiseCorrelation>) -> Self {
        self.correlations.extend(hints);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn copula(mut self, copula: Copula) -> Self {
        self.copula = copula;
        self
    }

    /// Replace the archetype's transform. Required variables are still
    /// enforced.
    pub fn custom_transform<S, F>(mut self, outputs: &[S], function: F) -> Self
    where
        S: AsRef<str>,
        F: Fn(&SampleRow<'_>) -> Vec<f64> + Send + Sync + 'static,
    {
        self.custom = Some(OutputTransform::custom(outputs, function));
        self
    }

    pub fn build(self) -> Result<Scenario, ScenarioError> {
        let profile = self.archetype.profile();
        if self.variables.is_empty() {
            return Err(ScenarioError::NoVariables);
        }

        let mut seen = HashSet::new();
        for v in &self.variables {
            if !seen.insert(v.name.as_str()) {
                return Err(ScenarioError::DuplicateVariable(v.name.clone()));
            }
        }

        let missing: Vec<String> = profile
            .required_variables
            .iter()
            .filter(|name| !seen.contains(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ScenarioError::MissingVariables {
                archetype: self.archetype,
                missing,
            });
        }

        let mut parameters: BTreeMap<String, f64> = profile
            .parameters
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        for (name, value) in self.parameters {
            if !profile.accepts_parameter(&name) {
                return Err(ScenarioError::InvalidParameter {
                    parameter: name,
                    reason: format!("not accepted by archetype {}", self.archetype),
                });
            }
            if !value.is_finite() {
                return Err(ScenarioError::InvalidParameter {
                    parameter: name,
                    reason: "must be finite".to_string(),
                });
            }
            parameters.insert(name, value);
        }

        self.copula.validate()?;
        let variable_names: Vec<String> = self.variables.iter().map(|v| v.name.clone()).collect();
        let correlation = build_matrix(&variable_names, &self.correlations)?;

        let transform = match self.custom {
            Some(custom) if custom.output_count() == 0 => {
                return Err(ScenarioError::InvalidParameter {
                    parameter: "outputs".to_string(),
                    reason: "custom transform must declare at least one output".to_string(),
                });
            }
            Some(custom) => custom,
            None => archetype_transform(self.archetype, &variable_names, &parameters)?,
        };

        Ok(Scenario {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(|| self.archetype.to_string()),
            archetype: self.archetype,
            variables: self.variables,
            variable_names,
            parameters,
            correlation,
            copula: self.copula,
            transform,
        })
    }
}

fn archetype_transform(
    archetype: Archetype,
    names: &[String],
    parameters: &BTreeMap<String, f64>,
) -> Result<OutputTransform, ScenarioError> {
    // Required variables have already been checked.
    let position = |name: &str| names.iter().position(|n| n == name).unwrap_or(0);
    let param = |name: &str| parameters.get(name).copied().unwrap_or(0.0);

    let transform = match archetype {
        Archetype::Direct => OutputTransform::Passthrough {
            names: names.to_vec(),
        },
        Archetype::RiskAssessment => OutputTransform::RiskScore {
            likelihood: position("likelihood"),
            impact: position("impact"),
            mitigation: names.iter().position(|n| n == "mitigation"),
        },
        Archetype::CapabilityGrowth => {
            let horizon = param("horizon");
            if horizon < 1.0 || horizon.fract() != 0.0 {
                return Err(ScenarioError::InvalidParameter {
                    parameter: "horizon".to_string(),
                    reason: format!("must be a whole number of periods >= 1, got {}", horizon),
                });
            }
            if horizon > MAX_HORIZON {
                return Err(ScenarioError::InvalidParameter {
                    parameter: "horizon".to_string(),
                    reason: format!("must be at most {} periods, got {}", MAX_HORIZON, horizon),
                });
            }
            let terminal_multiplier = param("terminal_multiplier");
            if terminal_multiplier <= 0.0 {
                return Err(ScenarioError::InvalidParameter {
                    parameter: "terminal_multiplier".to_string(),
                    reason: format!("must be > 0, got {}", terminal_multiplier),
                });
            }
            OutputTransform::CapabilityGrowth {
                base: position("base_capability"),
                horizon: horizon as usize,
                terminal_multiplier,
            }
        }
        Archetype::InvestmentComparison => OutputTransform::ReturnSpread {
            return_a: position("return_a"),
            return_b: position("return_b"),
        },
        Archetype::ForceEffectiveness => {
            let weighted = [
                ("readiness", "weight_readiness"),
                ("capability", "weight_capability"),
                ("environment", "weight_environment"),
            ];
            for (_, key) in &weighted {
                if param(key) < 0.0 {
                    return Err(ScenarioError::InvalidParameter {
                        parameter: key.to_string(),
                        reason: "weights must be non-negative".to_string(),
                    });
                }
            }
            let total: f64 = weighted.iter().map(|(_, key)| param(key)).sum();
            if total <= 0.0 {
                return Err(ScenarioError::InvalidParameter {
                    parameter: "weight_*".to_string(),
                    reason: "weights must have a positive sum".to_string(),
                });
            }
            OutputTransform::WeightedSum {
                output: "effectiveness".to_string(),
                terms: weighted
                    .iter()
                    .map(|(var, key)| (position(var), param(key) / total))
                    .collect(),
            }
        }
    };
    Ok(transform)
}

/// Contract entry point: resolve `archetype` by name and build a scenario
/// from plain definitions and optional correlation hints.
pub fn build_scenario(
    archetype: &str,
    variable_definitions: Vec<VariableDefinition>,
    correlation_hints: &[PairwiseCorrelation],
) -> Result<Scenario, ScenarioError> {
    let archetype: Archetype = archetype.parse()?;
    ScenarioBuilder::new(archetype)
        .variables(variable_definitions)
        .correlations(correlation_hints.iter().cloned())
        .build()
}

/// Serializable scenario description, for scenarios authored as data.
///
/// Custom transforms cannot be expressed here; use [`ScenarioBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub archetype: String,
    pub variables: Vec<VariableDefinition>,
    #[serde(default)]
    pub correlations: Vec<PairwiseCorrelation>,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub copula: Copula,
}

impl ScenarioDefinition {
    pub fn build(self) -> Result<Scenario, ScenarioError> {
        let archetype: Archetype = self.archetype.parse()?;
        let mut builder = ScenarioBuilder::new(archetype)
            .variables(self.variables)
            .correlations(self.correlations)
            .copula(self.copula);
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        for (key, value) in self.parameters {
            builder = builder.parameter(key, value);
        }
        builder.build()
    }
}

impl TryFrom<ScenarioDefinition> for Scenario {
    type Error = ScenarioError;

    fn try_from(definition: ScenarioDefinition) -> Result<Self, Self::Error> {
        definition.build()
    }
}
