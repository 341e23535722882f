use crate::scenario::archetype::growth_multiplier;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied transform: one sampled row in, one value per declared
/// output out.
pub type TransformFn = dyn Fn(&SampleRow<'_>) -> Vec<f64> + Send + Sync;

/// One iteration's sampled inputs, addressable by variable name.
#[derive(Debug, Clone, Copy)]
pub struct SampleRow<'a> {
    names: &'a [String],
    values: &'a [f64],
}

impl<'a> SampleRow<'a> {
    pub fn new(names: &'a [String], values: &'a [f64]) -> Self {
        Self { names, values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// Value of `name`, or `fallback` when the scenario has no such variable.
    pub fn get_or(&self, name: &str, fallback: f64) -> f64 {
        self.get(name).unwrap_or(fallback)
    }

    pub fn names(&self) -> &'a [String] {
        self.names
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Deterministic mapping from a sampled row to the scenario's outputs.
///
/// Built-in variants hold variable positions resolved when the scenario is
/// built, so evaluation never looks names up.
#[derive(Clone)]
pub enum OutputTransform {
    Passthrough {
        names: Vec<String>,
    },
    RiskScore {
        likelihood: usize,
        impact: usize,
        mitigation: Option<usize>,
    },
    CapabilityGrowth {
        base: usize,
        horizon: usize,
        terminal_multiplier: f64,
    },
    ReturnSpread {
        return_a: usize,
        return_b: usize,
    },
    WeightedSum {
        output: String,
        /// (variable position, normalised weight)
        terms: Vec<(usize, f64)>,
    },
    Custom {
        outputs: Vec<String>,
        function: Arc<TransformFn>,
    },
}

impl OutputTransform {
    pub fn custom<S, F>(outputs: &[S], function: F) -> Self
    where
        S: AsRef<str>,
        F: Fn(&SampleRow<'_>) -> Vec<f64> + Send + Sync + 'static,
    {
        OutputTransform::Custom {
            outputs: outputs.iter().map(|s| s.as_ref().to_string()).collect(),
            function: Arc::new(function),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutputTransform::Passthrough { .. } => "passthrough",
            OutputTransform::RiskScore { .. } => "risk_score",
            OutputTransform::CapabilityGrowth { .. } => "capability_growth",
            OutputTransform::ReturnSpread { .. } => "return_spread",
            OutputTransform::WeightedSum { .. } => "weighted_sum",
            OutputTransform::Custom { .. } => "custom",
        }
    }

    /// Output names in emission order. The first is the primary output.
    pub fn output_names(&self) -> Vec<String> {
        match self {
            OutputTransform::Passthrough { names } => names.clone(),
            OutputTransform::RiskScore { .. } => vec!["risk_score".to_string()],
            OutputTransform::CapabilityGrowth { horizon, .. } => {
                let width = horizon.to_string().len().max(2);
                std::iter::once("terminal_capability".to_string())
                    .chain((1..=*horizon).map(|p| format!("capability_p{:0width$}", p, width = width)))
                    .collect()
            }
            OutputTransform::ReturnSpread { .. } => vec![
                "return_spread".to_string(),
                "return_a".to_string(),
                "return_b".to_string(),
            ],
            OutputTransform::WeightedSum { output, .. } => vec![output.clone()],
            OutputTransform::Custom { outputs, .. } => outputs.clone(),
        }
    }

    pub fn output_count(&self) -> usize {
        match self {
            OutputTransform::Passthrough { names } => names.len(),
            OutputTransform::CapabilityGrowth { horizon, .. } => horizon + 1,
            OutputTransform::ReturnSpread { .. } => 3,
            OutputTransform::Custom { outputs, .. } => outputs.len(),
            OutputTransform::RiskScore { .. } | OutputTransform::WeightedSum { .. } => 1,
        }
    }

    pub fn apply(&self, row: &SampleRow<'_>) -> Vec<f64> {
        let v = row.values();
        match self {
            OutputTransform::Passthrough { .. } => v.to_vec(),
            OutputTransform::RiskScore {
                likelihood,
                impact,
                mitigation,
            } => {
                let mitigation = mitigation.map_or(0.0, |m| v[m]);
                vec![v[*likelihood] * v[*impact] * (1.0 - mitigation)]
            }
            OutputTransform::CapabilityGrowth {
                base,
                horizon,
                terminal_multiplier,
            } => {
                let base = v[*base];
                std::iter::once(growth_multiplier(base, *horizon, *horizon, *terminal_multiplier))
                    .chain(
                        (1..=*horizon)
                            .map(|p| growth_multiplier(base, p, *horizon, *terminal_multiplier)),
                    )
                    .collect()
            }
            OutputTransform::ReturnSpread { return_a, return_b } => {
                let (a, b) = (v[*return_a], v[*return_b]);
                vec![a - b, a, b]
            }
            OutputTransform::WeightedSum { terms, .. } => {
                vec![terms.iter().map(|(i, w)| w * v[*i]).sum()]
            }
            OutputTransform::Custom { function, .. } => function(row),
        }
    }
}

impl fmt::Debug for OutputTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTransform::Custom { outputs, .. } => f
                .debug_struct("Custom")
                .field("outputs", outputs)
                .finish_non_exhaustive(),
            OutputTransform::Passthrough { names } => {
                f.debug_struct("Passthrough").field("names", names).finish()
            }
            OutputTransform::RiskScore {
                likelihood,
                impact,
                mitigation,
            } => f
                .debug_struct("RiskScore")
                .field("likelihood", likelihood)
                .field("impact", impact)
                .field("mitigation", mitigation)
                .finish(),
            OutputTransform::CapabilityGrowth {
                base,
                horizon,
                terminal_multiplier,
            } => f
                .debug_struct("CapabilityGrowth")
                .field("base", base)
                .field("horizon", horizon)
                .field("terminal_multiplier", terminal_multiplier)
                .finish(),
            OutputTransform::ReturnSpread { return_a, return_b } => f
                .debug_struct("ReturnSpread")
                .field("return_a", return_a)
                .field("return_b", return_b)
                .finish(),
            OutputTransform::WeightedSum { output, terms } => f
                .debug_struct("WeightedSum")
                .field("output", output)
                .field("terms", terms)
                .finish(),
        }
    }
}
