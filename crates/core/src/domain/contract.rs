use crate::domain::report::Scenario;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Loose shape of the model's JSON response. Both top-level keys are
/// required; absence fails deserialization rather than being coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRiskReport {
    pub scenarios: Vec<LlmScenario>,
    pub narrative: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmScenario {
    pub label: String,
    pub probability: f64,
    pub narrative: String,
}

impl LlmRiskReport {
    /// Strict validation into domain scenarios plus the verbatim narrative.
    /// Probabilities and narrative text are passed through untouched.
    pub fn validate_and_into_parts(self) -> anyhow::Result<(Vec<Scenario>, String)> {
        ensure!(
            !self.scenarios.is_empty(),
            "scenarios must contain at least one entry"
        );
        ensure!(
            !self.narrative.trim().is_empty(),
            "narrative must be non-empty"
        );

        let mut scenarios = Vec::with_capacity(self.scenarios.len());
        for scenario in self.scenarios {
            let label = scenario.label.trim().to_string();
            ensure!(!label.is_empty(), "scenario label must be non-empty");
            ensure!(
                (0.0..=1.0).contains(&scenario.probability),
                "scenario probability must be between 0 and 1 (got {})",
                scenario.probability
            );
            scenarios.push(Scenario {
                label,
                probability: scenario.probability,
                narrative: scenario.narrative,
            });
        }

        Ok((scenarios, self.narrative))
    }
}
