//! ---
//! eaf_section: "11-simulation"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Scenario injection payloads and the named scenario catalog."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use eaf_msg::{Recommendation, Tick, Urgency};
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Partial tick used as an additive perturbation. Missing fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickDelta {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "temp")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_total_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "pf")]
    pub power_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "tap")]
    pub tap_position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "thd")]
    pub total_harmonic_distortion_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "foamIdx")]
    pub foam_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oxygen_pct: Option<f64>,
}

impl TickDelta {
    pub fn is_empty(&self) -> bool {
        *self == TickDelta::default()
    }

    /// Add every defined field onto `tick`, clamping bounded fields.
    ///
    /// Chemistry deltas are ignored while the tick carries no chemistry
    /// reading. Energy per tonne is left to the caller since it depends on
    /// the charge mass.
    pub fn apply(&self, tick: &mut Tick) {
        if let Some(delta) = self.temperature_c {
            tick.temperature_c += delta;
        }
        if let Some(delta) = self.energy_total_kwh {
            tick.energy_total_kwh = (tick.energy_total_kwh + delta).max(0.0);
        }
        if let Some(delta) = self.power_factor {
            tick.power_factor = (tick.power_factor + delta).clamp(0.0, 1.0);
        }
        if let Some(delta) = self.tap_position {
            tick.tap_position = tick.tap_position.saturating_add(delta).max(0);
        }
        if let Some(delta) = self.total_harmonic_distortion_pct {
            tick.total_harmonic_distortion_pct =
                (tick.total_harmonic_distortion_pct + delta).max(0.0);
        }
        if let Some(delta) = self.foam_index {
            tick.foam_index = (tick.foam_index + delta).clamp(0.0, 1.0);
        }
        if let (Some(value), Some(delta)) = (tick.carbon_pct.as_mut(), self.carbon_pct) {
            *value = (*value + delta).max(0.0);
        }
        if let (Some(value), Some(delta)) = (tick.oxygen_pct.as_mut(), self.oxygen_pct) {
            *value = (*value + delta).max(0.0);
        }
    }
}

/// A named delta applied once by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioInjection {
    pub id: String,
    /// Simulated second from which the delta may apply; `None` means the next tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_at_sim_second: Option<u64>,
    #[serde(default)]
    pub delta: TickDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
}

impl ScenarioInjection {
    pub fn new(id: impl Into<String>, delta: TickDelta) -> Self {
        Self {
            id: id.into(),
            trigger_at_sim_second: None,
            delta,
            recommendation: None,
        }
    }

    pub fn trigger_at(mut self, sim_second: u64) -> Self {
        self.trigger_at_sim_second = Some(sim_second);
        self
    }

    pub fn with_recommendation(mut self, recommendation: Recommendation) -> Self {
        self.recommendation = Some(recommendation);
        self
    }

    pub fn is_due(&self, elapsed_sec: u64) -> bool {
        self.trigger_at_sim_second
            .map_or(true, |trigger| elapsed_sec >= trigger)
    }
}

/// Built-in scenarios offered to demo operators.
pub fn catalog() -> Vec<ScenarioInjection> {
    vec![
        ScenarioInjection::new(
            "energy-spike",
            TickDelta {
                power_factor: Some(-0.08),
                total_harmonic_distortion_pct: Some(1.5),
                foam_index: Some(-0.2),
                ..TickDelta::default()
            },
        )
        .with_recommendation(Recommendation {
            text: "Reduce tap position by two steps and check electrode regulation".into(),
            urgency: Urgency::High,
            time_to_apply: "60s".into(),
        }),
        ScenarioInjection::new(
            "foam-collapse",
            TickDelta {
                foam_index: Some(-0.35),
                total_harmonic_distortion_pct: Some(2.0),
                temperature_c: Some(-15.0),
                ..TickDelta::default()
            },
        )
        .with_recommendation(Recommendation {
            text: "Increase carbon injection to rebuild the slag foam".into(),
            urgency: Urgency::Critical,
            time_to_apply: "15s".into(),
        }),
    ]
}

/// Look up a catalog scenario by id.
pub fn lookup(id: &str) -> Result<ScenarioInjection, SimError> {
    catalog()
        .into_iter()
        .find(|scenario| scenario.id == id)
        .ok_or_else(|| SimError::UnknownScenario(id.to_owned()))
}
