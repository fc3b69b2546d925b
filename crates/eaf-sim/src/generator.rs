//! ---
//! eaf_section: "11-simulation"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Seeded heat generator advancing one simulated second per tick."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use eaf_common::SimulationConfig;
use eaf_msg::{GeneratorStatus, Recommendation, Stage, Tick};
use tracing::{debug, info};

use crate::jitter::SeededJitter;
use crate::scenario::ScenarioInjection;
use crate::SimError;

/// Default charge mass used for energy-per-tonne.
pub const MASS_TONNES: f64 = 85.0;

const PF_BASE: f64 = 0.85;
const PF_JITTER: f64 = 0.03;
const FOAM_JITTER: f64 = 0.05;
const FOAM_THD_COUPLING: f64 = 0.08;
const TEMP_JITTER: f64 = 3.0;
const AMBIENT_C: f64 = 25.0;
const BORE_IN_END_C: f64 = 505.0;
const MELT_END_C: f64 = 1_600.0;
const REFINE_END_C: f64 = 1_660.0;
const TAP_FLOOR_C: f64 = 1_550.0;

/// Fixed stage thresholds and charge mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    pub mass_tonnes: f64,
    pub bore_in_until_sec: u64,
    pub melt_until_sec: u64,
    pub refine_until_sec: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            mass_tonnes: MASS_TONNES,
            bore_in_until_sec: 120,
            melt_until_sec: 900,
            refine_until_sec: 1_500,
        }
    }
}

impl From<&SimulationConfig> for GeneratorConfig {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            mass_tonnes: config.mass_tonnes,
            bore_in_until_sec: config.bore_in_until_sec,
            melt_until_sec: config.melt_until_sec,
            refine_until_sec: config.refine_until_sec,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.mass_tonnes.is_finite() || self.mass_tonnes <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "mass_tonnes must be positive, got {}",
                self.mass_tonnes
            )));
        }
        if self.bore_in_until_sec == 0
            || self.bore_in_until_sec >= self.melt_until_sec
            || self.melt_until_sec >= self.refine_until_sec
        {
            return Err(SimError::InvalidConfig(format!(
                "stage thresholds must be strictly increasing, got {}/{}/{}",
                self.bore_in_until_sec, self.melt_until_sec, self.refine_until_sec
            )));
        }
        Ok(())
    }

    /// Stage implied by the elapsed simulated time alone.
    pub fn stage_at(&self, elapsed_sec: u64) -> Stage {
        if elapsed_sec < self.bore_in_until_sec {
            Stage::Bor
        } else if elapsed_sec < self.melt_until_sec {
            Stage::Melt
        } else if elapsed_sec < self.refine_until_sec {
            Stage::Refine
        } else {
            Stage::Tap
        }
    }

    fn progress(elapsed_sec: u64, start: u64, end: u64) -> f64 {
        let span = end.saturating_sub(start).max(1) as f64;
        (elapsed_sec.saturating_sub(start) as f64 / span).clamp(0.0, 1.0)
    }

    fn base_temperature(&self, stage: Stage, elapsed_sec: u64) -> f64 {
        match stage {
            Stage::Bor => {
                let p = Self::progress(elapsed_sec, 0, self.bore_in_until_sec);
                AMBIENT_C + (BORE_IN_END_C - AMBIENT_C) * p
            }
            Stage::Melt => {
                let p = Self::progress(elapsed_sec, self.bore_in_until_sec, self.melt_until_sec);
                BORE_IN_END_C + (MELT_END_C - BORE_IN_END_C) * p
            }
            Stage::Refine => {
                let p = Self::progress(elapsed_sec, self.melt_until_sec, self.refine_until_sec);
                MELT_END_C + (REFINE_END_C - MELT_END_C) * p
            }
            Stage::Tap => {
                let since = elapsed_sec.saturating_sub(self.refine_until_sec) as f64;
                (REFINE_END_C - 0.05 * since).max(TAP_FLOOR_C)
            }
        }
    }
}

/// Per-stage electrical and slag baselines.
struct StageProfile {
    power_mw: f64,
    tap_position: i32,
    thd_pct: f64,
    foam_index: f64,
}

impl StageProfile {
    fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Bor => Self { power_mw: 45.0, tap_position: 12, thd_pct: 6.5, foam_index: 0.35 },
            Stage::Melt => Self { power_mw: 62.0, tap_position: 14, thd_pct: 4.8, foam_index: 0.6 },
            Stage::Refine => Self { power_mw: 38.0, tap_position: 10, thd_pct: 3.2, foam_index: 0.75 },
            Stage::Tap => Self { power_mw: 5.0, tap_position: 6, thd_pct: 2.0, foam_index: 0.4 },
        }
    }
}

/// Side effect of a scenario delta landing on a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioApplied {
    pub id: String,
    pub sim_second: u64,
    pub recommendation: Option<Recommendation>,
}

#[derive(Debug, Clone)]
struct PendingScenario {
    injection: ScenarioInjection,
    applied: bool,
}

/// Deterministic furnace heat generator.
///
/// All randomness comes from one seeded source consumed a fixed number of
/// times per tick, so the sequence depends only on the seed, epoch and
/// configuration.
#[derive(Debug, Clone)]
pub struct HeatGenerator {
    seed: u64,
    epoch_ms: i64,
    config: GeneratorConfig,
    jitter: SeededJitter,
    elapsed_sec: u64,
    energy_kwh: f64,
    stage: Stage,
    scenario: Option<PendingScenario>,
    notifications: Vec<ScenarioApplied>,
    last_tick: Option<Tick>,
}

impl HeatGenerator {
    /// Generator with default thresholds and epoch 0.
    pub fn new(seed: u64) -> Self {
        Self::build(seed, 0, GeneratorConfig::default())
    }

    /// Generator with explicit epoch and configuration.
    pub fn with_config(seed: u64, epoch_ms: i64, config: GeneratorConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self::build(seed, epoch_ms, config))
    }

    fn build(seed: u64, epoch_ms: i64, config: GeneratorConfig) -> Self {
        Self {
            seed,
            epoch_ms,
            config,
            jitter: SeededJitter::new(seed),
            elapsed_sec: 0,
            energy_kwh: 0.0,
            stage: Stage::Bor,
            scenario: None,
            notifications: Vec::new(),
            last_tick: None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn epoch_ms(&self) -> i64 {
        self.epoch_ms
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn last_tick(&self) -> Option<&Tick> {
        self.last_tick.as_ref()
    }

    pub fn status(&self) -> GeneratorStatus {
        GeneratorStatus {
            elapsed_sec: self.elapsed_sec,
            stage: self.stage,
            total_energy_kwh: self.energy_kwh,
        }
    }

    /// Return to the freshly constructed state for the same seed and epoch.
    pub fn reset(&mut self) {
        *self = Self::build(self.seed, self.epoch_ms, self.config);
        debug!(seed = self.seed, "generator reset");
    }

    /// Reset onto a new seed and epoch.
    pub fn reseed(&mut self, seed: u64, epoch_ms: i64) {
        *self = Self::build(seed, epoch_ms, self.config);
        debug!(seed, epoch_ms, "generator reseeded");
    }

    /// Store `injection` as the pending scenario, replacing any previous one.
    pub fn inject_scenario(&mut self, injection: ScenarioInjection) {
        info!(
            scenario = %injection.id,
            trigger_at = ?injection.trigger_at_sim_second,
            elapsed_sec = self.elapsed_sec,
            "scenario armed"
        );
        self.scenario = Some(PendingScenario {
            injection,
            applied: false,
        });
    }

    pub fn clear_scenario(&mut self) {
        if let Some(previous) = self.scenario.take() {
            debug!(scenario = %previous.injection.id, applied = previous.applied, "scenario cleared");
        }
    }

    /// Currently armed scenario and whether it has fired.
    pub fn pending_scenario(&self) -> Option<(&ScenarioInjection, bool)> {
        self.scenario
            .as_ref()
            .map(|pending| (&pending.injection, pending.applied))
    }

    /// Drain scenario notifications produced since the last call.
    pub fn take_notifications(&mut self) -> Vec<ScenarioApplied> {
        std::mem::take(&mut self.notifications)
    }

    /// Advance one simulated second.
    pub fn tick(&mut self) -> Result<Tick, SimError> {
        self.elapsed_sec += 1;
        let elapsed = self.elapsed_sec;

        let mut note = None;
        if self.config.stage_at(elapsed) > self.stage {
            if let Some(next) = self.stage.next() {
                note = Some(format!("stage {} -> {}", self.stage, next));
                info!(from = %self.stage, to = %next, elapsed_sec = elapsed, "stage transition");
                self.stage = next;
            }
        }
        let stage = self.stage;
        let profile = StageProfile::for_stage(stage);

        let power_factor = (PF_BASE + self.jitter.symmetric(PF_JITTER)).clamp(0.0, 1.0);
        let power_mw = profile.power_mw * (power_factor / PF_BASE);
        self.energy_kwh += power_mw * 1_000.0 / 3_600.0;

        let thd_deviation = self.jitter.gaussian() * 0.35;
        let thd = (profile.thd_pct + thd_deviation).max(0.0);
        let foam_index = (profile.foam_index - FOAM_THD_COUPLING * thd_deviation
            + self.jitter.symmetric(FOAM_JITTER))
        .clamp(0.0, 1.0);

        let temperature_c = self.config.base_temperature(stage, elapsed)
            + (foam_index - 0.5) * 20.0
            + self.jitter.symmetric(TEMP_JITTER);

        let carbon_jitter = self.jitter.symmetric(0.02);
        let oxygen_jitter = self.jitter.symmetric(0.002);
        let (carbon_pct, oxygen_pct) = self.chemistry(stage, elapsed, carbon_jitter, oxygen_jitter);

        let mut tick = Tick {
            timestamp: self.epoch_ms + (elapsed as i64) * 1_000,
            stage,
            temperature_c,
            energy_total_kwh: self.energy_kwh,
            energy_per_tonne: self.energy_kwh / self.config.mass_tonnes,
            power_factor,
            tap_position: profile.tap_position,
            total_harmonic_distortion_pct: thd,
            foam_index,
            carbon_pct,
            oxygen_pct,
            note,
        };

        self.apply_pending(&mut tick);
        ensure_finite(&tick, elapsed)?;
        self.last_tick = Some(tick.clone());
        Ok(tick)
    }

    fn chemistry(
        &self,
        stage: Stage,
        elapsed: u64,
        carbon_jitter: f64,
        oxygen_jitter: f64,
    ) -> (Option<f64>, Option<f64>) {
        let c = &self.config;
        let (carbon, oxygen) = match stage {
            Stage::Bor => return (None, None),
            Stage::Melt => {
                let p = GeneratorConfig::progress(elapsed, c.bore_in_until_sec, c.melt_until_sec);
                (0.80 - 0.55 * p, 0.015 + 0.020 * p)
            }
            Stage::Refine => {
                let p = GeneratorConfig::progress(elapsed, c.melt_until_sec, c.refine_until_sec);
                (0.25 - 0.17 * p, 0.035 + 0.030 * p)
            }
            Stage::Tap => (0.08, 0.065),
        };
        (
            Some((carbon + carbon_jitter).max(0.001)),
            Some((oxygen + oxygen_jitter).max(0.001)),
        )
    }

    fn apply_pending(&mut self, tick: &mut Tick) {
        let Some(pending) = self.scenario.as_mut() else {
            return;
        };
        if pending.applied || !pending.injection.is_due(self.elapsed_sec) {
            return;
        }
        let injection = &pending.injection;
        injection.delta.apply(tick);
        if injection.delta.energy_total_kwh.is_some() {
            self.energy_kwh = tick.energy_total_kwh;
            tick.energy_per_tonne = tick.energy_total_kwh / self.config.mass_tonnes;
        }
        tick.note = Some(injection.id.clone());
        pending.applied = true;
        info!(scenario = %injection.id, sim_second = self.elapsed_sec, "scenario applied");
        self.notifications.push(ScenarioApplied {
            id: injection.id.clone(),
            sim_second: self.elapsed_sec,
            recommendation: injection.recommendation.clone(),
        });
    }
}

fn ensure_finite(tick: &Tick, sim_second: u64) -> Result<(), SimError> {
    let fields = [
        ("temperatureC", Some(tick.temperature_c)),
        ("energyTotalKwh", Some(tick.energy_total_kwh)),
        ("energyPerTonne", Some(tick.energy_per_tonne)),
        ("powerFactor", Some(tick.power_factor)),
        ("totalHarmonicDistortionPct", Some(tick.total_harmonic_distortion_pct)),
        ("foamIndex", Some(tick.foam_index)),
        ("carbonPct", tick.carbon_pct),
        ("oxygenPct", tick.oxygen_pct),
    ];
    for (field, value) in fields {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(SimError::NonFinite { field, sim_second });
        }
    }
    Ok(())
}
