//! ---
//! eaf_section: "02-messaging-wire-protocol"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Message schema helpers and protocol codecs."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Furnace process phase. Ordering follows the fixed heat sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    /// Bore-in: electrodes drilling into the fresh scrap charge.
    Bor,
    /// Flat bath melting.
    Melt,
    /// Refining chemistry and temperature before tapping.
    Refine,
    /// Tapping the heat into the ladle.
    Tap,
}

impl Stage {
    /// Following stage in the sequence; `Tap` is terminal.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Bor => Some(Stage::Melt),
            Stage::Melt => Some(Stage::Refine),
            Stage::Refine => Some(Stage::Tap),
            Stage::Tap => None,
        }
    }

    /// Wire representation of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Bor => "BOR",
            Stage::Melt => "MELT",
            Stage::Refine => "REFINE",
            Stage::Tap => "TAP",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulated second of furnace telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    /// Origin timestamp in milliseconds, strictly increasing per generator.
    pub timestamp: i64,
    /// Current process phase.
    pub stage: Stage,
    /// Bath temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Energy consumed since the start of the heat.
    pub energy_total_kwh: f64,
    /// Energy consumed normalised by charge mass.
    pub energy_per_tonne: f64,
    /// Electrical power factor in `0..1`.
    pub power_factor: f64,
    /// Furnace transformer tap position.
    pub tap_position: i32,
    /// Total harmonic distortion on the supply.
    pub total_harmonic_distortion_pct: f64,
    /// Slag foam quality in `0..1`.
    pub foam_index: f64,
    /// Bath carbon content, absent before melt-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_pct: Option<f64>,
    /// Dissolved oxygen, absent before melt-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oxygen_pct: Option<f64>,
    /// Free-form annotation (stage changes, applied scenarios).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Generator progress summary exposed to control collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorStatus {
    /// Simulated seconds elapsed since construction or reset.
    pub elapsed_sec: u64,
    /// Stage reached so far.
    pub stage: Stage,
    /// Accumulated energy.
    pub total_energy_kwh: f64,
}

/// How quickly an operator should act on a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Informational.
    Low,
    /// Act within the current stage.
    Medium,
    /// Act within the next minute.
    High,
    /// Act immediately.
    Critical,
}

/// Operator guidance attached to a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Human readable advice.
    pub text: String,
    /// Urgency classification.
    pub urgency: Urgency,
    /// Suggested reaction window, e.g. `"30s"`.
    pub time_to_apply: String,
}

/// `subscribe` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// Opaque session identifier selecting the generator to follow.
    pub session_key: String,
}

/// `ping` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    /// Client wall-clock milliseconds at send time.
    pub timestamp: i64,
}

/// `pong` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    /// Timestamp echoed from the matching ping.
    pub timestamp: i64,
    /// Server wall-clock milliseconds when the pong was produced.
    pub server_time: i64,
}

/// Full session state sent in reply to a subscribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatSnapshot {
    /// Session the snapshot describes.
    pub session_key: String,
    /// Seed the session generator was built with.
    pub seed: u64,
    /// Whether the session is currently producing ticks.
    pub running: bool,
    /// Generator progress.
    pub status: GeneratorStatus,
    /// Most recent tick, if the generator has advanced at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_tick: Option<Tick>,
}

/// `error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Description of the failure.
    pub message: String,
}

/// `scenario_applied` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioAppliedPayload {
    /// Scenario identifier.
    pub id: String,
    /// Simulated second at which the delta was applied.
    pub sim_second: u64,
    /// Guidance attached to the scenario.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
}

/// `simulation_status` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatusPayload {
    /// Session the status belongs to.
    pub session_key: String,
    /// Whether ticks are being produced.
    pub running: bool,
    /// Generator progress.
    pub status: GeneratorStatus,
}

/// Messages sent from the streaming client to the transport server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach the connection to a session.
    Subscribe(SubscribePayload),
    /// Latency probe.
    Ping(PingPayload),
}

impl ClientMessage {
    /// Build a subscribe message.
    pub fn subscribe(session_key: impl Into<String>) -> Self {
        ClientMessage::Subscribe(SubscribePayload {
            session_key: session_key.into(),
        })
    }

    /// Build a ping stamped with `timestamp`.
    pub fn ping(timestamp: i64) -> Self {
        ClientMessage::Ping(PingPayload { timestamp })
    }

    /// Wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Subscribe(_) => "subscribe",
            ClientMessage::Ping(_) => "ping",
        }
    }
}

/// Messages sent from the transport server to streaming clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One generator tick.
    #[serde(alias = "tick")]
    SimulationTick(Tick),
    /// Latency probe reply.
    Pong(PongPayload),
    /// Session snapshot sent on subscribe.
    #[serde(alias = "snapshot")]
    HeatData(HeatSnapshot),
    /// Failure scoped to this connection.
    Error(ErrorPayload),
    /// A pending scenario delta has been applied.
    ScenarioApplied(ScenarioAppliedPayload),
    /// Session was started, stopped or reset.
    SimulationStatus(SimulationStatusPayload),
}

impl ServerMessage {
    /// Build an error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::SimulationTick(_) => "simulation_tick",
            ServerMessage::Pong(_) => "pong",
            ServerMessage::HeatData(_) => "heat_data",
            ServerMessage::Error(_) => "error",
            ServerMessage::ScenarioApplied(_) => "scenario_applied",
            ServerMessage::SimulationStatus(_) => "simulation_status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tick() -> Tick {
        Tick {
            timestamp: 1_000,
            stage: Stage::Melt,
            temperature_c: 1_210.5,
            energy_total_kwh: 4_200.0,
            energy_per_tonne: 49.4,
            power_factor: 0.85,
            tap_position: 14,
            total_harmonic_distortion_pct: 4.8,
            foam_index: 0.6,
            carbon_pct: Some(0.7),
            oxygen_pct: None,
            note: None,
        }
    }

    #[test]
    fn stage_order_follows_heat_sequence() {
        assert!(Stage::Bor < Stage::Melt);
        assert!(Stage::Melt < Stage::Refine);
        assert!(Stage::Refine < Stage::Tap);
        assert_eq!(Stage::Refine.next(), Some(Stage::Tap));
        assert_eq!(Stage::Tap.next(), None);
    }

    #[test]
    fn tick_serializes_with_camel_case_fields() {
        let value = serde_json::to_value(sample_tick()).unwrap();
        assert_eq!(value["stage"], "MELT");
        assert_eq!(value["temperatureC"], 1_210.5);
        assert_eq!(value["totalHarmonicDistortionPct"], 4.8);
        assert_eq!(value["carbonPct"], 0.7);
        assert!(value.get("oxygenPct").is_none());
    }

    #[test]
    fn tick_message_uses_simulation_tick_discriminator() {
        let message = ServerMessage::SimulationTick(sample_tick());
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "simulation_tick");
        assert_eq!(value["payload"]["tapPosition"], 14);
    }

    #[test]
    fn pong_payload_matches_wire_names() {
        let message = ServerMessage::Pong(PongPayload {
            timestamp: 10,
            server_time: 12,
        });
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"type": "pong", "payload": {"timestamp": 10, "serverTime": 12}})
        );
    }

    #[test]
    fn subscribe_uses_session_key() {
        let value = serde_json::to_value(ClientMessage::subscribe("heat-42")).unwrap();
        assert_eq!(
            value,
            json!({"type": "subscribe", "payload": {"sessionKey": "heat-42"}})
        );
    }

    #[test]
    fn short_aliases_are_accepted() {
        let text = json!({"type": "tick", "payload": sample_tick()}).to_string();
        let message: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(message.kind(), "simulation_tick");
    }
}
