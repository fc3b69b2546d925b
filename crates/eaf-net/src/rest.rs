//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Demo control endpoints for heat sessions."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use eaf_msg::{HeatSnapshot, Recommendation, SimulationStatusPayload};
use eaf_sim::{lookup, ScenarioInjection, SimError, TickDelta};
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::server::ServerState;

/// Errors returned by the control endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("unknown session '{0}'")]
    UnknownSession(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Simulation(#[from] SimError),
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::UnknownSession(_) => StatusCode::NOT_FOUND,
            ControlError::InvalidRequest(_)
            | ControlError::Simulation(SimError::UnknownScenario(_))
            | ControlError::Simulation(SimError::InvalidSeed(_)) => StatusCode::BAD_REQUEST,
            ControlError::Simulation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Body of `start` and `reset`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedRequest {
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Body of `scenario`. Without a `delta` the id selects a catalog scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    pub id: String,
    #[serde(default)]
    pub trigger_at_sim_second: Option<u64>,
    #[serde(default)]
    pub delta: Option<TickDelta>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
}

impl ScenarioRequest {
    fn into_injection(self) -> Result<ScenarioInjection, ControlError> {
        let mut injection = match self.delta {
            Some(delta) if delta.is_empty() => {
                return Err(ControlError::InvalidRequest("delta has no fields".into()))
            }
            Some(delta) => ScenarioInjection::new(self.id, delta),
            None => lookup(&self.id)?,
        };
        if self.trigger_at_sim_second.is_some() {
            injection.trigger_at_sim_second = self.trigger_at_sim_second;
        }
        if self.recommendation.is_some() {
            injection.recommendation = self.recommendation;
        }
        Ok(injection)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioArmed {
    pub session_key: String,
    pub scenario: ScenarioInjection,
}

type SharedState = State<Arc<ServerState>>;

pub(crate) async fn get_status(
    State(state): SharedState,
    Path(session): Path<String>,
) -> Result<Json<HeatSnapshot>, ControlError> {
    let session = state
        .registry
        .get(&session)
        .ok_or(ControlError::UnknownSession(session))?;
    Ok(Json(session.snapshot()))
}

pub(crate) async fn post_start(
    State(state): SharedState,
    Path(session): Path<String>,
    body: Option<Json<SeedRequest>>,
) -> Result<Json<SimulationStatusPayload>, ControlError> {
    let seed = body.and_then(|Json(request)| request.seed);
    let session = state.registry.get_or_create(&session)?;
    Ok(Json(session.start(seed)))
}

pub(crate) async fn post_stop(
    State(state): SharedState,
    Path(key): Path<String>,
) -> Result<Json<SimulationStatusPayload>, ControlError> {
    let session = state
        .registry
        .get(&key)
        .ok_or_else(|| ControlError::UnknownSession(key.clone()))?;
    let status = session.stop();
    state.registry.remove_if_unsubscribed(&key);
    Ok(Json(status))
}

pub(crate) async fn post_reset(
    State(state): SharedState,
    Path(session): Path<String>,
    body: Option<Json<SeedRequest>>,
) -> Result<Json<SimulationStatusPayload>, ControlError> {
    let seed = body.and_then(|Json(request)| request.seed);
    let session = state.registry.get_or_create(&session)?;
    Ok(Json(session.reset(seed)))
}

pub(crate) async fn post_scenario(
    State(state): SharedState,
    Path(key): Path<String>,
    Json(request): Json<ScenarioRequest>,
) -> Result<Json<ScenarioArmed>, ControlError> {
    let session = state
        .registry
        .get(&key)
        .ok_or_else(|| ControlError::UnknownSession(key.clone()))?;
    let injection = request.into_injection()?;
    session.inject_scenario(injection.clone());
    Ok(Json(ScenarioArmed {
        session_key: key,
        scenario: injection,
    }))
}

pub(crate) async fn delete_scenario(
    State(state): SharedState,
    Path(key): Path<String>,
) -> Result<StatusCode, ControlError> {
    let session = state
        .registry
        .get(&key)
        .ok_or(ControlError::UnknownSession(key))?;
    session.clear_scenario();
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_catalog() -> Json<Vec<ScenarioInjection>> {
    Json(eaf_sim::catalog())
}

pub(crate) async fn get_health(State(state): SharedState) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.registry.len(),
    }))
}

pub(crate) async fn get_metrics(State(state): SharedState) -> Response {
    let encoder = TextEncoder::new();
    let families = state.prometheus.gather();
    match encoder.encode_to_string(&families) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TransportMetrics;
    use crate::session::{SessionRegistry, SessionSettings};
    use prometheus::Registry;
    use tokio::sync::watch;

    fn server_state() -> Arc<ServerState> {
        let prometheus = Arc::new(Registry::new());
        let metrics = TransportMetrics::register(&prometheus).unwrap();
        let settings = SessionSettings {
            autostart: false,
            ..SessionSettings::default()
        };
        let (_, shutdown) = watch::channel(false);
        Arc::new(ServerState {
            registry: Arc::new(SessionRegistry::new(settings, metrics.clone())),
            metrics,
            prometheus,
            shutdown,
        })
    }

    #[tokio::test]
    async fn stop_keeps_subscribed_session_and_releases_idle_one() {
        let state = server_state();
        let subscription = state.registry.subscribe("heat-1").unwrap();
        state.registry.get_or_create("heat-2").unwrap();

        let Json(status) = post_stop(State(Arc::clone(&state)), Path("heat-1".to_owned()))
            .await
            .unwrap();
        assert!(!status.running);
        assert!(Arc::ptr_eq(
            &state.registry.get("heat-1").unwrap(),
            subscription.session()
        ));

        post_stop(State(Arc::clone(&state)), Path("heat-2".to_owned()))
            .await
            .unwrap();
        assert_eq!(state.registry.keys(), vec!["heat-1"]);
        assert!(matches!(
            post_stop(State(state), Path("heat-2".to_owned())).await,
            Err(ControlError::UnknownSession(_))
        ));
    }

    #[test]
    fn catalog_request_can_override_trigger() {
        let request: ScenarioRequest =
            serde_json::from_str(r#"{"id": "foam-collapse", "triggerAtSimSecond": 600}"#).unwrap();
        let injection = request.into_injection().unwrap();
        assert_eq!(injection.trigger_at_sim_second, Some(600));
        assert!(injection.recommendation.is_some());
        assert_eq!(injection.delta.foam_index, Some(-0.35));
    }

    #[test]
    fn custom_delta_needs_fields() {
        let request: ScenarioRequest =
            serde_json::from_str(r#"{"id": "custom", "delta": {}}"#).unwrap();
        assert!(matches!(
            request.into_injection(),
            Err(ControlError::InvalidRequest(_))
        ));
        let request: ScenarioRequest =
            serde_json::from_str(r#"{"id": "custom", "delta": {"thd": 3.0}}"#).unwrap();
        let injection = request.into_injection().unwrap();
        assert_eq!(injection.delta.total_harmonic_distortion_pct, Some(3.0));
        assert_eq!(injection.recommendation, None);
    }

    #[test]
    fn error_status_codes() {
        let status = |err: ControlError| err.into_response().status();
        assert_eq!(status(ControlError::UnknownSession("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ControlError::Simulation(SimError::UnknownScenario("x".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ControlError::Simulation(SimError::InvalidConfig("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
