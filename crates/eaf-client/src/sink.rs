//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "State sink interface and bundled implementations."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use eaf_msg::{HeatSnapshot, ScenarioAppliedPayload, SimulationStatusPayload, Tick};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::metrics::ConnectionMetrics;

/// Decoded tick forwarded to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvent {
    pub tick: Tick,
    /// `true` when synthesised from the replay buffer rather than received live.
    pub is_buffered: bool,
}

/// Consumer of client events. Calls are fire-and-forget.
pub trait StateSink: Send {
    fn on_connection_change(&mut self, connected: bool);
    fn on_tick(&mut self, event: TickEvent);
    fn on_metrics(&mut self, metrics: ConnectionMetrics);
    fn on_error(&mut self, message: String);

    fn on_snapshot(&mut self, _snapshot: HeatSnapshot) {}
    fn on_scenario_applied(&mut self, _applied: ScenarioAppliedPayload) {}
    fn on_status(&mut self, _status: SimulationStatusPayload) {}
}

/// Owned record of one sink push.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    Connection { connected: bool },
    Tick(TickEvent),
    Metrics(ConnectionMetrics),
    Error { message: String },
    Snapshot(HeatSnapshot),
    ScenarioApplied(ScenarioAppliedPayload),
    Status(SimulationStatusPayload),
}

/// In-memory sink collecting every event in order.
impl StateSink for Vec<SinkEvent> {
    fn on_connection_change(&mut self, connected: bool) {
        self.push(SinkEvent::Connection { connected });
    }

    fn on_tick(&mut self, event: TickEvent) {
        self.push(SinkEvent::Tick(event));
    }

    fn on_metrics(&mut self, metrics: ConnectionMetrics) {
        self.push(SinkEvent::Metrics(metrics));
    }

    fn on_error(&mut self, message: String) {
        self.push(SinkEvent::Error { message });
    }

    fn on_snapshot(&mut self, snapshot: HeatSnapshot) {
        self.push(SinkEvent::Snapshot(snapshot));
    }

    fn on_scenario_applied(&mut self, applied: ScenarioAppliedPayload) {
        self.push(SinkEvent::ScenarioApplied(applied));
    }

    fn on_status(&mut self, status: SimulationStatusPayload) {
        self.push(SinkEvent::Status(status));
    }
}

/// Forwards events over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            trace!("sink receiver dropped; discarding event");
        }
    }
}

impl StateSink for ChannelSink {
    fn on_connection_change(&mut self, connected: bool) {
        self.forward(SinkEvent::Connection { connected });
    }

    fn on_tick(&mut self, event: TickEvent) {
        self.forward(SinkEvent::Tick(event));
    }

    fn on_metrics(&mut self, metrics: ConnectionMetrics) {
        self.forward(SinkEvent::Metrics(metrics));
    }

    fn on_error(&mut self, message: String) {
        self.forward(SinkEvent::Error { message });
    }

    fn on_snapshot(&mut self, snapshot: HeatSnapshot) {
        self.forward(SinkEvent::Snapshot(snapshot));
    }

    fn on_scenario_applied(&mut self, applied: ScenarioAppliedPayload) {
        self.forward(SinkEvent::ScenarioApplied(applied));
    }

    fn on_status(&mut self, status: SimulationStatusPayload) {
        self.forward(SinkEvent::Status(status));
    }
}

/// Logs every event; useful when no UI store is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StateSink for TracingSink {
    fn on_connection_change(&mut self, connected: bool) {
        info!(connected, "connection state changed");
    }

    fn on_tick(&mut self, event: TickEvent) {
        debug!(
            timestamp = event.tick.timestamp,
            stage = %event.tick.stage,
            buffered = event.is_buffered,
            "tick"
        );
    }

    fn on_metrics(&mut self, metrics: ConnectionMetrics) {
        trace!(?metrics, "connection metrics");
    }

    fn on_error(&mut self, message: String) {
        warn!(%message, "server reported error");
    }

    fn on_scenario_applied(&mut self, applied: ScenarioAppliedPayload) {
        info!(scenario = %applied.id, sim_second = applied.sim_second, "scenario applied");
    }
}
