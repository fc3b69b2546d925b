//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Sans-IO streaming client: buffering, replay, reconnect and latency probing."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::collections::VecDeque;

use eaf_common::time::duration_to_millis;
use eaf_common::ClientConfig;
use eaf_msg::{
    decode, log_message, ClientMessage, Inbound, MessageDirection, ProtocolError, ServerMessage,
    Tick,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::metrics::ConnectionMetrics;
use crate::ring::{BufferedTick, TickRingBuffer};
use crate::scheduler::{TaskKind, TaskScheduler};
use crate::sink::{StateSink, TickEvent};

/// Tunables of a [`StreamClient`], all times in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub session_key: Option<String>,
    pub buffer_capacity: usize,
    pub replay_window: usize,
    pub replay_interval_ms: i64,
    pub base_reconnect_delay_ms: i64,
    pub max_reconnect_attempts: u32,
    pub latency_probe_interval_ms: i64,
}

impl From<&ClientConfig> for ClientSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            session_key: config.session_key.clone(),
            buffer_capacity: config.buffer_capacity,
            replay_window: config.replay_window,
            replay_interval_ms: duration_to_millis(config.replay_interval),
            base_reconnect_delay_ms: duration_to_millis(config.base_reconnect_delay),
            max_reconnect_attempts: config.max_reconnect_attempts,
            latency_probe_interval_ms: duration_to_millis(config.latency_probe_interval),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl ClientSettings {
    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn reconnect_delay_ms(&self, attempt: u32) -> i64 {
        2_i64
            .checked_pow(attempt)
            .map_or(i64::MAX, |factor| self.base_reconnect_delay_ms.saturating_mul(factor))
    }
}

/// How the transport ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Orderly close initiated by the server (close code 1000).
    Clean,
    /// Network error, abnormal close code, or failed connect.
    Abnormal,
}

/// Work requested from the transport driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    Connect,
    Send(ClientMessage),
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or closed on purpose.
    Idle,
    Connecting,
    Open,
    /// Lost the transport; replaying and possibly waiting to reconnect.
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
struct ReplayCursor {
    start: usize,
    next: usize,
}

/// Resilient streaming client state machine.
///
/// Every entry point takes the current wall-clock time in milliseconds so the
/// same logic runs under tokio and under a simulated clock in tests. Outbound
/// work is queued as [`ClientAction`]s and drained with [`poll_action`].
///
/// [`poll_action`]: StreamClient::poll_action
pub struct StreamClient<S> {
    settings: ClientSettings,
    sink: S,
    buffer: TickRingBuffer,
    scheduler: TaskScheduler,
    state: ConnectionState,
    replay: Option<ReplayCursor>,
    reconnect_attempts: u32,
    latency_ms: Option<i64>,
    last_server_tick_timestamp: Option<i64>,
    outbox: VecDeque<ClientAction>,
}

impl<S: StateSink> StreamClient<S> {
    pub fn new(settings: ClientSettings, sink: S) -> Self {
        let buffer = TickRingBuffer::new(settings.buffer_capacity);
        Self {
            settings,
            sink,
            buffer,
            scheduler: TaskScheduler::new(),
            state: ConnectionState::Idle,
            replay: None,
            reconnect_attempts: 0,
            latency_ms: None,
            last_server_tick_timestamp: None,
            outbox: VecDeque::new(),
        }
    }

    /// Ask the driver to open the transport.
    pub fn connect(&mut self, _now_ms: i64) {
        self.scheduler.cancel(TaskKind::Reconnect);
        self.state = ConnectionState::Connecting;
        debug!(attempt = self.reconnect_attempts, "connecting");
        self.outbox.push_back(ClientAction::Connect);
    }

    /// Manual reconnect; resets the attempt counter so backoff starts over.
    /// An open transport is dropped first and reported as disconnected.
    pub fn reconnect_now(&mut self, now_ms: i64) {
        info!(previous_attempts = self.reconnect_attempts, "manual reconnect requested");
        self.reconnect_attempts = 0;
        if self.state == ConnectionState::Open {
            self.scheduler.cancel(TaskKind::LatencyProbe);
            self.outbox.push_back(ClientAction::Disconnect);
            self.sink.on_connection_change(false);
        }
        self.connect(now_ms);
        self.publish_metrics();
    }

    pub fn handle_open(&mut self, now_ms: i64) {
        self.reconnect_attempts = 0;
        self.stop_replay();
        self.scheduler.cancel(TaskKind::Reconnect);
        self.state = ConnectionState::Open;
        info!("stream connected");
        self.sink.on_connection_change(true);

        if let Some(key) = self.settings.session_key.clone() {
            self.send(ClientMessage::subscribe(key));
        }
        let interval = self.settings.latency_probe_interval_ms;
        self.scheduler
            .schedule_every(TaskKind::LatencyProbe, now_ms + interval, interval);
        self.publish_metrics();
    }

    /// Process one inbound text frame. Malformed and unknown messages are
    /// logged and otherwise ignored.
    pub fn handle_text(&mut self, text: &str, now_ms: i64) {
        let message = match decode::<ServerMessage>(text) {
            Ok(Inbound::Message(message)) => message,
            Ok(Inbound::Unknown { kind }) => {
                debug!(%kind, "ignoring unknown message type");
                return;
            }
            Err(ProtocolError::InvalidPayload { kind, source }) => {
                match unstamped_tick(&kind, text, now_ms) {
                    Some(tick) => {
                        debug!(%kind, "tick without origin timestamp");
                        log_message(
                            MessageDirection::Inbound,
                            "simulation_tick",
                            self.settings.session_key.as_deref(),
                        );
                        self.accept_tick(tick, None, now_ms);
                        self.publish_metrics();
                    }
                    None => warn!(%kind, error = %source, "dropping malformed message"),
                }
                return;
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed message");
                return;
            }
        };
        log_message(
            MessageDirection::Inbound,
            message.kind(),
            self.settings.session_key.as_deref(),
        );

        match message {
            ServerMessage::SimulationTick(tick) => {
                let origin = tick.timestamp;
                self.accept_tick(tick, Some(origin), now_ms);
            }
            ServerMessage::Pong(pong) => {
                let latency_ms = (now_ms - pong.timestamp).max(0);
                debug!(latency_ms, server_time = pong.server_time, "pong received");
                self.latency_ms = Some(latency_ms);
            }
            ServerMessage::HeatData(snapshot) => self.sink.on_snapshot(snapshot),
            ServerMessage::Error(error) => self.sink.on_error(error.message),
            ServerMessage::ScenarioApplied(applied) => self.sink.on_scenario_applied(applied),
            ServerMessage::SimulationStatus(status) => self.sink.on_status(status),
        }
        self.publish_metrics();
    }

    /// Transport lost or connect failed. Replay starts at once; only
    /// abnormal closes schedule a reconnect.
    pub fn handle_close(&mut self, kind: CloseKind, now_ms: i64) {
        if self.state == ConnectionState::Idle {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.scheduler.cancel(TaskKind::LatencyProbe);
        self.sink.on_connection_change(false);
        if self.replay.is_none() {
            self.start_replay(now_ms);
        }
        match kind {
            CloseKind::Abnormal => self.schedule_reconnect(now_ms),
            CloseKind::Clean => info!("server closed the stream cleanly; not reconnecting"),
        }
        self.publish_metrics();
    }

    /// Run every task due at `now_ms`.
    pub fn fire_due(&mut self, now_ms: i64) {
        while let Some(kind) = self.scheduler.pop_due(now_ms) {
            match kind {
                TaskKind::Reconnect => self.connect(now_ms),
                TaskKind::Replay => self.emit_replay(now_ms),
                TaskKind::LatencyProbe => {
                    if self.state == ConnectionState::Open {
                        self.send(ClientMessage::ping(now_ms));
                    }
                }
            }
        }
    }

    /// Deliberate teardown: drop the transport and every timer.
    pub fn close(&mut self) {
        let was_connected = self.state == ConnectionState::Open;
        if matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            self.outbox.push_back(ClientAction::Disconnect);
        }
        self.scheduler.cancel_all();
        self.replay = None;
        self.state = ConnectionState::Idle;
        info!("stream closed");
        if was_connected {
            self.sink.on_connection_change(false);
        }
        self.publish_metrics();
    }

    pub fn poll_action(&mut self) -> Option<ClientAction> {
        self.outbox.pop_front()
    }

    /// Earliest scheduled task deadline.
    pub fn next_deadline(&self) -> Option<i64> {
        self.scheduler.next_due()
    }

    pub fn metrics(&self) -> ConnectionMetrics {
        ConnectionMetrics {
            latency_ms: self.latency_ms,
            is_replaying: self.replay.is_some(),
            buffered_count: self.buffer.len(),
            reconnect_attempts: self.reconnect_attempts,
            last_server_tick_timestamp: self.last_server_tick_timestamp,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn is_replaying(&self) -> bool {
        self.replay.is_some()
    }

    pub fn buffer(&self) -> &TickRingBuffer {
        &self.buffer
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn accept_tick(&mut self, tick: Tick, origin_ms: Option<i64>, now_ms: i64) {
        if origin_ms.is_some() {
            self.last_server_tick_timestamp = origin_ms;
        }
        self.buffer.push(BufferedTick {
            received_at_ms: now_ms,
            server_timestamp_ms: origin_ms,
            payload: tick.clone(),
            latency_ms: origin_ms.map(|origin| (now_ms - origin).max(0)),
        });
        self.sink.on_tick(TickEvent {
            tick,
            is_buffered: false,
        });
    }

    fn send(&mut self, message: ClientMessage) {
        self.outbox.push_back(ClientAction::Send(message));
    }

    fn schedule_reconnect(&mut self, now_ms: i64) {
        if self.reconnect_attempts >= self.settings.max_reconnect_attempts {
            warn!(
                attempts = self.reconnect_attempts,
                "reconnect attempts exhausted; manual reconnect required"
            );
            return;
        }
        let delay_ms = self.settings.reconnect_delay_ms(self.reconnect_attempts);
        self.reconnect_attempts += 1;
        info!(attempt = self.reconnect_attempts, delay_ms, "scheduling reconnect");
        self.scheduler
            .schedule_once(TaskKind::Reconnect, now_ms.saturating_add(delay_ms));
    }

    fn start_replay(&mut self, now_ms: i64) {
        if self.buffer.is_empty() {
            debug!("nothing buffered; replay not started");
            return;
        }
        let start = self.buffer.window_start(self.settings.replay_window);
        self.replay = Some(ReplayCursor { start, next: start });
        info!(
            window = self.buffer.len() - start,
            "starting buffered replay"
        );
        self.emit_replay(now_ms);
        let interval = self.settings.replay_interval_ms;
        self.scheduler
            .schedule_every(TaskKind::Replay, now_ms + interval, interval);
    }

    fn stop_replay(&mut self) {
        self.scheduler.cancel(TaskKind::Replay);
        if self.replay.take().is_some() {
            info!("live stream resumed; replay stopped");
        }
    }

    fn emit_replay(&mut self, now_ms: i64) {
        let Some(cursor) = self.replay.as_mut() else {
            return;
        };
        let Some(entry) = self.buffer.get(cursor.next) else {
            return;
        };
        let mut tick = entry.payload.clone();
        tick.timestamp = now_ms;
        cursor.next += 1;
        if cursor.next >= self.buffer.len() {
            cursor.next = cursor.start;
        }
        log_message(
            MessageDirection::Replay,
            "simulation_tick",
            self.settings.session_key.as_deref(),
        );
        self.sink.on_tick(TickEvent {
            tick,
            is_buffered: true,
        });
    }

    fn publish_metrics(&mut self) {
        let metrics = self.metrics();
        self.sink.on_metrics(metrics);
    }
}

#[derive(Deserialize)]
struct TickFrame {
    payload: Map<String, Value>,
}

/// Decode a tick frame whose payload has no origin `timestamp`. The tick is
/// stamped with the receipt time; frames failing for any other reason yield `None`.
fn unstamped_tick(kind: &str, text: &str, now_ms: i64) -> Option<Tick> {
    if !matches!(kind, "simulation_tick" | "tick") {
        return None;
    }
    let TickFrame { mut payload } = serde_json::from_str(text).ok()?;
    if payload.contains_key("timestamp") {
        return None;
    }
    payload.insert("timestamp".to_owned(), Value::from(now_ms));
    serde_json::from_value(Value::Object(payload)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkEvent;
    use eaf_msg::{encode, PongPayload};
    use eaf_sim::HeatGenerator;

    const LATENCY: i64 = 40;

    fn client() -> StreamClient<Vec<SinkEvent>> {
        StreamClient::new(ClientSettings::default().with_session("heat-1"), Vec::new())
    }

    fn tick_frame(tick: &Tick) -> String {
        encode(&ServerMessage::SimulationTick(tick.clone())).unwrap()
    }

    fn drain(client: &mut StreamClient<Vec<SinkEvent>>) -> Vec<ClientAction> {
        std::iter::from_fn(|| client.poll_action()).collect()
    }

    /// Opens the client at `now` and feeds `count` live ticks one second apart.
    fn stream_live(client: &mut StreamClient<Vec<SinkEvent>>, count: usize) -> i64 {
        let mut generator = HeatGenerator::new(42);
        client.connect(0);
        client.handle_open(0);
        let mut now = 0;
        for _ in 0..count {
            let tick = generator.tick().unwrap();
            now = tick.timestamp + LATENCY;
            client.fire_due(now);
            client.handle_text(&tick_frame(&tick), now);
        }
        now
    }

    fn replayed(events: &[SinkEvent]) -> Vec<i64> {
        events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Tick(TickEvent {
                    tick,
                    is_buffered: true,
                }) => Some(tick.timestamp),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn open_subscribes_and_arms_ping_timer() {
        let mut client = client();
        client.connect(0);
        assert_eq!(drain(&mut client), vec![ClientAction::Connect]);
        client.handle_open(100);
        assert_eq!(
            drain(&mut client),
            vec![ClientAction::Send(ClientMessage::subscribe("heat-1"))]
        );
        assert_eq!(client.sink()[0], SinkEvent::Connection { connected: true });
        assert_eq!(client.scheduler().due_at(TaskKind::LatencyProbe), Some(5_100));

        client.fire_due(5_100);
        client.fire_due(10_100);
        assert_eq!(
            drain(&mut client),
            vec![
                ClientAction::Send(ClientMessage::ping(5_100)),
                ClientAction::Send(ClientMessage::ping(10_100)),
            ]
        );
    }

    #[test]
    fn live_ticks_are_buffered_with_latency() {
        let mut client = client();
        let now = stream_live(&mut client, 3);
        let metrics = client.metrics();
        assert_eq!(metrics.buffered_count, 3);
        assert_eq!(metrics.last_server_tick_timestamp, Some(3_000));
        assert_eq!(client.buffer().latest().and_then(|t| t.latency_ms), Some(LATENCY));
        assert_eq!(client.buffer().latest().map(|t| t.received_at_ms), Some(now));
        assert!(matches!(
            client.sink().last(),
            Some(SinkEvent::Metrics(ConnectionMetrics { buffered_count: 3, .. }))
        ));
    }

    #[test]
    fn tick_latency_never_negative() {
        let mut client = client();
        client.connect(0);
        client.handle_open(0);
        let tick = HeatGenerator::new(1).tick().unwrap();
        client.handle_text(&tick_frame(&tick), tick.timestamp - 500);
        assert_eq!(client.buffer().latest().and_then(|t| t.latency_ms), Some(0));
    }

    #[test]
    fn buffer_keeps_latest_capacity_ticks() {
        let mut client = client();
        stream_live(&mut client, 200);
        assert_eq!(client.metrics().buffered_count, 180);
        let first = client.buffer().get(0).and_then(|t| t.server_timestamp_ms);
        assert_eq!(first, Some(21_000));
        let all_bounded = client.sink().iter().all(|event| match event {
            SinkEvent::Metrics(metrics) => metrics.buffered_count <= 180,
            _ => true,
        });
        assert!(all_bounded);
    }

    #[test]
    fn pong_latency_matches_elapsed_time() {
        let mut client = client();
        client.connect(0);
        client.handle_open(0);
        let pong = encode(&ServerMessage::Pong(PongPayload {
            timestamp: 5_000,
            server_time: 5_020,
        }))
        .unwrap();
        client.handle_text(&pong, 5_063);
        assert_eq!(client.metrics().latency_ms, Some(63));

        // Pongs are matched independently, never assumed to be in order.
        let stale = encode(&ServerMessage::Pong(PongPayload {
            timestamp: 9_000,
            server_time: 8_000,
        }))
        .unwrap();
        client.handle_text(&stale, 8_500);
        assert_eq!(client.metrics().latency_ms, Some(0));
    }

    #[test]
    fn malformed_input_leaves_state_unchanged() {
        let mut client = client();
        stream_live(&mut client, 5);
        drain(&mut client);
        let before = client.metrics();
        let events = client.sink().len();
        let tasks = client.scheduler().active_count();

        client.handle_text("definitely not json", 6_000);
        client.handle_text(r#"{"payload": {}}"#, 6_000);
        client.handle_text(r#"{"type": "simulation_tick", "payload": {"stage": "LAVA"}}"#, 6_000);

        assert_eq!(client.metrics(), before);
        assert_eq!(client.sink().len(), events);
        assert_eq!(client.scheduler().active_count(), tasks);
        assert!(drain(&mut client).is_empty());
    }

    #[test]
    fn tick_without_timestamp_is_buffered_without_latency() {
        let mut client = client();
        stream_live(&mut client, 2);
        let before = client.metrics();
        let tick = HeatGenerator::new(7).tick().unwrap();
        let mut frame = serde_json::to_value(ServerMessage::SimulationTick(tick)).unwrap();
        frame["payload"].as_object_mut().unwrap().remove("timestamp");

        client.handle_text(&frame.to_string(), 9_000);

        let latest = client.buffer().latest().unwrap();
        assert_eq!(latest.server_timestamp_ms, None);
        assert_eq!(latest.latency_ms, None);
        assert_eq!(latest.received_at_ms, 9_000);
        let metrics = client.metrics();
        assert_eq!(metrics.buffered_count, before.buffered_count + 1);
        assert_eq!(metrics.last_server_tick_timestamp, before.last_server_tick_timestamp);

        let events = client.sink();
        assert!(matches!(
            &events[events.len() - 2],
            SinkEvent::Tick(TickEvent { tick, is_buffered: false }) if tick.timestamp == 9_000
        ));
        assert!(matches!(
            events.last(),
            Some(SinkEvent::Metrics(ConnectionMetrics { buffered_count: 3, .. }))
        ));
    }

    #[test]
    fn unknown_types_are_ignored() {
        let mut client = client();
        stream_live(&mut client, 2);
        let events = client.sink().len();
        client.handle_text(r#"{"type": "panel_layout", "payload": {"rows": 3}}"#, 3_000);
        assert_eq!(client.sink().len(), events);
    }

    #[test]
    fn server_error_reaches_sink() {
        let mut client = client();
        stream_live(&mut client, 1);
        let frame = encode(&ServerMessage::error("generator fault")).unwrap();
        client.handle_text(&frame, 2_000);
        assert!(client.sink().contains(&SinkEvent::Error {
            message: "generator fault".into()
        }));
    }

    #[test]
    fn replay_covers_outage_without_gaps() {
        let mut client = client();
        let disconnect_at = stream_live(&mut client, 35) + 500;
        client.handle_close(CloseKind::Abnormal, disconnect_at);
        assert!(client.is_replaying());
        assert!(client
            .sink()
            .contains(&SinkEvent::Connection { connected: false }));

        let end = disconnect_at + 65_000;
        let mut now = disconnect_at;
        while now <= end {
            client.fire_due(now);
            for action in drain(&mut client) {
                if action == ClientAction::Connect {
                    client.handle_close(CloseKind::Abnormal, now);
                }
            }
            now += 100;
        }

        let emitted = replayed(client.sink());
        assert_eq!(emitted.first(), Some(&disconnect_at));
        assert!(*emitted.last().unwrap() >= disconnect_at + 60_000);
        assert!(emitted.windows(2).all(|pair| pair[1] - pair[0] <= 1_000));

        // Replay cycles the buffer in receipt order.
        let replayed_seconds: Vec<_> = client
            .sink()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Tick(TickEvent {
                    tick,
                    is_buffered: true,
                }) => Some(tick.energy_total_kwh),
                _ => None,
            })
            .collect();
        let buffered: Vec<_> = client
            .buffer()
            .iter()
            .map(|entry| entry.payload.energy_total_kwh)
            .collect();
        assert_eq!(&replayed_seconds[..35], &buffered[..]);
        assert_eq!(&replayed_seconds[35..60], &buffered[..25]);
    }

    #[test]
    fn replay_window_limits_to_recent_history() {
        let mut client = client();
        let now = stream_live(&mut client, 100);
        client.handle_close(CloseKind::Clean, now);
        let first = client
            .sink()
            .iter()
            .rev()
            .find_map(|event| match event {
                SinkEvent::Tick(TickEvent {
                    tick,
                    is_buffered: true,
                }) => Some(tick.energy_total_kwh),
                _ => None,
            });
        let window_start = client.buffer().get(40).map(|e| e.payload.energy_total_kwh);
        assert_eq!(first, window_start);
    }

    #[test]
    fn backoff_doubles_and_stops_after_five_attempts() {
        let mut client = client();
        let mut now = stream_live(&mut client, 3);
        drain(&mut client);

        let mut delays = Vec::new();
        client.handle_close(CloseKind::Abnormal, now);
        while let Some(due) = client.scheduler().due_at(TaskKind::Reconnect) {
            delays.push(due - now);
            now = due;
            client.fire_due(now);
            assert!(drain(&mut client).contains(&ClientAction::Connect));
            client.handle_close(CloseKind::Abnormal, now);
        }

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
        assert_eq!(client.metrics().reconnect_attempts, 5);
        assert!(!client.scheduler().is_scheduled(TaskKind::Reconnect));
        assert!(client.is_replaying());

        client.reconnect_now(now);
        assert_eq!(drain(&mut client), vec![ClientAction::Connect]);
        assert_eq!(client.metrics().reconnect_attempts, 0);
    }

    #[test]
    fn reconnect_delay_saturates_for_large_attempts() {
        let settings = ClientSettings::default();
        assert_eq!(settings.reconnect_delay_ms(0), settings.base_reconnect_delay_ms);
        assert_eq!(settings.reconnect_delay_ms(63), i64::MAX);
        let delays: Vec<i64> = (0..=70)
            .map(|attempt| settings.reconnect_delay_ms(attempt))
            .collect();
        assert!(delays.iter().all(|delay| *delay > 0));
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn manual_reconnect_while_open_reports_disconnect_first() {
        let mut client = client();
        let now = stream_live(&mut client, 3);
        drain(&mut client);

        client.reconnect_now(now);
        assert_eq!(
            drain(&mut client),
            vec![ClientAction::Disconnect, ClientAction::Connect]
        );
        assert!(!client.is_connected());
        assert!(!client.scheduler().is_scheduled(TaskKind::LatencyProbe));
        client.handle_open(now + 50);

        let transitions: Vec<bool> = client
            .sink()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Connection { connected } => Some(*connected),
                _ => None,
            })
            .collect();
        assert_eq!(transitions, vec![true, false, true]);
    }

    #[test]
    fn clean_close_replays_without_reconnecting() {
        let mut client = client();
        let now = stream_live(&mut client, 10);
        client.handle_close(CloseKind::Clean, now);
        assert!(client.is_replaying());
        assert!(!client.scheduler().is_scheduled(TaskKind::Reconnect));
        assert!(!client.scheduler().is_scheduled(TaskKind::LatencyProbe));
        assert_eq!(client.metrics().reconnect_attempts, 0);
    }

    #[test]
    fn reopening_never_duplicates_timers() {
        let mut client = client();
        let mut now = stream_live(&mut client, 10);
        for _ in 0..3 {
            client.handle_close(CloseKind::Abnormal, now);
            assert_eq!(client.scheduler().active_count(), 2);
            now = client.scheduler().due_at(TaskKind::Reconnect).unwrap();
            client.fire_due(now);
            client.handle_open(now);
            assert_eq!(client.scheduler().active_count(), 1);
            assert!(client.scheduler().is_scheduled(TaskKind::LatencyProbe));
            assert!(!client.is_replaying());
            assert_eq!(client.metrics().reconnect_attempts, 0);
        }
        client.handle_open(now);
        assert_eq!(client.scheduler().active_count(), 1);
    }

    #[test]
    fn teardown_cancels_every_timer() {
        let mut client = client();
        let now = stream_live(&mut client, 10);
        client.handle_close(CloseKind::Abnormal, now);
        assert!(client.scheduler().active_count() > 0);
        drain(&mut client);

        client.close();
        assert_eq!(client.scheduler().active_count(), 0);
        assert_eq!(client.next_deadline(), None);
        assert!(!client.is_replaying());
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Idle);

        // A late close event from the driver must not revive the client.
        client.handle_close(CloseKind::Abnormal, now + 10);
        assert_eq!(client.scheduler().active_count(), 0);
    }

    #[test]
    fn teardown_while_open_disconnects() {
        let mut client = client();
        stream_live(&mut client, 2);
        drain(&mut client);
        client.close();
        assert_eq!(drain(&mut client), vec![ClientAction::Disconnect]);
        assert_eq!(client.scheduler().active_count(), 0);
    }
}
