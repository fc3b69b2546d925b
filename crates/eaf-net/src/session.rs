//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Session registry owning one generator and ticker per heat session."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use eaf_common::{now_ms, ServerConfig, SimulationConfig};
use eaf_msg::{
    encode, log_message, HeatSnapshot, MessageDirection, ScenarioAppliedPayload, ServerMessage,
    SimulationStatusPayload,
};
use eaf_sim::{GeneratorConfig, HeatGenerator, ScenarioInjection, SimError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metrics::TransportMetrics;

/// Pre-encoded text frame shared by every subscriber of a session.
pub type Frame = Arc<str>;

/// Session lifecycle parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tick_interval: Duration,
    pub idle_timeout: Duration,
    pub broadcast_capacity: usize,
    pub autostart: bool,
    pub default_seed: u64,
    pub generator: GeneratorConfig,
}

impl SessionSettings {
    pub fn from_config(server: &ServerConfig, simulation: &SimulationConfig) -> Self {
        Self {
            tick_interval: server.tick_interval,
            idle_timeout: server.idle_timeout,
            broadcast_capacity: server.broadcast_capacity,
            autostart: server.autostart,
            default_seed: simulation.default_seed,
            generator: GeneratorConfig::from(simulation),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default(), &SimulationConfig::default())
    }
}

struct SessionState {
    generator: HeatGenerator,
    running: bool,
    ticker: Option<JoinHandle<()>>,
    idle_since: Option<Instant>,
}

/// One heat simulation and its subscribers.
///
/// The generator is only touched under the session lock, and only the
/// session's single ticker task calls `tick()`, so ticks leave in order.
pub struct Session {
    key: String,
    state: Mutex<SessionState>,
    tx: broadcast::Sender<Frame>,
    subscribers: AtomicUsize,
    tick_interval: Duration,
    metrics: TransportMetrics,
}

impl Session {
    fn new(
        key: String,
        generator: HeatGenerator,
        settings: &SessionSettings,
        metrics: TransportMetrics,
    ) -> Self {
        let (tx, _) = broadcast::channel(settings.broadcast_capacity.max(1));
        Self {
            key,
            state: Mutex::new(SessionState {
                generator,
                running: false,
                ticker: None,
                idle_since: Some(Instant::now()),
            }),
            tx,
            subscribers: AtomicUsize::new(0),
            tick_interval: settings.tick_interval,
            metrics,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Attach a subscriber; the guard detaches on drop. Connections go
    /// through [`SessionRegistry::subscribe`].
    fn subscribe(self: &Arc<Self>) -> Subscription {
        let receiver = self.tx.subscribe();
        self.subscribers.fetch_add(1, Ordering::SeqCst);
        self.state.lock().idle_since = None;
        Subscription {
            session: Arc::clone(self),
            receiver,
        }
    }

    fn unsubscribe(&self) {
        if self.subscribers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.lock().idle_since = Some(Instant::now());
            debug!(session = %self.key, "last subscriber left");
        }
    }

    pub fn snapshot(&self) -> HeatSnapshot {
        let state = self.state.lock();
        HeatSnapshot {
            session_key: self.key.clone(),
            seed: state.generator.seed(),
            running: state.running,
            status: state.generator.status(),
            latest_tick: state.generator.last_tick().cloned(),
        }
    }

    pub fn status(&self) -> SimulationStatusPayload {
        let state = self.state.lock();
        SimulationStatusPayload {
            session_key: self.key.clone(),
            running: state.running,
            status: state.generator.status(),
        }
    }

    /// Start ticking, reseeding first when `seed` differs from the current one.
    pub fn start(self: &Arc<Self>, seed: Option<u64>) -> SimulationStatusPayload {
        {
            let mut state = self.state.lock();
            if let Some(seed) = seed.filter(|seed| *seed != state.generator.seed()) {
                state.generator.reseed(seed, now_ms());
            }
            state.running = true;
            if state.ticker.is_none() {
                let session = Arc::downgrade(self);
                state.ticker = Some(tokio::spawn(run_ticker(session, self.tick_interval)));
            }
        }
        info!(session = %self.key, "simulation started");
        self.publish_status()
    }

    pub fn stop(&self) -> SimulationStatusPayload {
        {
            let mut state = self.state.lock();
            state.running = false;
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
        }
        info!(session = %self.key, "simulation stopped");
        self.publish_status()
    }

    /// Return the generator to a fresh state, optionally on a new seed.
    pub fn reset(&self, seed: Option<u64>) -> SimulationStatusPayload {
        {
            let mut state = self.state.lock();
            let seed = seed.unwrap_or_else(|| state.generator.seed());
            state.generator.reseed(seed, now_ms());
        }
        info!(session = %self.key, "simulation reset");
        self.publish_status()
    }

    pub fn inject_scenario(&self, injection: ScenarioInjection) {
        self.state.lock().generator.inject_scenario(injection);
    }

    pub fn clear_scenario(&self) {
        self.state.lock().generator.clear_scenario();
    }

    /// Produce one tick and fan it out. Generator faults become `error`
    /// frames for this session's subscribers.
    pub fn advance(&self) {
        let outcome = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            state
                .generator
                .tick()
                .map(|tick| (tick, state.generator.take_notifications()))
        };

        match outcome {
            Ok((tick, applied)) => {
                self.broadcast(&ServerMessage::SimulationTick(tick));
                self.metrics.ticks_broadcast.inc();
                for notification in applied {
                    self.broadcast(&ServerMessage::ScenarioApplied(ScenarioAppliedPayload {
                        id: notification.id,
                        sim_second: notification.sim_second,
                        recommendation: notification.recommendation,
                    }));
                }
            }
            Err(err) => {
                self.metrics.generator_faults.inc();
                warn!(session = %self.key, error = %err, "generator fault");
                self.broadcast(&ServerMessage::error(err.to_string()));
            }
        }
    }

    fn publish_status(&self) -> SimulationStatusPayload {
        let status = self.status();
        self.broadcast(&ServerMessage::SimulationStatus(status.clone()));
        status
    }

    fn broadcast(&self, message: &ServerMessage) {
        let text = match encode(message) {
            Ok(text) => text,
            Err(err) => {
                warn!(session = %self.key, error = %err, "failed to encode broadcast");
                return;
            }
        };
        log_message(MessageDirection::Outbound, message.kind(), Some(&self.key));
        // No receivers is normal for a session driven only through the control API.
        let _ = self.tx.send(Arc::from(text));
    }

    fn idle_for(&self, now: Instant) -> Option<Duration> {
        if self.subscriber_count() > 0 {
            return None;
        }
        self.state
            .lock()
            .idle_since
            .map(|since| now.saturating_duration_since(since))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(ticker) = self.state.get_mut().ticker.take() {
            ticker.abort();
        }
    }
}

fn retire(session: &Session) {
    session.stop();
    info!(session = %session.key, "session removed");
}

async fn run_ticker(session: Weak<Session>, period: Duration) {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick completes immediately.
    ticks.tick().await;
    loop {
        ticks.tick().await;
        let Some(session) = session.upgrade() else {
            break;
        };
        session.advance();
    }
}

/// Live attachment of one connection to a session.
pub struct Subscription {
    session: Arc<Session>,
    receiver: broadcast::Receiver<Frame>,
}

impl Subscription {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn recv(&mut self) -> Result<Frame, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.session.unsubscribe();
    }
}

/// Explicit registry of heat sessions keyed by opaque session key.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    settings: SessionSettings,
    metrics: TransportMetrics,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings, metrics: TransportMetrics) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn get(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(key).cloned()
    }

    /// Fetch `key`, creating it (and starting it when autostart is on).
    pub fn get_or_create(&self, key: &str) -> Result<Arc<Session>, SimError> {
        let (session, created) = {
            let mut sessions = self.sessions.lock();
            self.entry(&mut sessions, key)?
        };
        if created {
            self.announce(&session);
        }
        Ok(session)
    }

    /// Attach a subscriber to `key`, creating the session if needed.
    ///
    /// The subscriber is counted while the registry lock is held, so idle
    /// reaping and [`Self::remove_if_unsubscribed`] always observe it.
    pub fn subscribe(&self, key: &str) -> Result<Subscription, SimError> {
        let (subscription, created) = {
            let mut sessions = self.sessions.lock();
            let (session, created) = self.entry(&mut sessions, key)?;
            (session.subscribe(), created)
        };
        if created {
            self.announce(subscription.session());
        }
        Ok(subscription)
    }

    fn entry(
        &self,
        sessions: &mut HashMap<String, Arc<Session>>,
        key: &str,
    ) -> Result<(Arc<Session>, bool), SimError> {
        if let Some(existing) = sessions.get(key) {
            return Ok((Arc::clone(existing), false));
        }
        let generator =
            HeatGenerator::with_config(self.settings.default_seed, now_ms(), self.settings.generator)?;
        let session = Arc::new(Session::new(
            key.to_owned(),
            generator,
            &self.settings,
            self.metrics.clone(),
        ));
        sessions.insert(key.to_owned(), Arc::clone(&session));
        self.metrics.sessions_active.set(sessions.len() as i64);
        Ok((session, true))
    }

    fn announce(&self, session: &Arc<Session>) {
        info!(session = %session.key, seed = self.settings.default_seed, "session created");
        if self.settings.autostart {
            session.start(None);
        }
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Session>> {
        let removed = {
            let mut sessions = self.sessions.lock();
            let removed = sessions.remove(key);
            self.metrics.sessions_active.set(sessions.len() as i64);
            removed
        };
        removed.inspect(|session| retire(session))
    }

    /// Remove `key` unless a connection is subscribed to it.
    pub fn remove_if_unsubscribed(&self, key: &str) -> Option<Arc<Session>> {
        let removed = {
            let mut sessions = self.sessions.lock();
            if sessions.get(key)?.subscriber_count() > 0 {
                return None;
            }
            let removed = sessions.remove(key);
            self.metrics.sessions_active.set(sessions.len() as i64);
            removed
        };
        removed.inspect(|session| retire(session))
    }

    /// Remove sessions that have had no subscriber for at least the idle timeout.
    pub fn reap_idle(&self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();
        {
            let mut sessions = self.sessions.lock();
            sessions.retain(|_, session| {
                let idle = session
                    .idle_for(now)
                    .is_some_and(|idle| idle >= self.settings.idle_timeout);
                if idle {
                    expired.push(Arc::clone(session));
                }
                !idle
            });
            self.metrics.sessions_active.set(sessions.len() as i64);
        }
        let mut keys: Vec<String> = expired
            .iter()
            .map(|session| {
                retire(session);
                session.key.clone()
            })
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.sessions.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eaf_msg::{decode, Inbound, Stage};
    use prometheus::Registry;

    fn registry(autostart: bool, tick_interval: Duration) -> SessionRegistry {
        let settings = SessionSettings {
            tick_interval,
            idle_timeout: Duration::from_millis(500),
            autostart,
            ..SessionSettings::default()
        };
        let metrics = TransportMetrics::register(&Registry::new()).unwrap();
        SessionRegistry::new(settings, metrics)
    }

    fn server_message(frame: &Frame) -> ServerMessage {
        match decode::<ServerMessage>(frame).unwrap() {
            Inbound::Message(message) => message,
            Inbound::Unknown { kind } => panic!("unexpected kind {kind}"),
        }
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_key() {
        let registry = registry(false, Duration::from_secs(1));
        let a = registry.get_or_create("heat-a").unwrap();
        let b = registry.get_or_create("heat-b").unwrap();
        let again = registry.get_or_create("heat-a").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(registry.keys(), vec!["heat-a", "heat-b"]);

        a.start(None);
        for _ in 0..3 {
            a.advance();
            b.advance();
        }
        assert_eq!(a.snapshot().status.elapsed_sec, 3);
        assert_eq!(b.snapshot().status.elapsed_sec, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_ticks_in_order() {
        let registry = registry(false, Duration::from_secs(60));
        let session = registry.get_or_create("heat-1").unwrap();
        let mut first = session.subscribe();
        let mut second = session.subscribe();
        assert_eq!(session.subscriber_count(), 2);

        session.start(Some(7));
        for _ in 0..5 {
            session.advance();
        }

        for subscription in [&mut first, &mut second] {
            let status = server_message(&subscription.recv().await.unwrap());
            assert!(matches!(status, ServerMessage::SimulationStatus(s) if s.running));
            let mut last = i64::MIN;
            for _ in 0..5 {
                match server_message(&subscription.recv().await.unwrap()) {
                    ServerMessage::SimulationTick(tick) => {
                        assert!(tick.timestamp > last);
                        last = tick.timestamp;
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
        assert_eq!(session.snapshot().seed, 7);
    }

    #[tokio::test]
    async fn scenario_notification_follows_tick() {
        let registry = registry(false, Duration::from_secs(60));
        let session = registry.get_or_create("heat-1").unwrap();
        session.start(None);
        let mut subscription = session.subscribe();
        session.inject_scenario(eaf_sim::lookup("energy-spike").unwrap());
        session.advance();

        let tick = server_message(&subscription.recv().await.unwrap());
        assert!(matches!(tick, ServerMessage::SimulationTick(t) if t.note.as_deref() == Some("energy-spike")));
        let applied = server_message(&subscription.recv().await.unwrap());
        assert!(matches!(applied, ServerMessage::ScenarioApplied(p) if p.sim_second == 1));
    }

    #[tokio::test]
    async fn generator_fault_becomes_error_frame() {
        let registry = registry(false, Duration::from_secs(60));
        let session = registry.get_or_create("heat-1").unwrap();
        session.start(None);
        let mut subscription = session.subscribe();
        session.inject_scenario(ScenarioInjection::new(
            "overflow",
            eaf_sim::TickDelta {
                temperature_c: Some(f64::NAN),
                ..eaf_sim::TickDelta::default()
            },
        ));
        session.advance();
        session.advance();

        let error = server_message(&subscription.recv().await.unwrap());
        assert!(matches!(error, ServerMessage::Error(payload) if payload.message.contains("temperatureC")));
        let next = server_message(&subscription.recv().await.unwrap());
        assert!(matches!(next, ServerMessage::SimulationTick(_)));
        assert_eq!(registry.metrics.generator_faults.get(), 1);
    }

    #[tokio::test]
    async fn stopped_session_does_not_tick() {
        let registry = registry(false, Duration::from_secs(60));
        let session = registry.get_or_create("heat-1").unwrap();
        session.advance();
        assert_eq!(session.snapshot().status.elapsed_sec, 0);
        session.start(None);
        session.advance();
        session.stop();
        session.advance();
        assert_eq!(session.snapshot().status.elapsed_sec, 1);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn reset_keeps_seed_unless_overridden() {
        let registry = registry(false, Duration::from_secs(60));
        let session = registry.get_or_create("heat-1").unwrap();
        session.start(None);
        for _ in 0..130 {
            session.advance();
        }
        assert_eq!(session.snapshot().status.stage, Stage::Melt);
        let status = session.reset(None);
        assert_eq!(status.status.elapsed_sec, 0);
        assert_eq!(status.status.stage, Stage::Bor);
        assert_eq!(session.snapshot().seed, 42);
        session.reset(Some(9));
        assert_eq!(session.snapshot().seed, 9);
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn autostart_ticks_on_interval() {
        let registry = registry(true, Duration::from_millis(10));
        let session = registry.get_or_create("heat-1").unwrap();
        let mut subscription = session.subscribe();
        let tick = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let ServerMessage::SimulationTick(tick) =
                    server_message(&subscription.recv().await.unwrap())
                {
                    break tick;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(tick.stage, Stage::Bor);
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn idle_sessions_are_reaped() {
        let registry = registry(false, Duration::from_secs(60));
        let busy = registry.get_or_create("busy").unwrap();
        let _subscription = busy.subscribe();
        let idle = registry.get_or_create("idle").unwrap();
        drop(idle.subscribe());

        assert!(registry.reap_idle(Instant::now()).is_empty());
        let reaped = registry.reap_idle(Instant::now() + Duration::from_secs(1));
        assert_eq!(reaped, vec!["idle".to_string()]);
        assert_eq!(registry.keys(), vec!["busy"]);
        assert_eq!(registry.metrics.sessions_active.get(), 1);
    }

    #[tokio::test]
    async fn registry_subscription_keeps_idle_session_registered() {
        let registry = registry(false, Duration::from_secs(60));
        let created = registry.get_or_create("heat-1").unwrap();
        let later = Instant::now() + Duration::from_secs(1);

        let subscription = registry.subscribe("heat-1").unwrap();
        assert!(Arc::ptr_eq(subscription.session(), &created));
        assert!(registry.reap_idle(later).is_empty());
        assert!(registry.remove_if_unsubscribed("heat-1").is_none());
        assert!(Arc::ptr_eq(&registry.get("heat-1").unwrap(), &created));

        drop(subscription);
        assert!(registry.remove_if_unsubscribed("heat-1").is_some());
        assert!(registry.is_empty());
        assert_eq!(registry.metrics.sessions_active.get(), 0);
    }

    #[test]
    fn concurrent_reaping_never_detaches_a_live_subscriber() {
        use std::sync::atomic::AtomicBool;
        use std::thread;

        let registry = Arc::new(registry(false, Duration::from_secs(60)));
        let done = Arc::new(AtomicBool::new(false));
        let reaper = {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    registry.reap_idle(Instant::now() + Duration::from_secs(1));
                    registry.remove_if_unsubscribed("heat-1");
                }
            })
        };

        for _ in 0..2_000 {
            let subscription = registry.subscribe("heat-1").unwrap();
            let registered = registry.get("heat-1").expect("subscribed session was removed");
            assert!(Arc::ptr_eq(subscription.session(), &registered));
        }
        done.store(true, Ordering::SeqCst);
        reaper.join().unwrap();
    }
}
