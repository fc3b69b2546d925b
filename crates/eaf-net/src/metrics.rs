//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Prometheus instruments for the transport server."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Prometheus metric handles for transport activity.
#[derive(Clone)]
pub struct TransportMetrics {
    pub connections_active: IntGauge,
    pub sessions_active: IntGauge,
    pub ticks_broadcast: IntCounter,
    pub malformed_messages: IntCounter,
    pub pings: IntCounter,
    pub generator_faults: IntCounter,
}

impl TransportMetrics {
    /// Register transport metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let connections_active = IntGauge::with_opts(Opts::new(
            "eaf_connections_active",
            "Open WebSocket connections",
        ))?;
        let sessions_active = IntGauge::with_opts(Opts::new(
            "eaf_sessions_active",
            "Heat sessions held by the registry",
        ))?;
        let ticks_broadcast = IntCounter::with_opts(Opts::new(
            "eaf_ticks_broadcast_total",
            "Generator ticks fanned out to session subscribers",
        ))?;
        let malformed_messages = IntCounter::with_opts(Opts::new(
            "eaf_malformed_messages_total",
            "Inbound frames dropped because they could not be decoded",
        ))?;
        let pings = IntCounter::with_opts(Opts::new(
            "eaf_pings_total",
            "Latency probes answered",
        ))?;
        let generator_faults = IntCounter::with_opts(Opts::new(
            "eaf_generator_faults_total",
            "Generator ticks that failed and were reported as errors",
        ))?;

        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(sessions_active.clone()))?;
        registry.register(Box::new(ticks_broadcast.clone()))?;
        registry.register(Box::new(malformed_messages.clone()))?;
        registry.register(Box::new(pings.clone()))?;
        registry.register(Box::new(generator_faults.clone()))?;

        Ok(Self {
            connections_active,
            sessions_active,
            ticks_broadcast,
            malformed_messages,
            pings,
            generator_faults,
        })
    }
}
