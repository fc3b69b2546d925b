//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Connection metrics snapshot published to the state sink."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use serde::Serialize;

/// Snapshot recomputed after every state change of the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetrics {
    /// Latest round-trip estimate from the latency probe.
    pub latency_ms: Option<i64>,
    pub is_replaying: bool,
    pub buffered_count: usize,
    /// Saturates at the configured cap once retries are exhausted.
    pub reconnect_attempts: u32,
    pub last_server_tick_timestamp: Option<i64>,
}
