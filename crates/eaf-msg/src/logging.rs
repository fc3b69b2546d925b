//! ---
//! eaf_section: "02-messaging-wire-protocol"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Message schema helpers and protocol codecs."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use tracing::{debug, trace};

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message written to a connection.
    Outbound,
    /// Message read from a connection.
    Inbound,
    /// Buffered tick re-emitted while the connection is down.
    Replay,
}

/// Emit a structured log entry for message activity.
///
/// Tick traffic is logged at trace level since it arrives every second per session.
pub fn log_message(direction: MessageDirection, kind: &str, session: Option<&str>) {
    if matches!(kind, "simulation_tick" | "ping" | "pong") || direction == MessageDirection::Replay
    {
        trace!(kind, session = session.unwrap_or(""), direction = ?direction, "messaging activity");
    } else {
        debug!(kind, session = session.unwrap_or(""), direction = ?direction, "messaging activity");
    }
}
