//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Resilient streaming client exports."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
//! Resilient streaming client for the EAF telemetry stream.
//!
//! [`StreamClient`] is a sans-IO state machine: it is fed transport events and
//! millisecond timestamps and answers with [`ClientAction`]s plus pushes into a
//! [`StateSink`]. [`spawn_client`] drives it on tokio over a real WebSocket.

pub mod core;
pub mod endpoint;
pub mod metrics;
pub mod ring;
pub mod runtime;
pub mod scheduler;
pub mod sink;

pub use crate::core::{ClientAction, ClientSettings, CloseKind, ConnectionState, StreamClient};
pub use endpoint::Endpoint;
pub use metrics::ConnectionMetrics;
pub use ring::{BufferedTick, TickRingBuffer};
pub use runtime::{spawn_client, StreamingClientHandle};
pub use scheduler::{TaskKind, TaskScheduler};
pub use sink::{ChannelSink, SinkEvent, StateSink, TickEvent, TracingSink};

/// Errors surfaced to the owner of a streaming client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid page url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported page scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
    #[error("client task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
