//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Transport server exports."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
//! Transport server for EAF heat sessions.
//!
//! * [`websocket`] streams session ticks on `/ws` and answers latency probes.
//! * [`rest`] exposes the demo control endpoints under `/demo/:session`.
//! * [`session`] owns one generator and one ticker per session key.

pub mod metrics;
pub mod rest;
pub mod server;
pub mod session;
pub mod websocket;

pub use metrics::TransportMetrics;
pub use rest::{ControlError, ScenarioRequest, SeedRequest};
pub use server::{TransportServerBuilder, TransportServerHandle};
pub use session::{Session, SessionRegistry, SessionSettings, Subscription};
