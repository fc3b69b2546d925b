//! ---
//! eaf_section: "01-core-functionality"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Shared primitives and utilities for the stream runtime."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
//! Core shared primitives for the EAF stream workspace.
//! This crate exposes configuration loading, logging bootstrap, and clock
//! helpers consumed by the simulator, the transport server and the client.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, ClientConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, ServerConfig,
    SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::now_ms;
