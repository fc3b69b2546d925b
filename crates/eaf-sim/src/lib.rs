//! ---
//! eaf_section: "11-simulation"
//! eaf_subsection: "01-bootstrap"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Simulation runtime module exports and shared types."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
//! Deterministic heat generator for the EAF demo stream.
//!
//! A [`HeatGenerator`] advances one simulated second per [`HeatGenerator::tick`]
//! call. Two generators built from the same seed, epoch and configuration emit
//! identical tick sequences, which keeps demos exactly reproducible.

pub mod generator;
pub mod jitter;
pub mod scenario;

pub use generator::{GeneratorConfig, HeatGenerator, ScenarioApplied, MASS_TONNES};
pub use jitter::{parse_seed, SeededJitter};
pub use scenario::{catalog, lookup, ScenarioInjection, TickDelta};

/// Errors raised by the simulator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    /// Generator parameters violate an invariant; raised at construction.
    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),
    /// A seed string could not be interpreted.
    #[error("invalid seed '{0}': expected a decimal or 0x-prefixed hexadecimal integer")]
    InvalidSeed(String),
    /// A tick field left the finite range, usually after an extreme scenario delta.
    #[error("generator produced a non-finite {field} at simulated second {sim_second}")]
    NonFinite {
        /// Offending tick field.
        field: &'static str,
        /// Simulated second of the faulty tick.
        sim_second: u64,
    },
    /// No catalog entry matches the requested scenario id.
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
}
