//! ---
//! eaf_section: "02-messaging-wire-protocol"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Message schema helpers and protocol codecs."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
//! JSON wire protocol spoken between the transport server and streaming clients.
//!
//! Every message is an object `{ "type": <kind>, "payload": <object> }`. Decoding
//! tolerates unknown kinds so that older clients keep working when the server
//! grows new message types.
#![warn(missing_docs)]

pub mod codec;
pub mod logging;
pub mod types;

/// Shared result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The text was not a JSON object carrying a string `type` field.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The `type` was recognised but its payload did not match the schema.
    #[error("invalid payload for '{kind}': {source}")]
    InvalidPayload {
        /// Message kind taken from the `type` discriminator.
        kind: String,
        /// Underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },
    /// Serialization of an outbound message failed.
    #[error("unable to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

pub use codec::{decode, encode, Inbound, WireMessage};
pub use logging::{log_message, MessageDirection};
pub use types::{
    ClientMessage, ErrorPayload, GeneratorStatus, HeatSnapshot, PingPayload, PongPayload,
    Recommendation, ScenarioAppliedPayload, ServerMessage, SimulationStatusPayload, Stage,
    SubscribePayload, Tick, Urgency,
};
