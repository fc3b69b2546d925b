//! ---
//! eaf_section: "02-messaging-wire-protocol"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Message schema helpers and protocol codecs."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{ClientMessage, ServerMessage};
use crate::{ProtocolError, Result};

/// Message families that know which `type` discriminators they understand.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Every discriminator (including aliases) the family can decode.
    const KINDS: &'static [&'static str];
}

impl WireMessage for ClientMessage {
    const KINDS: &'static [&'static str] = &["subscribe", "ping"];
}

impl WireMessage for ServerMessage {
    const KINDS: &'static [&'static str] = &[
        "simulation_tick",
        "tick",
        "pong",
        "heat_data",
        "snapshot",
        "error",
        "scenario_applied",
        "simulation_status",
    ];
}

/// Outcome of decoding a well-formed envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<T> {
    /// A message of a known kind.
    Message(T),
    /// A syntactically valid envelope whose kind this build does not know.
    Unknown {
        /// The unrecognised discriminator.
        kind: String,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Decode a text frame.
///
/// Unknown kinds are returned as [`Inbound::Unknown`] rather than an error so that
/// callers can ignore them without treating them as malformed input.
pub fn decode<T: WireMessage>(text: &str) -> Result<Inbound<T>> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    if !T::KINDS.contains(&envelope.kind.as_str()) {
        return Ok(Inbound::Unknown {
            kind: envelope.kind,
        });
    }
    serde_json::from_str::<T>(text)
        .map(Inbound::Message)
        .map_err(|source| ProtocolError::InvalidPayload {
            kind: envelope.kind,
            source,
        })
}

/// Encode a message into a text frame.
pub fn encode<T: WireMessage>(message: &T) -> Result<String> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PingPayload;

    #[test]
    fn decodes_known_client_message() {
        let decoded: Inbound<ClientMessage> =
            decode(r#"{"type":"ping","payload":{"timestamp":1700000000000}}"#).unwrap();
        assert_eq!(
            decoded,
            Inbound::Message(ClientMessage::Ping(PingPayload {
                timestamp: 1_700_000_000_000
            }))
        );
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let decoded: Inbound<ServerMessage> =
            decode(r#"{"type":"kpi_update","payload":{"oee":0.91}}"#).unwrap();
        assert_eq!(
            decoded,
            Inbound::Unknown {
                kind: "kpi_update".into()
            }
        );
    }

    #[test]
    fn non_json_is_malformed() {
        let err = decode::<ServerMessage>("not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = decode::<ClientMessage>(r#"{"payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn bad_payload_reports_kind() {
        let err = decode::<ClientMessage>(r#"{"type":"subscribe","payload":{"session":1}}"#)
            .unwrap_err();
        match err {
            ProtocolError::InvalidPayload { kind, .. } => assert_eq!(kind, "subscribe"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn every_server_kind_is_declared() -> anyhow::Result<()> {
        let error = encode(&ServerMessage::error("boom"))?;
        assert!(matches!(
            decode::<ServerMessage>(&error)?,
            Inbound::Message(ServerMessage::Error(_))
        ));
        Ok(())
    }
}
