//! JSON codec.
//!
//! Outbound: any `Serialize` value is encoded exactly once into `Bytes`,
//! which fan-out then shares between all recipient queues without copying.
//!
//! Inbound: a frame decodes to [`Inbound::Known`] when its `kind` is one of
//! the hub's own kinds, or to [`Inbound::Unknown`] otherwise. Unknown kinds
//! are not an error; they are left for pluggable handlers or ignored.

use bytes::Bytes;
use hub_core::Envelope;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::wire_types::{Kind, DISCRIMINATOR};

#[derive(Debug, Error)]
pub enum CodecError {
    /// The outbound payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The object has no string `kind` field.
    #[error("frame has no string `kind` field")]
    MissingKind,

    /// A known kind whose fields do not match the envelope.
    #[error("invalid `{kind}` frame: {source}")]
    InvalidEnvelope {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Known(Envelope),
    Unknown { kind: String, body: Value },
}

impl Inbound {
    pub fn kind(&self) -> &str {
        match self {
            Inbound::Known(env) => env.kind(),
            Inbound::Unknown { kind, .. } => kind,
        }
    }
}

/// Serialize a payload into one frame.
pub fn encode<T>(message: &T) -> Result<Bytes, CodecError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(CodecError::Encode)
}

/// Decode one inbound frame.
pub fn decode_inbound(frame: &[u8]) -> Result<Inbound, CodecError> {
    let value: Value = serde_json::from_slice(frame).map_err(CodecError::InvalidJson)?;
    let kind = kind_of(&value)?.to_owned();

    match Kind::from_wire(&kind) {
        Some(_) => serde_json::from_value(value)
            .map(Inbound::Known)
            .map_err(|source| CodecError::InvalidEnvelope { kind, source }),
        None => Ok(Inbound::Unknown { kind, body: value }),
    }
}

fn kind_of(value: &Value) -> Result<&str, CodecError> {
    value
        .as_object()
        .ok_or(CodecError::NotAnObject)?
        .get(DISCRIMINATOR)
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingKind)
}
