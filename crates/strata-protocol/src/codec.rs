//! JSON encoding of [`Message`] with an integer `type` discriminator.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::messages::{Message, MessageType};

/// Name of the discriminator field.
pub const TYPE_FIELD: &str = "type";

/// Errors produced while encoding or decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON or a payload field has the wrong shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level JSON value is not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The object has no integer `type` field.
    #[error("missing or non-integer `type` field")]
    MissingType,

    /// The `type` field holds an unknown discriminator.
    #[error("unknown message type {0}")]
    UnknownType(u64),
}

/// Encode a message as a JSON object string.
pub fn encode(message: &Message) -> Result<String, CodecError> {
    let mut object = match message {
        Message::Handshake(p) => payload_object(p)?,
        Message::InputFrame(p) => payload_object(p)?,
        Message::TerraformRequest(p) => payload_object(p)?,
        Message::ChunkRequest(p) => payload_object(p)?,
        Message::Ping(p) => payload_object(p)?,
        Message::Disconnect(p) => payload_object(p)?,
        Message::SpellCastRequest(p) => payload_object(p)?,
        Message::HandshakeResponse(p) => payload_object(p)?,
        Message::StateSnapshot(p) => payload_object(p)?,
        Message::EntitySpawn(p) => payload_object(p)?,
        Message::EntityDespawn(p) => payload_object(p)?,
        Message::ProjectileHit(p) => payload_object(p)?,
        Message::NpcEvent(p) => payload_object(p)?,
        Message::TerraformApplied(p) => payload_object(p)?,
        Message::ChunkData(p) => payload_object(p)?,
        Message::Pong(p) => payload_object(p)?,
        Message::Error(p) => payload_object(p)?,
        Message::PlayerJoined(p) => payload_object(p)?,
        Message::PlayerLeft(p) => payload_object(p)?,
        Message::SpellCastEvent(p) => payload_object(p)?,
    };
    object.insert(
        TYPE_FIELD.to_owned(),
        Value::from(message.message_type() as u16),
    );
    Ok(serde_json::to_string(&Value::Object(object))?)
}

/// Decode a JSON object string into a message.
///
/// The discriminator is read first and matched explicitly; the payload is
/// then deserialized into the struct for that type. Unknown extra fields are
/// ignored.
pub fn decode(text: &str) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(CodecError::NotAnObject);
    }
    let raw = value
        .get(TYPE_FIELD)
        .and_then(Value::as_u64)
        .ok_or(CodecError::MissingType)?;
    let ty = u16::try_from(raw)
        .ok()
        .and_then(|r| MessageType::try_from(r).ok())
        .ok_or(CodecError::UnknownType(raw))?;

    Ok(match ty {
        MessageType::Handshake => Message::Handshake(payload(value)?),
        MessageType::InputFrame => Message::InputFrame(payload(value)?),
        MessageType::TerraformRequest => Message::TerraformRequest(payload(value)?),
        MessageType::ChunkRequest => Message::ChunkRequest(payload(value)?),
        MessageType::Ping => Message::Ping(payload(value)?),
        MessageType::Disconnect => Message::Disconnect(payload(value)?),
        MessageType::SpellCastRequest => Message::SpellCastRequest(payload(value)?),
        MessageType::HandshakeResponse => Message::HandshakeResponse(payload(value)?),
        MessageType::StateSnapshot => Message::StateSnapshot(payload(value)?),
        MessageType::EntitySpawn => Message::EntitySpawn(payload(value)?),
        MessageType::EntityDespawn => Message::EntityDespawn(payload(value)?),
        MessageType::ProjectileHit => Message::ProjectileHit(payload(value)?),
        MessageType::NpcEvent => Message::NpcEvent(payload(value)?),
        MessageType::TerraformApplied => Message::TerraformApplied(payload(value)?),
        MessageType::ChunkData => Message::ChunkData(payload(value)?),
        MessageType::Pong => Message::Pong(payload(value)?),
        MessageType::Error => Message::Error(payload(value)?),
        MessageType::PlayerJoined => Message::PlayerJoined(payload(value)?),
        MessageType::PlayerLeft => Message::PlayerLeft(payload(value)?),
        MessageType::SpellCastEvent => Message::SpellCastEvent(payload(value)?),
    })
}

fn payload_object<T: Serialize>(payload: &T) -> Result<Map<String, Value>, CodecError> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(CodecError::NotAnObject),
    }
}

fn payload<T: DeserializeOwned>(value: Value) -> Result<T, CodecError> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
