use thiserror::Error;

use crate::types::RoomId;

/// Errors produced while decoding realtime channel payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload is not valid JSON or does not match any known event shape.
    #[error("Unrecognized channel payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The payload parsed but is scoped to a different room than the topic
    /// it arrived on.
    #[error("Payload for room {payload} arrived on topic {topic}")]
    RoomMismatch { topic: String, payload: RoomId },

    /// The payload kind is not valid for the topic it arrived on.
    #[error("Payload not valid for topic {topic}")]
    UnexpectedTopic { topic: String },
}
