//! Realtime channel payloads.
//!
//! Everything delivered over the pub/sub channel is one of the shapes below,
//! decoded with [`ChannelEvent::decode`] at the subscription boundary.
//! Payloads that do not match a known shape are rejected there and never
//! reach the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::{MessageKind, PresenceStatus, RoomId, UserId};

/// Topic carrying presence updates for the whole cohort. Room-scoped events
/// ride `room:<uuid>` topics instead (see [`RoomId::to_topic`]).
pub const PRESENCE_TOPIC: &str = "presence";

/// A message as the backend represents it: the shape returned by the write
/// and read endpoints and carried in full-payload broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePayload {
    pub id: Uuid,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Echo of the client-generated correlation id, when the backend
    /// forwards it. Absent on rows written by other clients' older versions.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: UserId,
}

/// A row-change notification. The full record is included when the backend
/// considers the payload self-contained; otherwise only the reference
/// columns arrive and the subscriber re-fetches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRow {
    pub id: Uuid,
    pub room_id: RoomId,
    pub author_id: UserId,
    #[serde(default)]
    pub record: Option<MessagePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RowEvent {
    Inserted { row: MessageRow },
    Updated { row: MessageRow },
}

impl RowEvent {
    pub fn row(&self) -> &MessageRow {
        match self {
            RowEvent::Inserted { row } | RowEvent::Updated { row } => row,
        }
    }
}

/// Presence state replicated between clients. Doubles as the heartbeat:
/// a client re-publishes its entry on a fixed interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub user_id: UserId,
    pub status: PresenceStatus,
    pub active_rooms: Vec<RoomId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingSignal {
    pub room_id: RoomId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionUpdate {
    pub room_id: RoomId,
    pub message_id: Uuid,
    pub user_id: UserId,
    pub emoji: String,
    pub action: ReactionAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Delivered,
    Read,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub room_id: RoomId,
    pub message_id: Uuid,
    pub user_id: UserId,
    pub kind: ReceiptKind,
}

/// Freeform broadcasts, as opposed to row-change notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    Presence(PresenceUpdate),
    TypingStart(TypingSignal),
    TypingStop(TypingSignal),
    Message(MessagePayload),
    Reaction(ReactionUpdate),
    Receipt(DeliveryReceipt),
}

/// Every event a subscription can deliver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ChannelEvent {
    Row(RowEvent),
    Broadcast(BroadcastEvent),
}

impl ChannelEvent {
    /// Decode a raw payload received on `topic`, enforcing that the payload
    /// is scoped to the topic it arrived on. Unknown shapes fail here.
    pub fn decode(topic: &str, payload: &serde_json::Value) -> Result<Self, ProtocolError> {
        let event: ChannelEvent = serde_json::from_value(payload.clone())?;

        match (topic, event.room_id()) {
            (PRESENCE_TOPIC, None) => Ok(event),
            (PRESENCE_TOPIC, Some(_)) | (_, None) => Err(ProtocolError::UnexpectedTopic {
                topic: topic.to_string(),
            }),
            (_, Some(room)) if topic == room.to_topic() => Ok(event),
            (_, Some(room)) => Err(ProtocolError::RoomMismatch {
                topic: topic.to_string(),
                payload: room,
            }),
        }
    }

    /// The room this event is scoped to, or `None` for cohort-wide presence.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            ChannelEvent::Row(row) => Some(row.row().room_id),
            ChannelEvent::Broadcast(b) => match b {
                BroadcastEvent::Presence(_) => None,
                BroadcastEvent::TypingStart(t) | BroadcastEvent::TypingStop(t) => Some(t.room_id),
                BroadcastEvent::Message(m) => Some(m.room_id),
                BroadcastEvent::Reaction(r) => Some(r.room_id),
                BroadcastEvent::Receipt(r) => Some(r.room_id),
            },
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value, ProtocolError> {
        Ok(serde_json::to_value(self)?)
    }
}
