use std::sync::Arc;

use seminar_chat::Message;
use seminar_shared::types::{ChannelState, PresenceStatus, RoomId, UserId};

/// Typed events the client emits towards the host UI.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A room's message list changed; `snapshot` is the full immutable view.
    Timeline {
        room: RoomId,
        snapshot: Arc<Vec<Message>>,
    },
    /// A send was rolled back; `content` should be restored to the compose
    /// field.
    SendFailed {
        room: RoomId,
        content: String,
        error: String,
    },
    /// A peer's presence changed.
    PresenceChanged {
        user_id: UserId,
        status: PresenceStatus,
    },
    /// The set of users typing in a room changed.
    TypingChanged { room: RoomId, users: Vec<UserId> },
    /// Realtime connectivity changed. `Degraded` is the only user-visible
    /// trace of channel trouble.
    ConnectionChanged(ChannelState),
}
