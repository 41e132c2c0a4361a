use tokio::sync::mpsc;
use tracing::debug;

use seminar_shared::protocol::{BroadcastEvent, ChannelEvent};
use seminar_shared::types::{ChannelState, RoomId};

/// Commands sent *into* the channel task.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Subscribe to a room's topic.
    Join(RoomId),
    /// Unsubscribe from a room's topic and release the subscription.
    Leave(RoomId),
    /// Publish a broadcast on a topic.
    Publish {
        topic: String,
        event: BroadcastEvent,
    },
    /// Gracefully shut down the channel.
    Shutdown,
}

/// Notifications sent *from* the channel task to the application.
#[derive(Debug, Clone)]
pub enum ChannelNotification {
    /// A validated event arrived on a subscribed topic.
    Event(ChannelEvent),
    /// The channel's connection health changed.
    StateChanged(ChannelState),
}

pub async fn join_room(
    cmd_tx: &mpsc::Sender<ChannelCommand>,
    room: RoomId,
) -> anyhow::Result<()> {
    debug!(room = %room, "Joining room topic");
    cmd_tx
        .send(ChannelCommand::Join(room))
        .await
        .map_err(|_| anyhow::anyhow!("Channel command queue closed"))
}

pub async fn leave_room(
    cmd_tx: &mpsc::Sender<ChannelCommand>,
    room: RoomId,
) -> anyhow::Result<()> {
    debug!(room = %room, "Leaving room topic");
    cmd_tx
        .send(ChannelCommand::Leave(room))
        .await
        .map_err(|_| anyhow::anyhow!("Channel command queue closed"))
}

pub async fn publish_broadcast(
    cmd_tx: &mpsc::Sender<ChannelCommand>,
    topic: impl Into<String>,
    event: BroadcastEvent,
) -> anyhow::Result<()> {
    cmd_tx
        .send(ChannelCommand::Publish {
            topic: topic.into(),
            event,
        })
        .await
        .map_err(|_| anyhow::anyhow!("Channel command queue closed"))
}
