//! Bridge between the realtime channel and the chat/presence stores.
//!
//! One task per client. It owns the typing debouncer, drives the presence
//! heartbeat, routes room-scoped channel events to the room workers, and
//! forwards their updates to the host UI as typed [`ClientEvent`]s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use seminar_chat::{PresenceStore, RoomHandle, RoomUpdate, TypingDebouncer, TypingTransition};
use seminar_realtime::{publish_broadcast, ChannelCommand, ChannelNotification};
use seminar_shared::identity::Identity;
use seminar_shared::protocol::{
    BroadcastEvent, ChannelEvent, PresenceUpdate, TypingSignal, PRESENCE_TOPIC,
};
use seminar_shared::types::{ChannelState, PresenceStatus, RoomId, UserId};

use crate::config::ClientConfig;
use crate::events::ClientEvent;

/// Commands from the client handle into the bridge task.
#[derive(Debug)]
pub(crate) enum ClientCommand {
    /// A keystroke landed in a room's composer.
    Input(RoomId),
    /// A room's composer emptied or its message was sent.
    Idle(RoomId),
    /// Re-publish the local presence entry (room membership changed).
    Announce,
    Shutdown,
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_bridge(
    identity: Identity,
    config: ClientConfig,
    presence: Arc<Mutex<PresenceStore>>,
    rooms: Arc<Mutex<HashMap<RoomId, RoomHandle>>>,
    channel_cmd_tx: mpsc::Sender<ChannelCommand>,
    mut channel_notif_rx: mpsc::Receiver<ChannelNotification>,
    mut bridge_cmd_rx: mpsc::Receiver<ClientCommand>,
    mut room_updates_rx: mpsc::Receiver<RoomUpdate>,
    events_tx: mpsc::Sender<ClientEvent>,
) {
    let mut debouncer = TypingDebouncer::with_window(config.typing_window);
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);

    info!(user = %identity.id, "Client bridge started");

    loop {
        // The debouncer's soonest deadline doubles as this loop's timer; a
        // quiet debouncer parks the arm far in the future.
        let typing_deadline = debouncer
            .next_deadline()
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            note = channel_notif_rx.recv() => match note {
                Some(ChannelNotification::StateChanged(state)) => {
                    presence
                        .lock()
                        .expect("presence lock")
                        .set_degraded(state != ChannelState::Connected);

                    if state == ChannelState::Connected {
                        // Reconnect: re-announce membership of every active room.
                        publish_presence(&identity, &rooms, &channel_cmd_tx).await;
                    }
                    let _ = events_tx.send(ClientEvent::ConnectionChanged(state)).await;
                }
                Some(ChannelNotification::Event(event)) => {
                    dispatch_event(&identity, &presence, &rooms, &events_tx, event).await;
                }
                None => {
                    warn!("Channel notification stream ended");
                    break;
                }
            },

            cmd = bridge_cmd_rx.recv() => match cmd {
                Some(ClientCommand::Input(room)) => {
                    if debouncer.on_input(room, Instant::now()) == Some(TypingTransition::Start) {
                        publish_typing(&channel_cmd_tx, room, identity.id, true).await;
                    }
                }
                Some(ClientCommand::Idle(room)) => {
                    if debouncer.on_idle(room) == Some(TypingTransition::Stop) {
                        publish_typing(&channel_cmd_tx, room, identity.id, false).await;
                    }
                }
                Some(ClientCommand::Announce) => {
                    publish_presence(&identity, &rooms, &channel_cmd_tx).await;
                }
                Some(ClientCommand::Shutdown) | None => break,
            },

            update = room_updates_rx.recv() => match update {
                Some(RoomUpdate::Timeline { room, snapshot }) => {
                    let _ = events_tx.send(ClientEvent::Timeline { room, snapshot }).await;
                }
                Some(RoomUpdate::SendFailed { room, content, error }) => {
                    let _ = events_tx
                        .send(ClientEvent::SendFailed { room, content, error })
                        .await;
                }
                None => break,
            },

            _ = heartbeat.tick() => {
                publish_presence(&identity, &rooms, &channel_cmd_tx).await;
                presence.lock().expect("presence lock").sweep(Instant::now());
            },

            _ = tokio::time::sleep_until(typing_deadline) => {
                for room in debouncer.poll_expired(Instant::now()) {
                    publish_typing(&channel_cmd_tx, room, identity.id, false).await;
                }
            },
        }
    }

    let _ = channel_cmd_tx.send(ChannelCommand::Shutdown).await;
    info!("Client bridge stopped");
}

/// Route one validated channel event to the store or worker that owns it.
async fn dispatch_event(
    identity: &Identity,
    presence: &Arc<Mutex<PresenceStore>>,
    rooms: &Arc<Mutex<HashMap<RoomId, RoomHandle>>>,
    events_tx: &mpsc::Sender<ClientEvent>,
    event: ChannelEvent,
) {
    match event {
        ChannelEvent::Broadcast(BroadcastEvent::Presence(update)) => {
            // Our own broadcasts come back on the shared topic.
            if update.user_id == identity.id {
                return;
            }
            presence
                .lock()
                .expect("presence lock")
                .observe(&update, Instant::now());
            let _ = events_tx
                .send(ClientEvent::PresenceChanged {
                    user_id: update.user_id,
                    status: update.status,
                })
                .await;
        }

        ChannelEvent::Broadcast(BroadcastEvent::TypingStart(signal)) => {
            if signal.user_id == identity.id {
                return;
            }
            let users = {
                let mut store = presence.lock().expect("presence lock");
                store.note_typing(signal.room_id, signal.user_id, Instant::now());
                typing_user_ids(&mut store, signal.room_id)
            };
            let _ = events_tx
                .send(ClientEvent::TypingChanged {
                    room: signal.room_id,
                    users,
                })
                .await;
        }

        ChannelEvent::Broadcast(BroadcastEvent::TypingStop(signal)) => {
            if signal.user_id == identity.id {
                return;
            }
            let users = {
                let mut store = presence.lock().expect("presence lock");
                store.clear_typing(signal.room_id, signal.user_id);
                typing_user_ids(&mut store, signal.room_id)
            };
            let _ = events_tx
                .send(ClientEvent::TypingChanged {
                    room: signal.room_id,
                    users,
                })
                .await;
        }

        // Everything else is timeline-scoped and belongs to a room worker.
        other => {
            let Some(room) = other.room_id() else {
                return;
            };
            let handle = rooms.lock().expect("rooms lock").get(&room).cloned();
            match handle {
                Some(handle) => {
                    if handle.deliver(other).await.is_err() {
                        debug!(room = %room, "Room worker gone, dropping event");
                    }
                }
                None => debug!(room = %room, "Event for room with no active subscription"),
            }
        }
    }
}

fn typing_user_ids(store: &mut PresenceStore, room: RoomId) -> Vec<UserId> {
    store
        .typing_users(room, Instant::now())
        .into_iter()
        .map(|(user, _)| user)
        .collect()
}

async fn publish_presence(
    identity: &Identity,
    rooms: &Arc<Mutex<HashMap<RoomId, RoomHandle>>>,
    channel_cmd_tx: &mpsc::Sender<ChannelCommand>,
) {
    let active_rooms: Vec<RoomId> = rooms
        .lock()
        .expect("rooms lock")
        .keys()
        .copied()
        .collect();
    let update = PresenceUpdate {
        user_id: identity.id,
        status: PresenceStatus::Online,
        active_rooms,
        at: Utc::now(),
    };

    if let Err(e) =
        publish_broadcast(channel_cmd_tx, PRESENCE_TOPIC, BroadcastEvent::Presence(update)).await
    {
        debug!(error = %e, "Presence publish failed");
    }
}

async fn publish_typing(
    channel_cmd_tx: &mpsc::Sender<ChannelCommand>,
    room: RoomId,
    user: UserId,
    start: bool,
) {
    let signal = TypingSignal {
        room_id: room,
        user_id: user,
    };
    let event = if start {
        BroadcastEvent::TypingStart(signal)
    } else {
        BroadcastEvent::TypingStop(signal)
    };

    if let Err(e) = publish_broadcast(channel_cmd_tx, room.to_topic(), event).await {
        debug!(error = %e, "Typing publish failed");
    }
}
