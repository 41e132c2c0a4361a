//! The embedding surface: one [`SeminarClient`] per signed-in user.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;

use seminar_chat::{
    spawn_room, ChatError, MessageReader, MessageWriter, PresenceStore, RoomHandle, RoomUpdate,
};
use seminar_proctor::QuizSession;
use seminar_realtime::{
    spawn_channel, ChannelCommand, ChannelConfig, Connector, RetryPolicy,
};
use seminar_shared::constants::RECONNECT_JITTER_MS;
use seminar_shared::identity::Identity;
use seminar_shared::types::{MessageKind, RoomId, UserId};

use crate::api::{ApiError, ViolationSink};
use crate::bridge::{run_bridge, ClientCommand};
use crate::config::ClientConfig;
use crate::events::ClientEvent;

/// Handle to a running client. Clone-cheap; all state lives in the bridge
/// task, the room workers, and the shared presence store.
pub struct SeminarClient<A> {
    identity: Identity,
    api: Arc<A>,
    channel_cmd_tx: mpsc::Sender<ChannelCommand>,
    bridge_cmd_tx: mpsc::Sender<ClientCommand>,
    presence: Arc<Mutex<PresenceStore>>,
    rooms: Arc<Mutex<HashMap<RoomId, RoomHandle>>>,
    room_updates_tx: mpsc::Sender<RoomUpdate>,
}

impl<A> Clone for SeminarClient<A> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            api: Arc::clone(&self.api),
            channel_cmd_tx: self.channel_cmd_tx.clone(),
            bridge_cmd_tx: self.bridge_cmd_tx.clone(),
            presence: Arc::clone(&self.presence),
            rooms: Arc::clone(&self.rooms),
            room_updates_tx: self.room_updates_tx.clone(),
        }
    }
}

/// Start the realtime channel and the bridge, returning the client handle
/// and the stream of typed events for the host UI.
pub fn connect<C, A>(
    identity: Identity,
    config: ClientConfig,
    connector: C,
    api: Arc<A>,
) -> (SeminarClient<A>, mpsc::Receiver<ClientEvent>)
where
    C: Connector,
    A: MessageWriter + MessageReader + ViolationSink,
{
    let channel_config = ChannelConfig {
        retry: RetryPolicy::new(
            config.reconnect_delay,
            std::time::Duration::from_millis(RECONNECT_JITTER_MS),
        ),
        ..ChannelConfig::default()
    };
    let (channel_cmd_tx, channel_notif_rx) = spawn_channel(connector, channel_config);

    let (bridge_cmd_tx, bridge_cmd_rx) = mpsc::channel(64);
    let (events_tx, events_rx) = mpsc::channel(256);
    let (room_updates_tx, room_updates_rx) = mpsc::channel(256);

    let presence = Arc::new(Mutex::new(PresenceStore::with_timeouts(
        config.heartbeat_interval * 2,
        config.typing_window,
    )));
    let rooms: Arc<Mutex<HashMap<RoomId, RoomHandle>>> = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(run_bridge(
        identity.clone(),
        config,
        Arc::clone(&presence),
        Arc::clone(&rooms),
        channel_cmd_tx.clone(),
        channel_notif_rx,
        bridge_cmd_rx,
        room_updates_rx,
        events_tx,
    ));

    let client = SeminarClient {
        identity,
        api,
        channel_cmd_tx,
        bridge_cmd_tx,
        presence,
        rooms,
        room_updates_tx,
    };
    (client, events_rx)
}

impl<A> SeminarClient<A>
where
    A: MessageWriter + MessageReader + ViolationSink,
{
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Join a room: spawn its worker, subscribe its topic, and announce the
    /// new membership. Idempotent.
    pub async fn join_room(&self, room: RoomId) -> Result<(), ChatError> {
        {
            let mut rooms = self.rooms.lock().expect("rooms lock");
            if rooms.contains_key(&room) {
                return Ok(());
            }
            let handle = spawn_room(
                room,
                self.identity.id,
                Arc::clone(&self.api),
                Arc::clone(&self.api),
                self.room_updates_tx.clone(),
            );
            rooms.insert(room, handle);
        }

        seminar_realtime::join_room(&self.channel_cmd_tx, room)
            .await
            .map_err(|_| ChatError::SubscriptionClosed)?;
        self.announce().await
    }

    /// Leave a room: stop its worker immediately and release the topic
    /// subscription.
    pub async fn leave_room(&self, room: RoomId) -> Result<(), ChatError> {
        let handle = self.rooms.lock().expect("rooms lock").remove(&room);
        let Some(handle) = handle else {
            return Ok(());
        };
        handle.close().await;

        seminar_realtime::leave_room(&self.channel_cmd_tx, room)
            .await
            .map_err(|_| ChatError::SubscriptionClosed)?;
        self.announce().await
    }

    /// Fire-and-forget text send; progress arrives as [`ClientEvent`]s.
    /// Validation and auth problems surface here, synchronously.
    pub async fn send_message(&self, room: RoomId, content: String) -> Result<(), ChatError> {
        self.send_with(room, MessageKind::Text, content, None).await
    }

    pub async fn send_with(
        &self,
        room: RoomId,
        kind: MessageKind,
        content: String,
        reply_to: Option<uuid::Uuid>,
    ) -> Result<(), ChatError> {
        let handle = self
            .rooms
            .lock()
            .expect("rooms lock")
            .get(&room)
            .cloned()
            .ok_or(ChatError::SubscriptionClosed)?;

        handle.send(kind, content, reply_to).await?;

        // Sending counts as going idle in the composer.
        let _ = self.bridge_cmd_tx.send(ClientCommand::Idle(room)).await;
        Ok(())
    }

    /// Forward a composer keystroke; the debouncer decides whether a typing
    /// broadcast goes out.
    pub async fn composer_input(&self, room: RoomId) {
        let _ = self.bridge_cmd_tx.send(ClientCommand::Input(room)).await;
    }

    /// The composer was cleared.
    pub async fn composer_idle(&self, room: RoomId) {
        let _ = self.bridge_cmd_tx.send(ClientCommand::Idle(room)).await;
    }

    /// Users currently shown online in a room.
    pub fn online_users(&self, room: RoomId) -> HashSet<UserId> {
        self.presence
            .lock()
            .expect("presence lock")
            .online_users(room, Instant::now())
    }

    /// Users currently typing in a room, expired entries pruned.
    pub fn typing_users(&self, room: RoomId) -> Vec<UserId> {
        self.presence
            .lock()
            .expect("presence lock")
            .typing_users(room, Instant::now())
            .into_iter()
            .map(|(user, _)| user)
            .collect()
    }

    /// Persist a completed quiz session summary for staff review.
    pub async fn submit_quiz_session(&self, session: &QuizSession) -> Result<(), ApiError> {
        self.api.submit(session).await
    }

    /// Stop the bridge, the room workers, and the realtime channel.
    pub async fn shutdown(&self) {
        for handle in self.rooms.lock().expect("rooms lock").values() {
            let handle = handle.clone();
            tokio::spawn(async move { handle.close().await });
        }
        let _ = self.bridge_cmd_tx.send(ClientCommand::Shutdown).await;
    }

    async fn announce(&self) -> Result<(), ChatError> {
        self.bridge_cmd_tx
            .send(ClientCommand::Announce)
            .await
            .map_err(|_| ChatError::SubscriptionClosed)
    }
}
