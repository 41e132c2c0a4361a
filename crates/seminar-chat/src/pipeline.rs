//! Optimistic message pipeline.
//!
//! Each joined room gets one worker task that owns the room's
//! [`RoomTimeline`] and multiplexes three inputs on a single loop: UI
//! commands, resolutions of in-flight writes, and realtime channel events
//! routed in by the bridge. Writes never block the loop; they run in their
//! own task and report back over an internal channel, which also acts as the
//! stale-response guard: once the worker is gone, a late resolution has
//! nowhere to land and cannot mutate anything.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use seminar_shared::constants::{MAX_CONTENT_SIZE, MESSAGE_PAGE_SIZE};
use seminar_shared::protocol::{ChannelEvent, MessagePayload};
use seminar_shared::types::{MessageKind, RoomId, UserId};

use crate::error::ChatError;
use crate::reconcile::{Reconciler, Reconciliation};
use crate::timeline::{Message, RoomTimeline};

/// A message the pipeline is about to write authoritatively.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub correlation_id: Uuid,
    pub kind: MessageKind,
    pub content: String,
    pub reply_to: Option<Uuid>,
}

/// Response of the authoritative write endpoint. `secondary` carries a
/// server-generated follow-up (an automated reply) when there is one.
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub message: MessagePayload,
    pub secondary: Option<MessagePayload>,
}

/// Issues the authoritative message write.
pub trait MessageWriter: Send + Sync + 'static {
    fn write(
        &self,
        room: RoomId,
        draft: MessageDraft,
    ) -> impl Future<Output = Result<WriteReceipt, ChatError>> + Send;
}

/// Fetches the authoritative message page for a room, ascending by
/// timestamp, capped at `limit`.
pub trait MessageReader: Send + Sync + 'static {
    fn fetch(
        &self,
        room: RoomId,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<MessagePayload>, ChatError>> + Send;
}

/// Commands into a room worker.
#[derive(Debug)]
enum RoomCommand {
    Send {
        kind: MessageKind,
        content: String,
        reply_to: Option<Uuid>,
    },
    Event(ChannelEvent),
    Close,
}

/// Updates a room worker emits towards the host UI.
#[derive(Debug, Clone)]
pub enum RoomUpdate {
    /// A fresh immutable view of the room's messages.
    Timeline {
        room: RoomId,
        snapshot: Arc<Vec<Message>>,
    },
    /// A send was rolled back. `content` is the composed text, returned so
    /// the caller can restore it to the compose field.
    SendFailed {
        room: RoomId,
        content: String,
        error: String,
    },
}

/// Resolutions of background tasks the worker spawned.
enum TaskOutcome {
    Write {
        correlation: Uuid,
        result: Result<WriteReceipt, ChatError>,
    },
    Fetch(Result<Vec<MessagePayload>, ChatError>),
}

/// Handle to one room's worker. Dropping it does not stop the worker; call
/// [`RoomHandle::close`].
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room: RoomId,
    cmd_tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room(&self) -> RoomId {
        self.room
    }

    /// Validate and enqueue a send. Validation failures surface here,
    /// synchronously, before anything touches the network.
    pub async fn send(
        &self,
        kind: MessageKind,
        content: String,
        reply_to: Option<Uuid>,
    ) -> Result<(), ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyContent);
        }
        if content.len() > MAX_CONTENT_SIZE {
            return Err(ChatError::ContentTooLarge {
                limit: MAX_CONTENT_SIZE,
            });
        }

        self.cmd_tx
            .send(RoomCommand::Send {
                kind,
                content,
                reply_to,
            })
            .await
            .map_err(|_| ChatError::SubscriptionClosed)
    }

    /// Route a validated channel event into the worker. Called by the
    /// bridge, not by application code.
    pub async fn deliver(&self, event: ChannelEvent) -> Result<(), ChatError> {
        self.cmd_tx
            .send(RoomCommand::Event(event))
            .await
            .map_err(|_| ChatError::SubscriptionClosed)
    }

    /// Stop the worker. Events already queued are dropped unprocessed.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(RoomCommand::Close).await;
    }
}

/// Spawn the worker owning `room`'s timeline.
pub fn spawn_room<W, R>(
    room: RoomId,
    local_user: UserId,
    writer: Arc<W>,
    reader: Arc<R>,
    updates: mpsc::Sender<RoomUpdate>,
) -> RoomHandle
where
    W: MessageWriter,
    R: MessageReader,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    tokio::spawn(run_room(room, local_user, writer, reader, cmd_rx, updates));
    RoomHandle { room, cmd_tx }
}

async fn run_room<W, R>(
    room: RoomId,
    local_user: UserId,
    writer: Arc<W>,
    reader: Arc<R>,
    mut cmd_rx: mpsc::Receiver<RoomCommand>,
    updates: mpsc::Sender<RoomUpdate>,
) where
    W: MessageWriter,
    R: MessageReader,
{
    let mut timeline = RoomTimeline::new(room);
    let reconciler = Reconciler::new(local_user);
    let (done_tx, mut done_rx) = mpsc::channel::<TaskOutcome>(16);
    let mut fetch_in_flight = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(RoomCommand::Send { kind, content, reply_to }) => {
                    let correlation = Uuid::new_v4();
                    let draft = MessageDraft {
                        correlation_id: correlation,
                        kind,
                        content: content.clone(),
                        reply_to,
                    };
                    timeline.begin_send(
                        local_user,
                        kind,
                        content,
                        reply_to,
                        correlation,
                        Utc::now(),
                    );
                    emit_timeline(&updates, room, &timeline).await;

                    let writer = Arc::clone(&writer);
                    let done = done_tx.clone();
                    tokio::spawn(async move {
                        let result = writer.write(room, draft).await;
                        // If the worker is gone the resolution is dropped,
                        // never applied to a stale view.
                        let _ = done.send(TaskOutcome::Write { correlation, result }).await;
                    });
                }

                Some(RoomCommand::Event(event)) => {
                    match reconciler.apply(&mut timeline, &event, Instant::now()) {
                        Reconciliation::Applied => {
                            emit_timeline(&updates, room, &timeline).await;
                        }
                        Reconciliation::NeedsRefetch if !fetch_in_flight => {
                            fetch_in_flight = true;
                            let reader = Arc::clone(&reader);
                            let done = done_tx.clone();
                            tokio::spawn(async move {
                                let result = reader.fetch(room, MESSAGE_PAGE_SIZE).await;
                                let _ = done.send(TaskOutcome::Fetch(result)).await;
                            });
                        }
                        Reconciliation::NeedsRefetch | Reconciliation::Ignored => {}
                    }
                }

                Some(RoomCommand::Close) | None => break,
            },

            outcome = done_rx.recv() => match outcome {
                Some(TaskOutcome::Write { correlation, result }) => match result {
                    Ok(receipt) => {
                        timeline.confirm(correlation, receipt.message, Instant::now());
                        if let Some(secondary) = receipt.secondary {
                            timeline.apply_insert(secondary, Instant::now());
                        }
                        emit_timeline(&updates, room, &timeline).await;
                    }
                    Err(e) => {
                        if let Some(content) = timeline.fail(correlation) {
                            emit_timeline(&updates, room, &timeline).await;
                            let _ = updates
                                .send(RoomUpdate::SendFailed {
                                    room,
                                    content,
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    }
                },
                Some(TaskOutcome::Fetch(result)) => {
                    fetch_in_flight = false;
                    match result {
                        Ok(page) => {
                            timeline.merge_page(page, Instant::now());
                            emit_timeline(&updates, room, &timeline).await;
                        }
                        Err(e) => {
                            // The next ambiguous event retries the fetch.
                            warn!(room = %room, error = %e, "Room re-fetch failed");
                        }
                    }
                }
                None => {}
            },
        }

        timeline.purge_dedup(Instant::now());
    }

    debug!(room = %room, "Room worker stopped");
}

async fn emit_timeline(updates: &mpsc::Sender<RoomUpdate>, room: RoomId, timeline: &RoomTimeline) {
    let _ = updates
        .send(RoomUpdate::Timeline {
            room,
            snapshot: timeline.snapshot(),
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use seminar_shared::protocol::BroadcastEvent;
    use seminar_shared::protocol::MessageRow;
    use seminar_shared::protocol::RowEvent;
    use seminar_shared::types::DeliveryStatus;

    #[derive(Debug, Clone, Copy)]
    enum Script {
        Succeed,
        SucceedWithReply,
        Refuse,
    }

    struct TestWriter {
        author: UserId,
        scripts: Mutex<VecDeque<Script>>,
        drafts: Mutex<Vec<MessageDraft>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl TestWriter {
        fn new(author: UserId) -> Self {
            Self {
                author,
                scripts: Mutex::new(VecDeque::new()),
                drafts: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn gated(author: UserId, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(author)
            }
        }

        fn script(self, scripts: &[Script]) -> Self {
            *self.scripts.lock().unwrap() = scripts.iter().copied().collect();
            self
        }

        fn receipt_for(&self, room: RoomId, draft: &MessageDraft) -> MessagePayload {
            MessagePayload {
                id: Uuid::new_v4(),
                room_id: room,
                author_id: self.author,
                kind: draft.kind,
                content: draft.content.clone(),
                created_at: Utc::now(),
                reply_to: draft.reply_to,
                reactions: Vec::new(),
                correlation_id: Some(draft.correlation_id),
            }
        }
    }

    impl MessageWriter for TestWriter {
        async fn write(&self, room: RoomId, draft: MessageDraft) -> Result<WriteReceipt, ChatError> {
            self.drafts.lock().unwrap().push(draft.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Succeed);

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }

            match script {
                Script::Refuse => Err(ChatError::Transient("connection reset".to_string())),
                Script::Succeed => Ok(WriteReceipt {
                    message: self.receipt_for(room, &draft),
                    secondary: None,
                }),
                Script::SucceedWithReply => Ok(WriteReceipt {
                    message: self.receipt_for(room, &draft),
                    secondary: Some(MessagePayload {
                        id: Uuid::new_v4(),
                        room_id: room,
                        author_id: UserId(Uuid::new_v4()),
                        kind: MessageKind::Bot,
                        content: "automated reply".to_string(),
                        created_at: Utc::now(),
                        reply_to: None,
                        reactions: Vec::new(),
                        correlation_id: None,
                    }),
                }),
            }
        }
    }

    struct TestReader {
        pages: Mutex<VecDeque<Vec<MessagePayload>>>,
        calls: AtomicUsize,
    }

    impl TestReader {
        fn new(pages: Vec<Vec<MessagePayload>>) -> Self {
            Self {
                pages: Mutex::new(pages.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self::new(Vec::new())
        }
    }

    impl MessageReader for TestReader {
        async fn fetch(&self, _room: RoomId, _limit: u32) -> Result<Vec<MessagePayload>, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn peer_payload(room: RoomId, content: &str) -> MessagePayload {
        MessagePayload {
            id: Uuid::new_v4(),
            room_id: room,
            author_id: UserId(Uuid::new_v4()),
            kind: MessageKind::Text,
            content: content.to_string(),
            created_at: Utc::now(),
            reply_to: None,
            reactions: Vec::new(),
            correlation_id: None,
        }
    }

    async fn next_timeline(rx: &mut mpsc::Receiver<RoomUpdate>) -> Arc<Vec<Message>> {
        loop {
            match rx.recv().await.expect("update stream ended") {
                RoomUpdate::Timeline { snapshot, .. } => return snapshot,
                RoomUpdate::SendFailed { .. } => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_send_success_confirms_in_place() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let writer = Arc::new(TestWriter::new(me));
        let reader = Arc::new(TestReader::empty());
        let (tx, mut rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer, reader, tx);
        handle
            .send(MessageKind::Text, "Hello".to_string(), None)
            .await
            .unwrap();

        let optimistic = next_timeline(&mut rx).await;
        assert_eq!(optimistic.len(), 1);
        assert_eq!(optimistic[0].delivery, DeliveryStatus::Sending);
        assert!(optimistic[0].id.is_local());

        let confirmed = next_timeline(&mut rx).await;
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].delivery, DeliveryStatus::Sent);
        assert!(!confirmed[0].id.is_local());
        assert_eq!(confirmed[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_send_failure_rolls_back_and_restores_content() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let writer = Arc::new(TestWriter::new(me).script(&[Script::Refuse]));
        let reader = Arc::new(TestReader::empty());
        let (tx, mut rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer, reader, tx);
        handle
            .send(MessageKind::Text, "Hello".to_string(), None)
            .await
            .unwrap();

        // sending -> rolled back
        let optimistic = next_timeline(&mut rx).await;
        assert_eq!(optimistic.len(), 1);
        let rolled_back = next_timeline(&mut rx).await;
        assert!(rolled_back.is_empty());

        match rx.recv().await.unwrap() {
            RoomUpdate::SendFailed { content, .. } => assert_eq!(content, "Hello"),
            other => panic!("expected SendFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_send_then_retry_yields_single_entry() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let writer = Arc::new(TestWriter::new(me).script(&[Script::Refuse, Script::Succeed]));
        let reader = Arc::new(TestReader::empty());
        let (tx, mut rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer, reader, tx);
        handle
            .send(MessageKind::Text, "Hello".to_string(), None)
            .await
            .unwrap();

        // First attempt fails while briefly offline: the entry disappears
        // and the composed text comes back.
        let restored = loop {
            match rx.recv().await.unwrap() {
                RoomUpdate::SendFailed { content, .. } => break content,
                RoomUpdate::Timeline { .. } => continue,
            }
        };
        assert_eq!(restored, "Hello");

        // Resend the restored content; exactly one confirmed entry remains.
        handle.send(MessageKind::Text, restored, None).await.unwrap();
        let _optimistic = next_timeline(&mut rx).await;
        let settled = next_timeline(&mut rx).await;
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].content, "Hello");
        assert_eq!(settled[0].delivery, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_network() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let writer = Arc::new(TestWriter::new(me));
        let reader = Arc::new(TestReader::empty());
        let (tx, mut rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer.clone(), reader, tx);

        assert!(matches!(
            handle.send(MessageKind::Text, "   ".to_string(), None).await,
            Err(ChatError::EmptyContent)
        ));
        let oversized = "x".repeat(MAX_CONTENT_SIZE + 1);
        assert!(matches!(
            handle.send(MessageKind::Text, oversized, None).await,
            Err(ChatError::ContentTooLarge { .. })
        ));

        assert!(writer.drafts.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_echo_before_ack_yields_single_entry() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let gate = Arc::new(Semaphore::new(0));
        let writer = Arc::new(TestWriter::gated(me, gate.clone()));
        let reader = Arc::new(TestReader::empty());
        let (tx, mut rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer.clone(), reader, tx);
        handle
            .send(MessageKind::Text, "Hello".to_string(), None)
            .await
            .unwrap();

        let optimistic = next_timeline(&mut rx).await;
        assert_eq!(optimistic.len(), 1);

        // Wait for the write task to record the draft, then deliver the
        // realtime echo while the write is still gated.
        let correlation = loop {
            if let Some(draft) = writer.drafts.lock().unwrap().first() {
                break draft.correlation_id;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };

        let echo = MessagePayload {
            id: Uuid::new_v4(),
            room_id: room,
            author_id: me,
            kind: MessageKind::Text,
            content: "Hello".to_string(),
            created_at: Utc::now(),
            reply_to: None,
            reactions: Vec::new(),
            correlation_id: Some(correlation),
        };
        handle
            .deliver(ChannelEvent::Broadcast(BroadcastEvent::Message(echo)))
            .await
            .unwrap();

        let promoted = next_timeline(&mut rx).await;
        assert_eq!(promoted.len(), 1);
        assert!(!promoted[0].id.is_local());

        // Now the write resolves; still exactly one "Hello".
        gate.add_permits(1);
        let settled = next_timeline(&mut rx).await;
        let hellos = settled.iter().filter(|m| m.content == "Hello").count();
        assert_eq!(hellos, 1);
    }

    #[tokio::test]
    async fn test_secondary_reply_appended_after_confirmed() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let writer = Arc::new(TestWriter::new(me).script(&[Script::SucceedWithReply]));
        let reader = Arc::new(TestReader::empty());
        let (tx, mut rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer, reader, tx);
        handle
            .send(MessageKind::Text, "@bot hello".to_string(), None)
            .await
            .unwrap();

        let _optimistic = next_timeline(&mut rx).await;
        let settled = next_timeline(&mut rx).await;
        assert_eq!(settled.len(), 2);
        assert_eq!(settled[0].content, "@bot hello");
        assert_eq!(settled[1].kind, MessageKind::Bot);
    }

    #[tokio::test]
    async fn test_thin_insert_triggers_targeted_refetch() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let peer = UserId(Uuid::new_v4());
        let writer = Arc::new(TestWriter::new(me));
        let page = vec![peer_payload(room, "one"), peer_payload(room, "two")];
        let reader = Arc::new(TestReader::new(vec![page]));
        let (tx, mut rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer, reader.clone(), tx);
        handle
            .deliver(ChannelEvent::Row(RowEvent::Inserted {
                row: MessageRow {
                    id: Uuid::new_v4(),
                    room_id: room,
                    author_id: peer,
                    record: None,
                },
            }))
            .await
            .unwrap();

        let fetched = next_timeline(&mut rx).await;
        assert_eq!(fetched.len(), 2);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let room = RoomId::new();
        let me = UserId(Uuid::new_v4());
        let writer = Arc::new(TestWriter::new(me));
        let reader = Arc::new(TestReader::empty());
        let (tx, _rx) = mpsc::channel(32);

        let handle = spawn_room(room, me, writer, reader, tx);
        handle.close().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = handle
            .deliver(ChannelEvent::Row(RowEvent::Inserted {
                row: MessageRow {
                    id: Uuid::new_v4(),
                    room_id: room,
                    author_id: me,
                    record: None,
                },
            }))
            .await;
        assert!(matches!(result, Err(ChatError::SubscriptionClosed)));
    }
}
