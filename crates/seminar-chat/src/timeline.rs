//! Per-room message timeline.
//!
//! The timeline is the single source of truth for what a room renders. It is
//! copy-on-write: every mutation produces a fresh `Arc<Vec<Message>>`
//! snapshot, so observers can hold a consistent view across re-renders while
//! the owning worker keeps mutating.
//!
//! Optimistic entries are matched to their authoritative counterparts by a
//! client-generated correlation id, kept in an O(1) map. Promoted
//! correlation ids are remembered for a bounded window so late echoes of an
//! already-reconciled write are dropped instead of duplicated.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use seminar_shared::constants::DEDUP_WINDOW_SECS;
use seminar_shared::protocol::{
    DeliveryReceipt, MessagePayload, Reaction, ReactionAction, ReactionUpdate, ReceiptKind,
};
use seminar_shared::types::{DeliveryStatus, MessageId, MessageKind, RoomId, UserId};

/// A message as a room renders it, optimistic or confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub delivery: DeliveryStatus,
    pub reply_to: Option<Uuid>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    fn confirmed(payload: MessagePayload) -> Self {
        Self {
            id: MessageId::Remote(payload.id),
            room_id: payload.room_id,
            author_id: payload.author_id,
            kind: payload.kind,
            content: payload.content,
            created_at: payload.created_at,
            delivery: DeliveryStatus::Sent,
            reply_to: payload.reply_to,
            reactions: payload.reactions,
        }
    }
}

/// What [`RoomTimeline::apply_insert`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New confirmed message, inserted in timestamp order.
    Appended,
    /// Matched an in-flight optimistic entry and replaced it in place.
    Promoted,
    /// Already present (or inside the dedup window); dropped.
    Duplicate,
}

#[derive(Debug)]
struct PendingSend {
    local_id: Uuid,
    content: String,
}

/// Single-writer timeline state for one room.
#[derive(Debug)]
pub struct RoomTimeline {
    room_id: RoomId,
    snapshot: Arc<Vec<Message>>,
    /// Correlation id -> in-flight optimistic send.
    pending: HashMap<Uuid, PendingSend>,
    /// Correlation ids already reconciled, with their promotion time.
    reconciled: HashMap<Uuid, Instant>,
    /// Server ids present in the snapshot.
    seen: HashSet<Uuid>,
    dedup_window: Duration,
}

impl RoomTimeline {
    pub fn new(room_id: RoomId) -> Self {
        Self::with_dedup_window(room_id, Duration::from_secs(DEDUP_WINDOW_SECS))
    }

    pub fn with_dedup_window(room_id: RoomId, dedup_window: Duration) -> Self {
        Self {
            room_id,
            snapshot: Arc::new(Vec::new()),
            pending: HashMap::new(),
            reconciled: HashMap::new(),
            seen: HashSet::new(),
            dedup_window,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Current immutable view. Cheap to clone and safe to hold across
    /// further mutations.
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.snapshot)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Start an optimistic send: the entry renders immediately in `Sending`
    /// state and floats at the tail until confirmed or rolled back.
    pub fn begin_send(
        &mut self,
        author: UserId,
        kind: MessageKind,
        content: String,
        reply_to: Option<Uuid>,
        correlation: Uuid,
        created_at: DateTime<Utc>,
    ) -> Message {
        let local_id = Uuid::new_v4();
        let message = Message {
            id: MessageId::Local(local_id),
            room_id: self.room_id,
            author_id: author,
            kind,
            content: content.clone(),
            created_at,
            delivery: DeliveryStatus::Sending,
            reply_to,
            reactions: Vec::new(),
        };

        self.pending
            .insert(correlation, PendingSend { local_id, content });

        let mut list = self.snapshot.as_ref().clone();
        list.push(message.clone());
        self.snapshot = Arc::new(list);
        message
    }

    /// The authoritative write resolved. Replaces the optimistic entry in
    /// place; a no-op when an early realtime echo already promoted it.
    pub fn confirm(&mut self, correlation: Uuid, payload: MessagePayload, now: Instant) -> bool {
        match self.pending.remove(&correlation) {
            Some(pending) => {
                self.promote(pending, correlation, payload, now);
                true
            }
            None => {
                debug!(
                    room = %self.room_id,
                    correlation = %correlation,
                    "Write confirmed after echo already reconciled it"
                );
                false
            }
        }
    }

    /// The authoritative write failed. Removes the optimistic entry and
    /// returns the composed content so the caller can restore it.
    pub fn fail(&mut self, correlation: Uuid) -> Option<String> {
        let pending = self.pending.remove(&correlation)?;
        let mut list = self.snapshot.as_ref().clone();
        list.retain(|m| m.id != MessageId::Local(pending.local_id));
        self.snapshot = Arc::new(list);
        Some(pending.content)
    }

    /// Merge a confirmed message arriving over the realtime channel (echo of
    /// our own write or a peer's message).
    pub fn apply_insert(&mut self, payload: MessagePayload, now: Instant) -> InsertOutcome {
        if self.seen.contains(&payload.id) {
            return InsertOutcome::Duplicate;
        }

        // Match in-flight sends by correlation id first, then by the
        // content+author fallback for backends that do not echo it.
        let correlation = match payload.correlation_id {
            Some(c) => {
                if self.reconciled.contains_key(&c) {
                    return InsertOutcome::Duplicate;
                }
                self.pending.contains_key(&c).then_some(c)
            }
            None => self.match_pending_fallback(&payload),
        };

        match correlation {
            Some(c) => {
                let pending = self.pending.remove(&c).expect("matched pending entry");
                self.promote(pending, c, payload, now);
                InsertOutcome::Promoted
            }
            None => {
                self.seen.insert(payload.id);
                let mut list = self.snapshot.as_ref().clone();
                Self::insert_confirmed(&mut list, Message::confirmed(payload));
                self.snapshot = Arc::new(list);
                InsertOutcome::Appended
            }
        }
    }

    /// Apply an edit/delete notification in place. Idempotent: replaying the
    /// same update leaves the timeline unchanged.
    pub fn apply_update(&mut self, payload: &MessagePayload) -> bool {
        if !self.seen.contains(&payload.id) {
            return false;
        }
        let mut list = self.snapshot.as_ref().clone();
        let Some(entry) = list
            .iter_mut()
            .find(|m| m.id == MessageId::Remote(payload.id))
        else {
            return false;
        };

        entry.content = payload.content.clone();
        entry.kind = payload.kind;
        entry.reply_to = payload.reply_to;
        entry.reactions = payload.reactions.clone();
        self.snapshot = Arc::new(list);
        true
    }

    /// Add or remove a reaction. Adding an (emoji, user) pair that is
    /// already present is a no-op, so replayed broadcasts cannot duplicate.
    pub fn apply_reaction(&mut self, update: &ReactionUpdate) -> bool {
        if !self.seen.contains(&update.message_id) {
            return false;
        }
        let mut list = self.snapshot.as_ref().clone();
        let Some(entry) = list
            .iter_mut()
            .find(|m| m.id == MessageId::Remote(update.message_id))
        else {
            return false;
        };

        let reaction = Reaction {
            emoji: update.emoji.clone(),
            user_id: update.user_id,
        };
        let changed = match update.action {
            ReactionAction::Add => {
                if entry.reactions.contains(&reaction) {
                    false
                } else {
                    entry.reactions.push(reaction);
                    true
                }
            }
            ReactionAction::Remove => {
                let before = entry.reactions.len();
                entry.reactions.retain(|r| *r != reaction);
                entry.reactions.len() != before
            }
        };

        if changed {
            self.snapshot = Arc::new(list);
        }
        changed
    }

    /// Upgrade a message's delivery status from a receipt. Monotone: a
    /// `Delivered` receipt arriving after `Read` changes nothing.
    pub fn apply_receipt(&mut self, receipt: &DeliveryReceipt) -> bool {
        let target = match receipt.kind {
            ReceiptKind::Delivered => DeliveryStatus::Delivered,
            ReceiptKind::Read => DeliveryStatus::Read,
        };

        let mut list = self.snapshot.as_ref().clone();
        let Some(entry) = list
            .iter_mut()
            .find(|m| m.id == MessageId::Remote(receipt.message_id))
        else {
            return false;
        };

        if entry.delivery >= target {
            return false;
        }
        entry.delivery = target;
        self.snapshot = Arc::new(list);
        true
    }

    /// Reconcile an authoritative page from the read endpoint (ascending by
    /// timestamp) against local state. In-flight optimistic entries survive.
    pub fn merge_page(&mut self, page: Vec<MessagePayload>, now: Instant) {
        for payload in page {
            if self.seen.contains(&payload.id) {
                self.apply_update(&payload);
            } else {
                self.apply_insert(payload, now);
            }
        }
    }

    /// Drop reconciled correlation ids older than the dedup window.
    pub fn purge_dedup(&mut self, now: Instant) {
        let window = self.dedup_window;
        self.reconciled
            .retain(|_, promoted_at| now.duration_since(*promoted_at) < window);
    }

    fn promote(
        &mut self,
        pending: PendingSend,
        correlation: Uuid,
        payload: MessagePayload,
        now: Instant,
    ) {
        self.seen.insert(payload.id);
        self.reconciled.insert(correlation, now);

        let mut list = self.snapshot.as_ref().clone();
        if let Some(entry) = list
            .iter_mut()
            .find(|m| m.id == MessageId::Local(pending.local_id))
        {
            *entry = Message::confirmed(payload);
        } else {
            // The optimistic entry vanished (room refetched underneath us);
            // fall back to an ordered insert.
            Self::insert_confirmed(&mut list, Message::confirmed(payload));
        }
        self.snapshot = Arc::new(list);
    }

    /// Backends that do not echo the correlation id: match an in-flight send
    /// by author and content.
    fn match_pending_fallback(&self, payload: &MessagePayload) -> Option<Uuid> {
        self.pending.iter().find_map(|(correlation, pending)| {
            let local = self
                .snapshot
                .iter()
                .find(|m| m.id == MessageId::Local(pending.local_id))?;
            (local.author_id == payload.author_id && pending.content == payload.content)
                .then_some(*correlation)
        })
    }

    /// Confirmed entries stay sorted by server timestamp; optimistic entries
    /// keep floating as a suffix.
    fn insert_confirmed(list: &mut Vec<Message>, message: Message) {
        let tail_start = list
            .iter()
            .position(|m| m.id.is_local())
            .unwrap_or(list.len());
        let mut idx = tail_start;
        while idx > 0 && list[idx - 1].created_at > message.created_at {
            idx -= 1;
        }
        list.insert(idx, message);
    }
}
