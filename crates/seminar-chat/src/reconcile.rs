//! Merging realtime events into a room's timeline.
//!
//! The reconciler decides, per event, whether the timeline can absorb it
//! directly, whether an authoritative re-fetch is needed (thin row events),
//! or whether it is a duplicate/own-echo that must be dropped.

use std::time::Instant;

use tracing::debug;

use seminar_shared::protocol::{BroadcastEvent, ChannelEvent, RowEvent};
use seminar_shared::types::UserId;

use crate::timeline::{InsertOutcome, RoomTimeline};

/// Result of applying one channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The timeline changed; observers should re-render.
    Applied,
    /// The event was not self-contained; fetch the room's page.
    NeedsRefetch,
    /// Duplicate, own echo already applied, or not timeline-related.
    Ignored,
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    local_user: UserId,
}

impl Reconciler {
    pub fn new(local_user: UserId) -> Self {
        Self { local_user }
    }

    pub fn apply(
        &self,
        timeline: &mut RoomTimeline,
        event: &ChannelEvent,
        now: Instant,
    ) -> Reconciliation {
        match event {
            ChannelEvent::Row(RowEvent::Inserted { row }) => match &row.record {
                Some(record) => match timeline.apply_insert(record.clone(), now) {
                    InsertOutcome::Duplicate => Reconciliation::Ignored,
                    _ => Reconciliation::Applied,
                },
                // Thin notification. Our own write is already applied
                // optimistically; a peer's needs the authoritative page.
                None if row.author_id == self.local_user => {
                    debug!(message = %row.id, "Own insert notification, already applied");
                    Reconciliation::Ignored
                }
                None => Reconciliation::NeedsRefetch,
            },

            ChannelEvent::Row(RowEvent::Updated { row }) => match &row.record {
                Some(record) => {
                    if timeline.apply_update(record) {
                        Reconciliation::Applied
                    } else {
                        // An update for a row we never saw: the page is stale.
                        Reconciliation::NeedsRefetch
                    }
                }
                None => Reconciliation::NeedsRefetch,
            },

            ChannelEvent::Broadcast(BroadcastEvent::Message(payload)) => {
                match timeline.apply_insert(payload.clone(), now) {
                    InsertOutcome::Duplicate => Reconciliation::Ignored,
                    _ => Reconciliation::Applied,
                }
            }

            ChannelEvent::Broadcast(BroadcastEvent::Reaction(update)) => {
                if timeline.apply_reaction(update) {
                    Reconciliation::Applied
                } else {
                    Reconciliation::Ignored
                }
            }

            ChannelEvent::Broadcast(BroadcastEvent::Receipt(receipt)) => {
                if timeline.apply_receipt(receipt) {
                    Reconciliation::Applied
                } else {
                    Reconciliation::Ignored
                }
            }

            // Presence and typing never touch the timeline.
            ChannelEvent::Broadcast(BroadcastEvent::Presence(_))
            | ChannelEvent::Broadcast(BroadcastEvent::TypingStart(_))
            | ChannelEvent::Broadcast(BroadcastEvent::TypingStop(_)) => Reconciliation::Ignored,
        }
    }
}
