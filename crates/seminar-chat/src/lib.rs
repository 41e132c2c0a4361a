//! # seminar-chat
//!
//! The collaborative chat core: presence replication, typing debounce,
//! the optimistic message pipeline, and reconciliation of realtime events
//! against the per-room timeline.
//!
//! The stores in this crate are plain single-writer state machines; the
//! room worker task in [`pipeline`] is the one place that mutates a room's
//! timeline, multiplexing UI commands, write resolutions, and channel events
//! on one loop.

pub mod pipeline;
pub mod presence;
pub mod reconcile;
pub mod timeline;
pub mod typing;

mod error;

pub use error::ChatError;
pub use pipeline::{
    spawn_room, MessageDraft, MessageReader, MessageWriter, RoomHandle, RoomUpdate, WriteReceipt,
};
pub use presence::{PresenceEntry, PresenceStore};
pub use reconcile::{Reconciler, Reconciliation};
pub use timeline::{Message, RoomTimeline};
pub use typing::{TypingDebouncer, TypingTransition};
