//! Typing debounce.
//!
//! Converts raw composer input into at most one start signal per burst and a
//! trailing stop, so peers see "is typing" without a broadcast per
//! keystroke. One timer per room; the stop side is best-effort because every
//! receiver also expires typing state on its own (see
//! [`crate::presence::PresenceStore`]).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use seminar_shared::constants::TYPING_WINDOW_SECS;
use seminar_shared::types::RoomId;

/// Signal to broadcast as a result of a composer transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingTransition {
    Start,
    Stop,
}

/// Per-room trailing-edge debouncer for the local user's composer.
#[derive(Debug)]
pub struct TypingDebouncer {
    window: Duration,
    /// Rooms currently in the typing state, with their trailing deadline.
    deadlines: HashMap<RoomId, Instant>,
}

impl TypingDebouncer {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(TYPING_WINDOW_SECS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            deadlines: HashMap::new(),
        }
    }

    /// A keystroke landed in the room's composer. Emits `Start` only on the
    /// idle -> typing transition; while typing it just pushes the deadline.
    pub fn on_input(&mut self, room: RoomId, now: Instant) -> Option<TypingTransition> {
        let was_idle = self.deadlines.insert(room, now + self.window).is_none();
        was_idle.then_some(TypingTransition::Start)
    }

    /// The composer emptied or the message was sent.
    pub fn on_idle(&mut self, room: RoomId) -> Option<TypingTransition> {
        self.deadlines
            .remove(&room)
            .map(|_| TypingTransition::Stop)
    }

    /// Collect rooms whose trailing window elapsed; each yields one `Stop`.
    pub fn poll_expired(&mut self, now: Instant) -> Vec<RoomId> {
        let expired: Vec<RoomId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(room, _)| *room)
            .collect();
        for room in &expired {
            self.deadlines.remove(room);
        }
        expired
    }

    /// The soonest trailing deadline, for the event loop's timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn is_typing(&self, room: RoomId) -> bool {
        self.deadlines.contains_key(&room)
    }
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
