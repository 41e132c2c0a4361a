//! Presence replication.
//!
//! Every client holds its own eventually-consistent view of who is online,
//! fed by presence broadcasts that double as heartbeats. Entries are marked
//! offline after two missed heartbeats but never removed, so a peer that
//! reappears does not reflow the whole roster.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use seminar_shared::constants::{PRESENCE_TIMEOUT_SECS, TYPING_WINDOW_SECS};
use seminar_shared::protocol::PresenceUpdate;
use seminar_shared::types::{PresenceStatus, RoomId, UserId};

/// Locally cached presence state for one peer.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub status: PresenceStatus,
    pub active_rooms: HashSet<RoomId>,
    /// When the last broadcast from this peer arrived, by the local clock.
    pub last_heartbeat: Instant,
}

/// The replicated presence view plus per-room typing state.
#[derive(Debug)]
pub struct PresenceStore {
    entries: HashMap<UserId, PresenceEntry>,
    typing: HashMap<(RoomId, UserId), Instant>,
    liveness_timeout: Duration,
    typing_window: Duration,
    /// While the channel is down, the liveness filter is suspended and the
    /// last-known state keeps being served.
    degraded: bool,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(PRESENCE_TIMEOUT_SECS),
            Duration::from_secs(TYPING_WINDOW_SECS),
        )
    }

    pub fn with_timeouts(liveness_timeout: Duration, typing_window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            typing: HashMap::new(),
            liveness_timeout,
            typing_window,
            degraded: false,
        }
    }

    /// Upsert a peer's entry from a presence broadcast.
    pub fn observe(&mut self, update: &PresenceUpdate, now: Instant) {
        let entry = self
            .entries
            .entry(update.user_id)
            .or_insert_with(|| PresenceEntry {
                user_id: update.user_id,
                status: update.status,
                active_rooms: HashSet::new(),
                last_heartbeat: now,
            });
        entry.status = update.status;
        entry.active_rooms = update.active_rooms.iter().copied().collect();
        entry.last_heartbeat = now;
    }

    /// Mark peers with no heartbeat inside the liveness window as offline.
    /// Entries stay in the map.
    pub fn sweep(&mut self, now: Instant) {
        if self.degraded {
            return;
        }
        for entry in self.entries.values_mut() {
            if entry.status != PresenceStatus::Offline
                && now.duration_since(entry.last_heartbeat) >= self.liveness_timeout
            {
                debug!(user = %entry.user_id, "Peer missed heartbeats, marking offline");
                entry.status = PresenceStatus::Offline;
            }
        }
    }

    /// Users currently shown online in a room.
    pub fn online_users(&self, room: RoomId, now: Instant) -> HashSet<UserId> {
        self.entries
            .values()
            .filter(|e| e.status == PresenceStatus::Online && e.active_rooms.contains(&room))
            .filter(|e| {
                self.degraded || now.duration_since(e.last_heartbeat) < self.liveness_timeout
            })
            .map(|e| e.user_id)
            .collect()
    }

    pub fn entry(&self, user: UserId) -> Option<&PresenceEntry> {
        self.entries.get(&user)
    }

    /// Record a typing signal; the entry expires on its own if no refresh
    /// arrives inside the window, so a lost stop signal cannot wedge it.
    pub fn note_typing(&mut self, room: RoomId, user: UserId, now: Instant) {
        self.typing.insert((room, user), now + self.typing_window);
    }

    pub fn clear_typing(&mut self, room: RoomId, user: UserId) {
        self.typing.remove(&(room, user));
    }

    /// Users typing in a room right now. Expired entries are pruned lazily
    /// here; no background timer is involved.
    pub fn typing_users(&mut self, room: RoomId, now: Instant) -> Vec<(UserId, Instant)> {
        self.typing.retain(|_, expires_at| *expires_at > now);
        let mut users: Vec<(UserId, Instant)> = self
            .typing
            .iter()
            .filter(|((r, _), _)| *r == room)
            .map(|((_, u), expires_at)| (*u, *expires_at))
            .collect();
        users.sort_by_key(|(u, _)| u.0);
        users
    }

    /// Channel disconnects keep the last-known view on screen instead of
    /// draining it entry by entry.
    pub fn set_degraded(&mut self, degraded: bool) {
        self.degraded = degraded;
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

impl Default for PresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn update(user: UserId, status: PresenceStatus, rooms: &[RoomId]) -> PresenceUpdate {
        PresenceUpdate {
            user_id: user,
            status,
            active_rooms: rooms.to_vec(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_observe_and_online() {
        let mut store = PresenceStore::new();
        let room = RoomId::new();
        let user = UserId(Uuid::new_v4());
        let now = Instant::now();

        store.observe(&update(user, PresenceStatus::Online, &[room]), now);
        assert!(store.online_users(room, now).contains(&user));
        assert!(store.online_users(RoomId::new(), now).is_empty());
    }

    #[test]
    fn test_missed_heartbeats_mark_offline_but_keep_entry() {
        let mut store =
            PresenceStore::with_timeouts(Duration::from_secs(60), Duration::from_secs(3));
        let room = RoomId::new();
        let user = UserId(Uuid::new_v4());
        let now = Instant::now();

        store.observe(&update(user, PresenceStatus::Online, &[room]), now);

        let later = now + Duration::from_secs(61);
        store.sweep(later);

        assert!(store.online_users(room, later).is_empty());
        let entry = store.entry(user).unwrap();
        assert_eq!(entry.status, PresenceStatus::Offline);
    }

    #[test]
    fn test_liveness_filter_without_sweep() {
        let mut store =
            PresenceStore::with_timeouts(Duration::from_secs(60), Duration::from_secs(3));
        let room = RoomId::new();
        let user = UserId(Uuid::new_v4());
        let now = Instant::now();

        store.observe(&update(user, PresenceStatus::Online, &[room]), now);
        // Stale even before any sweep runs.
        assert!(store.online_users(room, now + Duration::from_secs(120)).is_empty());
    }

    #[test]
    fn test_degraded_serves_last_known_state() {
        let mut store =
            PresenceStore::with_timeouts(Duration::from_secs(60), Duration::from_secs(3));
        let room = RoomId::new();
        let user = UserId(Uuid::new_v4());
        let now = Instant::now();

        store.observe(&update(user, PresenceStatus::Online, &[room]), now);
        store.set_degraded(true);

        let much_later = now + Duration::from_secs(600);
        store.sweep(much_later);
        assert!(store.online_users(room, much_later).contains(&user));

        store.set_degraded(false);
        store.sweep(much_later);
        assert!(store.online_users(room, much_later).is_empty());
    }

    #[test]
    fn test_typing_expires_without_stop() {
        let mut store =
            PresenceStore::with_timeouts(Duration::from_secs(60), Duration::from_secs(3));
        let room = RoomId::new();
        let user = UserId(Uuid::new_v4());
        let now = Instant::now();

        store.note_typing(room, user, now);
        assert_eq!(store.typing_users(room, now).len(), 1);

        // No explicit stop ever arrives; the entry still disappears.
        let expired = now + Duration::from_secs(4);
        assert!(store.typing_users(room, expired).is_empty());
    }

    #[test]
    fn test_typing_refresh_extends_window() {
        let mut store =
            PresenceStore::with_timeouts(Duration::from_secs(60), Duration::from_secs(3));
        let room = RoomId::new();
        let user = UserId(Uuid::new_v4());
        let now = Instant::now();

        store.note_typing(room, user, now);
        store.note_typing(room, user, now + Duration::from_secs(2));

        assert_eq!(store.typing_users(room, now + Duration::from_secs(4)).len(), 1);
        assert!(store
            .typing_users(room, now + Duration::from_secs(6))
            .is_empty());
    }

    #[test]
    fn test_clear_typing() {
        let mut store = PresenceStore::new();
        let room = RoomId::new();
        let user = UserId(Uuid::new_v4());
        let now = Instant::now();

        store.note_typing(room, user, now);
        store.clear_typing(room, user);
        assert!(store.typing_users(room, now).is_empty());
    }
}
