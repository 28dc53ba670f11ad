//! Session state shared across every client operation.
//!
//! [`SessionState`] is wrapped in `Arc<Mutex<>>` inside [`ChatClient`]; all
//! projection mutations happen under that one lock, so no two of them can
//! interleave mid-update. The container is constructor-injected and scoped
//! to one session, never a process-wide global.
//!
//! [`ChatClient`]: crate::ChatClient

use std::collections::HashMap;

use tokio::task::JoinHandle;

use palaver_shared::{Capability, ChatUser, MessageWithUser, Room, RoomId, UserId};
use palaver_store::LiveHandle;

use crate::notify::NotificationHandler;

/// A live subscription/observer pair plus the task draining its channel.
pub(crate) struct LiveBinding {
    pub(crate) subscription: LiveHandle,
    pub(crate) observer: LiveHandle,
    pub(crate) task: JoinHandle<()>,
}

impl LiveBinding {
    /// Cancel both handles (checking the flag first, so a second shutdown is
    /// harmless) and stop the delivery task.
    pub(crate) fn shutdown(&self) {
        if !self.subscription.is_cancelled() {
            self.subscription.cancel();
        }
        if !self.observer.is_cancelled() {
            self.observer.cancel();
        }
        self.task.abort();
    }
}

/// Central session state.
pub struct SessionState {
    /// The acting user.
    pub(crate) current_user: ChatUser,
    /// Directory of all known users, kept current by the users observer.
    pub(crate) users: HashMap<UserId, ChatUser>,
    /// Rooms from the public rooms collection (generated rooms included).
    pub(crate) rooms: Vec<Room>,
    /// Rooms from the DM collection the current user participates in.
    pub(crate) dm_rooms: Vec<Room>,
    /// Per-room ordered message projection.
    pub(crate) messages: HashMap<RoomId, Vec<MessageWithUser>>,
    /// Per-room message subscription state; presence of a key is the
    /// Subscribed state.
    pub(crate) subscriptions: HashMap<RoomId, LiveBinding>,
    /// Session-wide observers (rooms, DM rooms, users).
    pub(crate) session_bindings: Vec<LiveBinding>,
    /// Explicit capability overrides; unset capabilities fall back to the
    /// default table.
    pub(crate) capability_overrides: HashMap<Capability, bool>,
    /// Callback supplied by the UI layer for eligible incoming messages.
    pub(crate) notification_handler: Option<NotificationHandler>,
    /// True until the first room batch has been observed.
    pub(crate) rooms_loading: bool,
    /// True until every known room has at least an empty projection entry.
    pub(crate) messages_loading: bool,
}

impl SessionState {
    pub(crate) fn new(current_user: ChatUser) -> Self {
        let mut users = HashMap::new();
        users.insert(current_user.id.clone(), current_user.clone());
        Self {
            current_user,
            users,
            rooms: Vec::new(),
            dm_rooms: Vec::new(),
            messages: HashMap::new(),
            subscriptions: HashMap::new(),
            session_bindings: Vec::new(),
            capability_overrides: HashMap::new(),
            notification_handler: None,
            rooms_loading: true,
            messages_loading: true,
        }
    }

    pub(crate) fn room_by_id(&self, id: &RoomId) -> Option<&Room> {
        self.rooms
            .iter()
            .chain(self.dm_rooms.iter())
            .find(|r| &r.id == id)
    }

    /// Loading ends once every auto-subscribed room has a projection entry.
    /// Generated rooms are excluded; they are only subscribed on demand.
    pub(crate) fn recompute_messages_loading(&mut self) {
        self.messages_loading = self
            .rooms
            .iter()
            .chain(self.dm_rooms.iter())
            .filter(|r| !r.is_generated)
            .any(|r| !self.messages.contains_key(&r.id));
    }
}
