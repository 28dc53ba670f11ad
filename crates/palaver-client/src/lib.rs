//! # palaver-client
//!
//! Client-side projection and optimistic-mutation engine sitting between a
//! UI and a replicated document store. It keeps an in-memory, per-room view
//! of rooms and messages current from push-based change observers, reflects
//! local mutations (edits, deletes, reactions) instantly before remote
//! persistence confirms, and manages the lifecycle of per-room live
//! subscriptions.
//!
//! The store is consumed exclusively through the four primitives of
//! [`palaver_store::ReplicaStore`]; rendering, transport, and conflict
//! resolution live elsewhere.

pub mod attachments;
pub mod config;
pub mod error;
pub mod messages;
pub mod notify;
pub mod permissions;
pub mod projection;
pub mod reactions;
pub mod rooms;
pub mod state;
pub mod subscriptions;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::{fmt, EnvFilter};

use palaver_shared::{ChatUser, MessageWithUser, RoomId};
use palaver_store::ReplicaStore;

pub use config::{ClientConfig, FALLBACK_RETENTION_DAYS};
pub use error::{ClientError, Result};
pub use notify::Notification;
pub use state::SessionState;

pub(crate) struct ClientInner {
    pub(crate) store: Arc<dyn ReplicaStore>,
    pub(crate) config: ClientConfig,
    pub(crate) state: Mutex<SessionState>,
}

impl ClientInner {
    /// All projection mutations serialize through this lock. A poisoned lock
    /// still holds consistent data (every mutation is a single atomic step
    /// under the guard), so we keep going with the inner state.
    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to one chat session. Cheap to clone; every clone shares the same
/// injected store and session state.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ChatClient {
    pub fn new(
        store: Arc<dyn ReplicaStore>,
        config: ClientConfig,
        current_user: ChatUser,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                store,
                config,
                state: Mutex::new(SessionState::new(current_user)),
            }),
        }
    }

    // ------------------------------------------------------------------
    // State reads exposed to the UI layer
    // ------------------------------------------------------------------

    pub fn current_user(&self) -> ChatUser {
        self.inner.state().current_user.clone()
    }

    /// Snapshot of the user directory.
    pub fn users(&self) -> Vec<ChatUser> {
        self.inner.state().users.values().cloned().collect()
    }

    /// Snapshot of a room's projected messages, in conversation order.
    pub fn messages_for(&self, room_id: &RoomId) -> Vec<MessageWithUser> {
        self.inner
            .state()
            .messages
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_rooms_loading(&self) -> bool {
        self.inner.state().rooms_loading
    }

    pub fn is_messages_loading(&self) -> bool {
        self.inner.state().messages_loading
    }
}

/// Install the session's tracing subscriber. Call once from the hosting
/// application; libraries embedding the client may skip this and install
/// their own.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("palaver_client=debug,palaver_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
