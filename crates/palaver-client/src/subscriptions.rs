//! Per-room live-subscription lifecycle and session startup/teardown.
//!
//! Each room id moves Unsubscribed -> Subscribed -> Unsubscribed; presence
//! of an entry in the subscription table is the Subscribed state. All cancel
//! paths check `is_cancelled` first, so tearing down twice is harmless.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use palaver_shared::{Room, RoomId};
use palaver_store::{Query, ReplicaStore};

use crate::config::{ClientConfig, FALLBACK_RETENTION_DAYS};
use crate::error::Result;
use crate::rooms::RoomSource;
use crate::state::LiveBinding;
use crate::ChatClient;

/// Retention precedence: room override, then subscriber override, then the
/// session default, then the hard fallback.
pub(crate) fn effective_retention_days(
    room: &Room,
    subscriber_override: Option<u32>,
    config: &ClientConfig,
) -> u32 {
    room.retention_days
        .or(subscriber_override)
        .or(config.default_retention_days)
        .unwrap_or(FALLBACK_RETENTION_DAYS)
}

/// Messages older than this are not loaded into the live projection.
pub(crate) fn retention_cutoff(
    room: &Room,
    subscriber_override: Option<u32>,
    config: &ClientConfig,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    now - Duration::days(effective_retention_days(room, subscriber_override, config) as i64)
}

impl ChatClient {
    /// Bring the session online: persist the current user and register the
    /// session-wide observers (all rooms, my DM rooms, the user directory).
    /// Message subscriptions follow as room batches arrive.
    pub fn start(&self) -> Result<()> {
        self.persist_current_user();

        let config = &self.inner.config;
        let current_id = self.inner.state().current_user.id.clone();

        let rooms_binding =
            self.bind_room_observer(Query::all(config.rooms_collection.clone()), RoomSource::Public)?;
        let dm_binding = self.bind_room_observer(
            Query::direct_rooms_with(config.dm_rooms_collection.clone(), current_id),
            RoomSource::Direct,
        )?;
        let users_binding = self.bind_users_observer(Query::all(config.users_collection.clone()))?;

        self.inner
            .state()
            .session_bindings
            .extend([rooms_binding, dm_binding, users_binding]);
        info!("session observers started");
        Ok(())
    }

    /// Open the live message query for a room. A no-op when the room is
    /// already subscribed.
    pub fn subscribe_room_messages(&self, room: &Room, retention_days: Option<u32>) {
        if self.inner.state().subscriptions.contains_key(&room.id) {
            debug!(room_id = %room.id, "already subscribed");
            return;
        }

        let cutoff = retention_cutoff(room, retention_days, &self.inner.config, Utc::now());
        let query = Query::visible_messages_since(
            room.messages_collection_id.clone(),
            room.id.clone(),
            cutoff,
        );

        let subscription = match self.inner.store.register_subscription(query.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                error!(room_id = %room.id, error = %e, "failed to open replication subscription");
                return;
            }
        };
        let (observer, rx) = match self.inner.store.register_observer(query) {
            Ok(pair) => pair,
            Err(e) => {
                subscription.cancel();
                error!(room_id = %room.id, error = %e, "failed to register message observer");
                return;
            }
        };

        let task = self.spawn_message_delivery(room.id.clone(), rx);

        let mut state = self.inner.state();
        // A room observer delivery may have subscribed this room while the
        // handles were being registered; the first registration wins.
        if state.subscriptions.contains_key(&room.id) {
            subscription.cancel();
            observer.cancel();
            task.abort();
            return;
        }
        info!(room_id = %room.id, cutoff = %cutoff, "subscribed to room messages");
        state.subscriptions.insert(
            room.id.clone(),
            LiveBinding {
                subscription,
                observer,
                task,
            },
        );
    }

    /// Cancel a room's live query and observer and drop its projected
    /// messages from memory (not from the store). Safe to call when the room
    /// was never subscribed.
    pub fn unsubscribe_room_messages(&self, room_id: &RoomId) {
        let binding = self.inner.state().subscriptions.remove(room_id);
        let Some(binding) = binding else {
            return;
        };
        binding.shutdown();

        let mut state = self.inner.state();
        state.messages.remove(room_id);
        state.recompute_messages_loading();
        info!(room_id = %room_id, "unsubscribed from room messages");
    }

    /// Cancel every outstanding subscription and observer; used on logout.
    pub fn teardown(&self) {
        let (room_bindings, session_bindings) = {
            let mut state = self.inner.state();
            let rooms: Vec<LiveBinding> = state.subscriptions.drain().map(|(_, b)| b).collect();
            let session: Vec<LiveBinding> = state.session_bindings.drain(..).collect();
            state.messages.clear();
            state.messages_loading = true;
            (rooms, session)
        };

        for binding in room_bindings.iter().chain(session_bindings.iter()) {
            binding.shutdown();
        }
        info!(
            rooms = room_bindings.len(),
            "session torn down, all live queries cancelled"
        );
    }

    fn spawn_message_delivery(
        &self,
        room_id: RoomId,
        mut rx: mpsc::UnboundedReceiver<Vec<Value>>,
    ) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                client.apply_message_batch(&room_id, batch);
            }
            debug!(room_id = %room_id, "message observer channel closed");
        })
    }

    fn bind_room_observer(&self, query: Query, source: RoomSource) -> Result<LiveBinding> {
        let subscription = self.inner.store.register_subscription(query.clone())?;
        let (observer, mut rx) = match self.inner.store.register_observer(query) {
            Ok(pair) => pair,
            Err(e) => {
                subscription.cancel();
                return Err(e.into());
            }
        };
        let client = self.clone();
        let task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                client.apply_room_batch(source, batch);
            }
        });
        Ok(LiveBinding {
            subscription,
            observer,
            task,
        })
    }

    fn bind_users_observer(&self, query: Query) -> Result<LiveBinding> {
        let subscription = self.inner.store.register_subscription(query.clone())?;
        let (observer, mut rx) = match self.inner.store.register_observer(query) {
            Ok(pair) => pair,
            Err(e) => {
                subscription.cancel();
                return Err(e.into());
            }
        };
        let client = self.clone();
        let task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                client.apply_user_batch(batch);
            }
        });
        Ok(LiveBinding {
            subscription,
            observer,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_with_store, group_room};

    #[test]
    fn retention_precedence_prefers_the_room_override() {
        let config = ClientConfig {
            default_retention_days: Some(30),
            ..ClientConfig::default()
        };
        let mut room = group_room("general");

        room.retention_days = Some(7);
        assert_eq!(effective_retention_days(&room, Some(14), &config), 7);

        room.retention_days = None;
        assert_eq!(effective_retention_days(&room, Some(14), &config), 14);
        assert_eq!(effective_retention_days(&room, None, &config), 30);

        let bare = ClientConfig::default();
        assert_eq!(
            effective_retention_days(&room, None, &bare),
            FALLBACK_RETENTION_DAYS
        );
    }

    #[test]
    fn cutoff_is_now_minus_the_effective_window() {
        let config = ClientConfig {
            default_retention_days: Some(30),
            ..ClientConfig::default()
        };
        let mut room = group_room("general");
        room.retention_days = Some(7);

        let now = Utc::now();
        let cutoff = retention_cutoff(&room, None, &config, now);
        assert_eq!(now - cutoff, Duration::days(7));
    }

    #[tokio::test]
    async fn subscribing_twice_keeps_one_live_pair() {
        let (store, client) = client_with_store();
        let room = group_room("general");

        client.subscribe_room_messages(&room, None);
        client.subscribe_room_messages(&room, None);

        assert_eq!(store.active_subscription_count(), 1);
        assert_eq!(store.active_observer_count(), 1);
        assert_eq!(client.inner.state().subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribing_cancels_handles_and_drops_the_projection() {
        let (store, client) = client_with_store();
        let room = group_room("general");

        client.subscribe_room_messages(&room, None);
        client
            .inner
            .state()
            .messages
            .insert(room.id.clone(), Vec::new());

        client.unsubscribe_room_messages(&room.id);
        assert_eq!(store.active_subscription_count(), 0);
        assert_eq!(store.active_observer_count(), 0);
        assert!(!client.inner.state().messages.contains_key(&room.id));

        // Tearing down an already-unsubscribed room is a no-op.
        client.unsubscribe_room_messages(&room.id);
    }

    #[tokio::test]
    async fn teardown_cancels_every_outstanding_binding() {
        let (store, client) = client_with_store();
        client.start().unwrap();
        client.subscribe_room_messages(&group_room("general"), None);
        client.subscribe_room_messages(&group_room("random"), None);

        client.teardown();
        assert_eq!(store.active_subscription_count(), 0);
        assert_eq!(store.active_observer_count(), 0);
        assert!(client.inner.state().messages.is_empty());
        assert!(client.inner.state().subscriptions.is_empty());
    }
}
