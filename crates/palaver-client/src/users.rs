//! The user directory and the current user's per-room read state.
//!
//! A room's subscription timestamp, once set, only moves forward or becomes
//! explicitly null via a toggle; it is never cleared implicitly.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, warn};

use palaver_shared::{ChatUser, MessageId, RoomId, UserId};
use palaver_store::{ReplicaStore, Statement};

use crate::ChatClient;

impl ChatClient {
    /// Advance the viewer's read cursor for a room and clear their pending
    /// mentions there. An explicitly null (unsubscribed) timestamp stays
    /// null; reading a room does not resubscribe it.
    pub fn mark_room_read(&self, room_id: &RoomId) {
        let user = {
            let mut state = self.inner.state();
            let now = Utc::now();
            match state.current_user.subscriptions.get(room_id) {
                Some(None) => {}
                Some(Some(ts)) if *ts >= now => {}
                _ => {
                    state
                        .current_user
                        .subscriptions
                        .insert(room_id.clone(), Some(now));
                }
            }
            state.current_user.pending_mentions.remove(room_id);
            let user = state.current_user.clone();
            state.users.insert(user.id.clone(), user.clone());
            user
        };
        self.persist_user(user);
    }

    /// Flip a room between an active subscription timestamp and the explicit
    /// null that marks it unsubscribed.
    pub fn toggle_room_subscription(&self, room_id: &RoomId) {
        let user = {
            let mut state = self.inner.state();
            let entry = state
                .current_user
                .subscriptions
                .entry(room_id.clone())
                .or_insert(None);
            *entry = match entry {
                Some(_) => None,
                None => Some(Utc::now()),
            };
            let user = state.current_user.clone();
            state.users.insert(user.id.clone(), user.clone());
            user
        };
        self.persist_user(user);
    }

    /// Append a message to the target user's pending-mention list for a room
    /// and persist them.
    pub(crate) fn record_pending_mention(
        &self,
        target: &UserId,
        room_id: &RoomId,
        message_id: &MessageId,
    ) {
        let updated = {
            let mut state = self.inner.state();
            let Some(user) = state.users.get_mut(target) else {
                warn!(user_id = %target, "mention target not in the user directory");
                return;
            };
            user.pending_mentions
                .entry(room_id.clone())
                .or_default()
                .push(message_id.clone());
            let user = user.clone();
            if state.current_user.id == *target {
                state.current_user = user.clone();
            }
            user
        };
        self.persist_user(updated);
    }

    /// Replace the directory with a pushed user batch. The current user's
    /// local copy follows the store view when present (last write wins).
    pub(crate) fn apply_user_batch(&self, rows: Vec<Value>) {
        let mut users = HashMap::new();
        for row in rows {
            match serde_json::from_value::<ChatUser>(row) {
                Ok(user) => {
                    users.insert(user.id.clone(), user);
                }
                Err(e) => warn!(error = %e, "skipping malformed user document"),
            }
        }

        let mut state = self.inner.state();
        if let Some(me) = users.get(&state.current_user.id) {
            state.current_user = me.clone();
        } else {
            users.insert(state.current_user.id.clone(), state.current_user.clone());
        }
        state.users = users;
    }

    pub(crate) fn persist_current_user(&self) {
        let user = self.inner.state().current_user.clone();
        self.persist_user(user);
    }

    fn persist_user(&self, user: ChatUser) {
        let document = serde_json::to_value(&user);
        let store = self.inner.store.clone();
        let collection = self.inner.config.users_collection.clone();
        tokio::spawn(async move {
            let document = match document {
                Ok(doc) => doc,
                Err(e) => {
                    error!(user_id = %user.id, error = %e, "failed to serialize user");
                    return;
                }
            };
            if let Err(e) = store
                .execute(Statement::Upsert {
                    collection,
                    document,
                })
                .await
            {
                error!(user_id = %user.id, error = %e, "failed to persist user");
            }
        });
    }
}
