//! Per-room message projection: the merge/upsert algorithm applied to every
//! observer delivery.
//!
//! The projection keeps at most one visible entry per conversation turn: a
//! record that supersedes a projected entry overwrites it at the same index;
//! a record with a projected id overwrites that entry; everything else
//! appends. Net-new records are run through the notification evaluator
//! before insertion.

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use palaver_shared::{Message, MessageWithUser, RoomId};

use crate::notify::{build_notification, should_notify};
use crate::state::SessionState;
use crate::ChatClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergePosition {
    Replace(usize),
    Append,
}

/// Resolve where an incoming record lands in a projection list.
pub(crate) fn merge_position(list: &[MessageWithUser], incoming: &Message) -> MergePosition {
    if let Some(prior) = incoming.supersedes() {
        if let Some(idx) = list.iter().position(|m| &m.message.id == prior) {
            return MergePosition::Replace(idx);
        }
    }
    if let Some(idx) = list.iter().position(|m| m.message.id == incoming.id) {
        return MergePosition::Replace(idx);
    }
    MergePosition::Append
}

impl ChatClient {
    /// Merge one observer delivery into a room's projection. The handler is
    /// invoked outside the state lock.
    pub(crate) fn apply_message_batch(&self, room_id: &RoomId, rows: Vec<Value>) {
        let mut eligible = Vec::new();

        let handler = {
            let mut state = self.inner.state();
            let now = Utc::now();
            {
                let SessionState {
                    rooms,
                    dm_rooms,
                    users,
                    messages,
                    current_user,
                    ..
                } = &mut *state;
                let room = rooms
                    .iter()
                    .chain(dm_rooms.iter())
                    .find(|r| &r.id == room_id)
                    .cloned();
                let list = messages.entry(room_id.clone()).or_default();

                for row in rows {
                    let message: Message = match serde_json::from_value(row) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(room_id = %room_id, error = %e, "skipping malformed message document");
                            continue;
                        }
                    };
                    // Author resolution is best-effort; a missing directory
                    // entry does not block insertion.
                    let author = users.get(&message.author_id).cloned();

                    match merge_position(list, &message) {
                        MergePosition::Replace(idx) => {
                            list[idx] = MessageWithUser { message, author };
                        }
                        MergePosition::Append => {
                            if let Some(room) = room.as_ref() {
                                if should_notify(&message, room, current_user, now) {
                                    eligible.push(build_notification(
                                        &message,
                                        room,
                                        author.as_ref(),
                                    ));
                                }
                            }
                            list.push(MessageWithUser { message, author });
                        }
                    }
                }
            }
            state.recompute_messages_loading();
            state.notification_handler.clone()
        };

        if let Some(handler) = handler {
            for notification in eligible {
                handler(notification);
            }
        }
    }

    /// Case-insensitive substring search across projected messages, newest
    /// first, capped at 100 results. Deleted placeholders are skipped.
    pub fn search_messages(&self, query: &str, room: Option<&RoomId>) -> Vec<MessageWithUser> {
        let needle = query.to_lowercase();
        let state = self.inner.state();

        let mut results: Vec<MessageWithUser> = state
            .messages
            .iter()
            .filter(|(id, _)| room.map_or(true, |r| r == *id))
            .flat_map(|(_, list)| list.iter())
            .filter(|m| !m.message.is_deleted && m.message.text.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.message.created_on.cmp(&a.message.created_on));
        results.truncate(100);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::test_support::{client_with_store, group_room, message_in, user};
    use palaver_shared::MessageId;

    fn seed_room(client: &ChatClient, room: &palaver_shared::Room) {
        client.inner.state().rooms.push(room.clone());
    }

    fn doc(message: &Message) -> Value {
        serde_json::to_value(message).unwrap()
    }

    #[tokio::test]
    async fn edit_record_replaces_the_superseded_entry_in_place() {
        let (_store, client) = client_with_store();
        let room = group_room("general");
        seed_room(&client, &room);

        let m0 = message_in(&room, "bob");
        let m1 = message_in(&room, "bob");
        let m2 = message_in(&room, "bob");
        client.apply_message_batch(&room.id, vec![doc(&m0), doc(&m1), doc(&m2)]);

        let mut edit = message_in(&room, "bob");
        edit.text = "edited".into();
        edit.is_edited = true;
        edit.archived_message = Some(m2.id.clone());
        client.apply_message_batch(&room.id, vec![doc(&edit)]);

        let list = client.messages_for(&room.id);
        assert_eq!(list.len(), 3);
        assert_eq!(list[2].message.id, edit.id);
        assert_eq!(list[2].message.text, "edited");
    }

    #[tokio::test]
    async fn unmatched_supersede_pointer_appends() {
        let (_store, client) = client_with_store();
        let room = group_room("general");
        seed_room(&client, &room);

        let mut edit = message_in(&room, "bob");
        edit.archived_message = Some(MessageId("never-seen".into()));
        client.apply_message_batch(&room.id, vec![doc(&edit)]);

        let list = client.messages_for(&room.id);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message.id, edit.id);
    }

    #[tokio::test]
    async fn records_with_a_known_id_overwrite_their_entry() {
        let (_store, client) = client_with_store();
        let room = group_room("general");
        seed_room(&client, &room);

        let mut msg = message_in(&room, "bob");
        client.apply_message_batch(&room.id, vec![doc(&msg)]);
        msg.reactions.push(palaver_shared::Reaction {
            user_id: user("carol").id,
            emoji: "👍".into(),
            emoji_name: None,
        });
        client.apply_message_batch(&room.id, vec![doc(&msg)]);

        let list = client.messages_for(&room.id);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message.reactions.len(), 1);
    }

    #[tokio::test]
    async fn net_new_eligible_messages_invoke_the_handler_once() {
        let (_store, client) = client_with_store();
        let mut dm = group_room("pair");
        dm.participants = Some(vec![user("alice").id, user("bob").id]);
        seed_room(&client, &dm);

        let fired: Arc<Mutex<Vec<crate::Notification>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        client.set_notification_handler(move |n| sink.lock().unwrap().push(n));

        let msg = message_in(&dm, "bob");
        client.apply_message_batch(&dm.id, vec![doc(&msg)]);
        // Redelivery of the same record is a replace, not a new turn.
        client.apply_message_batch(&dm.id, vec![doc(&msg)]);

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].message_id, msg.id);
    }

    #[tokio::test]
    async fn own_messages_do_not_invoke_the_handler() {
        let (_store, client) = client_with_store();
        let mut dm = group_room("pair");
        dm.participants = Some(vec![user("alice").id, user("bob").id]);
        seed_room(&client, &dm);

        let fired: Arc<Mutex<Vec<crate::Notification>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        client.set_notification_handler(move |n| sink.lock().unwrap().push(n));

        client.apply_message_batch(&dm.id, vec![doc(&message_in(&dm, "alice"))]);
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn loading_clears_once_every_known_room_has_an_entry() {
        let (_store, client) = client_with_store();
        let general = group_room("general");
        let random = group_room("random");
        client.inner.state().rooms.push(general.clone());
        client.inner.state().rooms.push(random.clone());

        client.apply_message_batch(&general.id, Vec::new());
        assert!(client.is_messages_loading());

        client.apply_message_batch(&random.id, Vec::new());
        assert!(!client.is_messages_loading());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_newest_first() {
        let (_store, client) = client_with_store();
        let room = group_room("general");
        seed_room(&client, &room);

        let mut old = message_in(&room, "bob");
        old.text = "Deployment schedule".into();
        old.created_on = Utc::now() - chrono::Duration::hours(2);
        let mut fresh = message_in(&room, "bob");
        fresh.text = "deployment is done".into();
        let mut other = message_in(&room, "bob");
        other.text = "lunch?".into();
        client.apply_message_batch(&room.id, vec![doc(&old), doc(&fresh), doc(&other)]);

        let hits = client.search_messages("DEPLOY", None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].message.id, fresh.id);
        assert_eq!(hits[1].message.id, old.id);
    }
}
