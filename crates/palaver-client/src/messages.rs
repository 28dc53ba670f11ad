//! Send, edit, and delete operations.
//!
//! A persisted message is never mutated in place: edits and deletes archive
//! the original and insert a replacement that names it via
//! `archived_message`. Persistence is fire-and-forget; failures are logged
//! and the projection simply never reflects the change.

use chrono::Utc;
use serde_json::Value;
use tracing::{error, warn};

use palaver_shared::{
    AttachmentToken, Capability, CollectionId, Mention, Message, MessageId, Room,
};
use palaver_store::{ReplicaStore, Statement};

use crate::ChatClient;

impl ChatClient {
    /// Send a plain text message.
    pub fn create_message(&self, room: &Room, text: &str, mentions: Vec<Mention>) -> Message {
        self.send_message(room, text.to_string(), None, None, None, mentions)
    }

    /// Send an image message carrying a pre-sized thumbnail plus the
    /// full-size attachment.
    pub fn create_image_message(
        &self,
        room: &Room,
        text: &str,
        thumbnail: AttachmentToken,
        image: AttachmentToken,
        mentions: Vec<Mention>,
    ) -> Message {
        self.send_message(
            room,
            text.to_string(),
            Some(thumbnail),
            Some(image),
            None,
            mentions,
        )
    }

    /// Send a file message.
    pub fn create_file_message(
        &self,
        room: &Room,
        text: &str,
        file: AttachmentToken,
        mentions: Vec<Mention>,
    ) -> Message {
        self.send_message(room, text.to_string(), None, None, Some(file), mentions)
    }

    /// Supersede a message with an edited body. Attachments, mentions, and
    /// reactions carry over verbatim; edits never touch them.
    pub fn save_edited_text_message(
        &self,
        room: &Room,
        message_id: &MessageId,
        new_text: &str,
    ) -> Option<Message> {
        if !self.can_perform(Capability::EditOwnMessage) {
            warn!(message_id = %message_id, "edit denied by capability gate");
            return None;
        }
        let Some(original) = self.projected_message(room, message_id) else {
            warn!(message_id = %message_id, room_id = %room.id, "edit target not in projection");
            return None;
        };

        let replacement = Message {
            id: MessageId::generate(),
            room_id: original.room_id.clone(),
            author_id: original.author_id.clone(),
            // The replacement keeps the original timestamp so the version
            // chain occupies the original conversation turn.
            created_on: original.created_on,
            text: new_text.to_string(),
            thumbnail_token: original.thumbnail_token.clone(),
            image_token: original.image_token.clone(),
            file_token: original.file_token.clone(),
            is_archived: false,
            is_edited: true,
            is_deleted: false,
            archived_message: Some(original.id.clone()),
            reactions: original.reactions.clone(),
            mentions: original.mentions.clone(),
        };

        self.persist_replacement(&room.messages_collection_id, &original.id, &replacement);
        Some(replacement)
    }

    /// Supersede a message with a deleted placeholder. Attachment references
    /// and mentions are cleared; the placeholder text follows the original's
    /// content kind.
    pub fn save_deleted_message(&self, room: &Room, message_id: &MessageId) -> Option<Message> {
        if !self.can_perform(Capability::DeleteOwnMessage) {
            warn!(message_id = %message_id, "delete denied by capability gate");
            return None;
        }
        let Some(original) = self.projected_message(room, message_id) else {
            warn!(message_id = %message_id, room_id = %room.id, "delete target not in projection");
            return None;
        };

        let replacement = Message {
            id: MessageId::generate(),
            room_id: original.room_id.clone(),
            author_id: original.author_id.clone(),
            created_on: original.created_on,
            text: original.deleted_placeholder().to_string(),
            thumbnail_token: None,
            image_token: None,
            file_token: None,
            is_archived: false,
            is_edited: false,
            is_deleted: true,
            archived_message: Some(original.id.clone()),
            reactions: original.reactions.clone(),
            mentions: Vec::new(),
        };

        self.persist_replacement(&room.messages_collection_id, &original.id, &replacement);
        Some(replacement)
    }

    fn send_message(
        &self,
        room: &Room,
        text: String,
        thumbnail_token: Option<AttachmentToken>,
        image_token: Option<AttachmentToken>,
        file_token: Option<AttachmentToken>,
        mentions: Vec<Mention>,
    ) -> Message {
        let author_id = self.inner.state().current_user.id.clone();
        let mentions = self.sanitize_mentions(mentions);

        let message = Message {
            id: MessageId::generate(),
            room_id: room.id.clone(),
            author_id,
            created_on: Utc::now(),
            text,
            thumbnail_token,
            image_token,
            file_token,
            is_archived: false,
            is_edited: false,
            is_deleted: false,
            archived_message: None,
            reactions: Vec::new(),
            mentions: mentions.clone(),
        };

        for mention in &mentions {
            self.record_pending_mention(&mention.user_id, &room.id, &message.id);
        }
        self.persist_message(&room.messages_collection_id, &message);
        message
    }

    /// Mentions are stripped entirely when the sender lacks the capability.
    fn sanitize_mentions(&self, mentions: Vec<Mention>) -> Vec<Mention> {
        if mentions.is_empty() || self.can_perform(Capability::MentionUsers) {
            return mentions;
        }
        warn!(
            count = mentions.len(),
            "mentions stripped, sender lacks the mention capability"
        );
        Vec::new()
    }

    fn projected_message(&self, room: &Room, message_id: &MessageId) -> Option<Message> {
        self.inner
            .state()
            .messages
            .get(&room.id)?
            .iter()
            .find(|m| &m.message.id == message_id)
            .map(|m| m.message.clone())
    }

    fn persist_message(&self, collection: &CollectionId, message: &Message) {
        let document = serde_json::to_value(message);
        let store = self.inner.store.clone();
        let collection = collection.clone();
        let message_id = message.id.clone();
        tokio::spawn(async move {
            let document = match document {
                Ok(doc) => doc,
                Err(e) => {
                    error!(message_id = %message_id, error = %e, "failed to serialize message");
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
                error!(message_id = %message_id, error = %e, "failed to persist message");
            }
        });
    }

    /// Archive the original, then insert the replacement. If archiving
    /// fails the replacement is not written.
    fn persist_replacement(
        &self,
        collection: &CollectionId,
        original_id: &MessageId,
        replacement: &Message,
    ) {
        let document = serde_json::to_value(replacement);
        let store = self.inner.store.clone();
        let collection = collection.clone();
        let original_id = original_id.clone();
        let replacement_id = replacement.id.clone();
        tokio::spawn(async move {
            let document = match document {
                Ok(doc) => doc,
                Err(e) => {
                    error!(message_id = %replacement_id, error = %e, "failed to serialize replacement");
                    return;
                }
            };

            let mut fields = serde_json::Map::new();
            fields.insert("isArchived".into(), Value::Bool(true));
            if let Err(e) = store
                .execute(Statement::Patch {
                    collection: collection.clone(),
                    id: original_id.as_str().to_string(),
                    fields,
                })
                .await
            {
                error!(message_id = %original_id, error = %e, "failed to archive original message");
                return;
            }

            if let Err(e) = store
                .execute(Statement::Upsert {
                    collection,
                    document,
                })
                .await
            {
                error!(message_id = %replacement_id, error = %e, "failed to persist replacement message");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_with_store, group_room, message_in, settle, user};

    /// Seed a message into both the store and the projection, the state an
    /// edit/delete target normally arrives in via the observer.
    async fn seed_message(
        client: &ChatClient,
        store: &palaver_store::MemoryStore,
        room: &Room,
        message: &Message,
    ) {
        store
            .execute(Statement::Upsert {
                collection: room.messages_collection_id.clone(),
                document: serde_json::to_value(message).unwrap(),
            })
            .await
            .unwrap();
        client.apply_message_batch(&room.id, vec![serde_json::to_value(message).unwrap()]);
    }

    #[tokio::test]
    async fn editing_preserves_attachments_and_archives_the_original() {
        let (store, client) = client_with_store();
        let room = group_room("general");
        client.inner.state().rooms.push(room.clone());

        let mut original = message_in(&room, "alice");
        original.thumbnail_token = Some(AttachmentToken("thumb".into()));
        original.image_token = Some(AttachmentToken("full".into()));
        seed_message(&client, &store, &room, &original).await;

        let edit = client
            .save_edited_text_message(&room, &original.id, "better wording")
            .unwrap();
        settle().await;

        assert!(edit.is_edited);
        assert_eq!(edit.archived_message, Some(original.id.clone()));
        assert_eq!(edit.thumbnail_token, original.thumbnail_token);
        assert_eq!(edit.image_token, original.image_token);
        assert_eq!(edit.created_on, original.created_on);

        let archived = store
            .document(&room.messages_collection_id, original.id.as_str())
            .unwrap();
        assert_eq!(archived["isArchived"], true);
        let persisted = store
            .document(&room.messages_collection_id, edit.id.as_str())
            .unwrap();
        assert_eq!(persisted["text"], "better wording");
    }

    #[tokio::test]
    async fn deleting_an_image_clears_attachments_and_mentions() {
        let (store, client) = client_with_store();
        let room = group_room("general");
        client.inner.state().rooms.push(room.clone());

        let mut original = message_in(&room, "alice");
        original.thumbnail_token = Some(AttachmentToken("thumb".into()));
        original.image_token = Some(AttachmentToken("full".into()));
        original.mentions.push(Mention {
            user_id: user("bob").id,
            start: 0,
            end: 4,
        });
        seed_message(&client, &store, &room, &original).await;

        let tombstone = client.save_deleted_message(&room, &original.id).unwrap();
        settle().await;

        assert!(tombstone.is_deleted);
        assert_eq!(tombstone.text, "[deleted image]");
        assert!(tombstone.thumbnail_token.is_none());
        assert!(tombstone.image_token.is_none());
        assert!(tombstone.file_token.is_none());
        assert!(tombstone.mentions.is_empty());

        let archived = store
            .document(&room.messages_collection_id, original.id.as_str())
            .unwrap();
        assert_eq!(archived["isArchived"], true);
    }

    #[tokio::test]
    async fn denied_edit_is_a_silent_noop() {
        let (store, client) = client_with_store();
        let room = group_room("general");
        client.inner.state().rooms.push(room.clone());

        let original = message_in(&room, "alice");
        seed_message(&client, &store, &room, &original).await;

        client.set_capability_override(Capability::EditOwnMessage, false);
        assert!(client
            .save_edited_text_message(&room, &original.id, "nope")
            .is_none());
        settle().await;

        let doc = store
            .document(&room.messages_collection_id, original.id.as_str())
            .unwrap();
        assert_eq!(doc["isArchived"], false);
    }

    #[tokio::test]
    async fn editing_a_message_outside_the_projection_is_refused() {
        let (_store, client) = client_with_store();
        let room = group_room("general");
        assert!(client
            .save_edited_text_message(&room, &MessageId("ghost".into()), "text")
            .is_none());
    }

    #[tokio::test]
    async fn sending_persists_the_document() {
        let (store, client) = client_with_store();
        let room = group_room("general");

        let message = client.create_message(&room, "hello there", Vec::new());
        settle().await;

        let doc = store
            .document(&room.messages_collection_id, message.id.as_str())
            .unwrap();
        assert_eq!(doc["text"], "hello there");
        assert_eq!(doc["authorId"], "alice");
    }

    #[tokio::test]
    async fn mentions_are_stripped_without_the_capability() {
        let (_store, client) = client_with_store();
        let room = group_room("general");
        client.set_capability_override(Capability::MentionUsers, false);

        let message = client.create_message(
            &room,
            "hi @bob",
            vec![Mention {
                user_id: user("bob").id,
                start: 3,
                end: 7,
            }],
        );
        assert!(message.mentions.is_empty());
    }

    #[tokio::test]
    async fn valid_mentions_append_to_the_pending_list() {
        let (store, client) = client_with_store();
        let room = group_room("general");
        client
            .inner
            .state()
            .users
            .insert(user("bob").id, user("bob"));

        let message = client.create_message(
            &room,
            "hi @bob",
            vec![Mention {
                user_id: user("bob").id,
                start: 3,
                end: 7,
            }],
        );
        settle().await;

        let state = client.inner.state();
        let bob = state.users.get(&user("bob").id).unwrap();
        assert_eq!(
            bob.pending_mentions.get(&room.id),
            Some(&vec![message.id.clone()])
        );
        drop(state);

        let doc = store
            .document(&client.inner.config.users_collection, "bob")
            .unwrap();
        assert!(doc["pendingMentions"][room.id.as_str()]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == message.id.as_str()));
    }
}
