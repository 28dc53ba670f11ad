//! Optimistic reaction mutations: apply to the projection immediately,
//! persist asynchronously, roll back to the snapshot on confirmed failure.

use tracing::error;

use palaver_shared::{MessageId, Reaction, Room, RoomId};
use palaver_store::{ReplicaStore, Statement};

use crate::error::{ClientError, Result};
use crate::ChatClient;

impl ChatClient {
    /// Add the current user's reaction. One reaction per (user, emoji);
    /// re-adding the same pair replaces the existing entry.
    pub fn add_reaction(
        &self,
        room: &Room,
        message_id: &MessageId,
        emoji: &str,
        emoji_name: Option<String>,
    ) -> Result<()> {
        let user_id = self.inner.state().current_user.id.clone();
        let current = self.projected_reactions(&room.id, message_id)?;

        let mut next: Vec<Reaction> = current
            .into_iter()
            .filter(|r| !(r.user_id == user_id && r.emoji == emoji))
            .collect();
        next.push(Reaction {
            user_id,
            emoji: emoji.to_string(),
            emoji_name,
        });
        self.update_message_reactions(room, message_id, next)
    }

    /// Remove the current user's reaction for an emoji.
    pub fn remove_reaction(&self, room: &Room, message_id: &MessageId, emoji: &str) -> Result<()> {
        let user_id = self.inner.state().current_user.id.clone();
        let current = self.projected_reactions(&room.id, message_id)?;

        let next: Vec<Reaction> = current
            .into_iter()
            .filter(|r| !(r.user_id == user_id && r.emoji == emoji))
            .collect();
        self.update_message_reactions(room, message_id, next)
    }

    /// Overwrite the projected reaction list, then persist on the next tick.
    ///
    /// There is no concurrency token: a remote update landing between the
    /// local apply and the store write is overwritten, last write wins. On a
    /// rejected write the projection reverts to the pre-mutation snapshot.
    pub fn update_message_reactions(
        &self,
        room: &Room,
        message_id: &MessageId,
        reactions: Vec<Reaction>,
    ) -> Result<()> {
        let previous = {
            let mut state = self.inner.state();
            let entry = state
                .messages
                .get_mut(&room.id)
                .and_then(|list| list.iter_mut().find(|m| &m.message.id == message_id))
                .ok_or_else(|| ClientError::MessageNotFound(message_id.clone()))?;
            std::mem::replace(&mut entry.message.reactions, reactions.clone())
        };

        let client = self.clone();
        let collection = room.messages_collection_id.clone();
        let room_id = room.id.clone();
        let message_id = message_id.clone();
        tokio::spawn(async move {
            let value = match serde_json::to_value(&reactions) {
                Ok(value) => value,
                Err(e) => {
                    error!(message_id = %message_id, error = %e, "failed to serialize reactions, rolling back");
                    client.rollback_reactions(&room_id, &message_id, previous);
                    return;
                }
            };

            let mut fields = serde_json::Map::new();
            fields.insert("reactions".into(), value);
            if let Err(e) = client
                .inner
                .store
                .execute(Statement::Patch {
                    collection,
                    id: message_id.as_str().to_string(),
                    fields,
                })
                .await
            {
                error!(message_id = %message_id, error = %e, "reaction persistence failed, rolling back");
                client.rollback_reactions(&room_id, &message_id, previous);
            }
        });
        Ok(())
    }

    fn projected_reactions(&self, room_id: &RoomId, message_id: &MessageId) -> Result<Vec<Reaction>> {
        self.inner
            .state()
            .messages
            .get(room_id)
            .and_then(|list| list.iter().find(|m| &m.message.id == message_id))
            .map(|m| m.message.reactions.clone())
            .ok_or_else(|| ClientError::MessageNotFound(message_id.clone()))
    }

    fn rollback_reactions(&self, room_id: &RoomId, message_id: &MessageId, previous: Vec<Reaction>) {
        let mut state = self.inner.state();
        if let Some(entry) = state
            .messages
            .get_mut(room_id)
            .and_then(|list| list.iter_mut().find(|m| &m.message.id == message_id))
        {
            entry.message.reactions = previous;
        }
    }
}
