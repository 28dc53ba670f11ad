//! The room registry: idempotent room creation, DM rooms, and the room list
//! projection.
//!
//! Room writes are idempotent upserts; DM room ids are the canonical
//! participant-pair key, so two clients racing to open the same DM converge
//! on one document instead of duplicating it.

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use palaver_shared::{Capability, ChatUser, CollectionId, Room, RoomId};
use palaver_store::{ReplicaStore, Statement};

use crate::error::{ClientError, Result};
use crate::ChatClient;

/// Which live query a room batch came from. Merging replaces only rooms
/// from the same source collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoomSource {
    Public,
    Direct,
}

impl ChatClient {
    /// Create a group room. Denied creations and persistence failures are
    /// logged and yield `None`.
    pub async fn create_room(&self, name: &str, retention_days: Option<u32>) -> Option<Room> {
        if !self.can_perform(Capability::CreateRoom) {
            warn!(name, "room creation denied by capability gate");
            return None;
        }

        let created_by = self.inner.state().current_user.id.clone();
        let id = RoomId::generate();
        let room = Room {
            id: id.clone(),
            name: name.to_string(),
            messages_collection_id: CollectionId::messages_for(&id),
            created_by,
            created_on: Utc::now(),
            participants: None,
            retention_days,
            is_generated: false,
        };

        let collection = self.inner.config.rooms_collection.clone();
        self.upsert_room(collection, room).await
    }

    /// Create (or converge on) the DM room with another user.
    ///
    /// The only thrown error in the registry: both identities must be valid,
    /// checked before any persistence is attempted. Persistence failures are
    /// logged and the locally built room is still returned.
    pub async fn create_dm_room(&self, other: &ChatUser) -> Result<Room> {
        let current = self.current_user();
        if !current.id.is_valid() || !other.id.is_valid() {
            return Err(ClientError::MissingUserId);
        }

        let id = RoomId::dm_pair(&current.id, &other.id);
        let room = Room {
            id: id.clone(),
            name: format!("{} & {}", current.display_name, other.display_name),
            messages_collection_id: CollectionId::dm_messages_for(&id),
            created_by: current.id.clone(),
            created_on: Utc::now(),
            participants: Some(vec![current.id, other.id.clone()]),
            retention_days: None,
            is_generated: false,
        };

        let collection = self.inner.config.dm_rooms_collection.clone();
        Ok(self.upsert_room(collection, room.clone()).await.unwrap_or(room))
    }

    /// Create a dynamically-addressed side-channel room with a
    /// caller-supplied id. Excluded from the default listing and subscribed
    /// to on demand rather than eagerly.
    pub async fn create_generated_room(&self, id: RoomId, name: &str) -> Option<Room> {
        if !self.can_perform(Capability::CreateRoom) {
            warn!(name, "room creation denied by capability gate");
            return None;
        }

        let created_by = self.inner.state().current_user.id.clone();
        let room = Room {
            id: id.clone(),
            name: name.to_string(),
            messages_collection_id: CollectionId::messages_for(&id),
            created_by,
            created_on: Utc::now(),
            participants: None,
            retention_days: None,
            is_generated: true,
        };

        let collection = self.inner.config.rooms_collection.clone();
        self.upsert_room(collection, room).await
    }

    /// Rooms shown in the default listing; generated rooms are filtered out.
    pub fn public_rooms(&self) -> Vec<Room> {
        self.inner
            .state()
            .rooms
            .iter()
            .filter(|r| !r.is_generated)
            .cloned()
            .collect()
    }

    pub fn dm_rooms(&self) -> Vec<Room> {
        self.inner.state().dm_rooms.clone()
    }

    pub fn room(&self, id: &RoomId) -> Option<Room> {
        self.inner.state().room_by_id(id).cloned()
    }

    async fn upsert_room(&self, collection: CollectionId, room: Room) -> Option<Room> {
        let document = match serde_json::to_value(&room) {
            Ok(doc) => doc,
            Err(e) => {
                error!(room_id = %room.id, error = %e, "failed to serialize room");
                return None;
            }
        };

        match self
            .inner
            .store
            .execute(Statement::Upsert {
                collection,
                document,
            })
            .await
        {
            Ok(_) => {
                info!(room_id = %room.id, name = %room.name, "room upserted");
                Some(room)
            }
            Err(e) => {
                error!(room_id = %room.id, error = %e, "failed to persist room");
                None
            }
        }
    }

    /// Merge a pushed room batch into the room list, replacing only rooms
    /// from the same source collection, then open message subscriptions for
    /// newly observed rooms.
    pub(crate) fn apply_room_batch(&self, source: RoomSource, rows: Vec<Value>) {
        let rooms: Vec<Room> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(room) => Some(room),
                Err(e) => {
                    warn!(error = %e, "skipping malformed room document");
                    None
                }
            })
            .collect();

        let to_subscribe: Vec<Room> = {
            let mut state = self.inner.state();
            match source {
                RoomSource::Public => state.rooms = rooms.clone(),
                RoomSource::Direct => state.dm_rooms = rooms.clone(),
            }
            state.rooms_loading = false;
            state.recompute_messages_loading();
            rooms
                .into_iter()
                .filter(|room| !room.is_generated && !state.subscriptions.contains_key(&room.id))
                .collect()
        };

        for room in to_subscribe {
            self.subscribe_room_messages(&room, None);
        }
    }
}
