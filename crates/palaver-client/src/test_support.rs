//! Shared fixtures for the crate's test modules.

use std::sync::Arc;

use chrono::Utc;

use palaver_shared::{ChatUser, CollectionId, Message, MessageId, Room, RoomId, UserId};
use palaver_store::MemoryStore;

use crate::{ChatClient, ClientConfig};

pub(crate) fn user(id: &str) -> ChatUser {
    ChatUser::new(UserId(id.into()), id)
}

/// A client for user `alice` over a fresh in-memory store.
pub(crate) fn client_with_store() -> (Arc<MemoryStore>, ChatClient) {
    let store = Arc::new(MemoryStore::new());
    let client = ChatClient::new(store.clone(), ClientConfig::default(), user("alice"));
    (store, client)
}

pub(crate) fn group_room(name: &str) -> Room {
    Room {
        id: RoomId(format!("room:{name}")),
        name: name.into(),
        messages_collection_id: CollectionId::new(format!("messages:room:{name}")),
        created_by: UserId("alice".into()),
        created_on: Utc::now(),
        participants: None,
        retention_days: None,
        is_generated: false,
    }
}

pub(crate) fn message_in(room: &Room, author: &str) -> Message {
    Message {
        id: MessageId::generate(),
        room_id: room.id.clone(),
        author_id: UserId(author.into()),
        created_on: Utc::now(),
        text: "hello".into(),
        thumbnail_token: None,
        image_token: None,
        file_token: None,
        is_archived: false,
        is_edited: false,
        is_deleted: false,
        archived_message: None,
        reactions: Vec::new(),
        mentions: Vec::new(),
    }
}

/// Let spawned fire-and-forget persistence tasks run to completion on the
/// current-thread test runtime.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
