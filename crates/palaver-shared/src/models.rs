//! Domain documents kept in the replicated store.
//!
//! Every struct serializes as a camelCase JSON document; the same value is
//! what the store replicates and what the projection hands to the UI layer.
//!
//! Messages are never mutated in place once persisted: an edit or delete
//! archives the original and inserts a replacement whose `archived_message`
//! field names the message it supersedes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AttachmentToken, CollectionId, MessageId, RoomId, UserId};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A conversation channel (group or direct-message).
///
/// Immutable after creation except via full upsert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Unique room identifier.
    pub id: RoomId,
    /// Human-readable room name.
    pub name: String,
    /// Collection holding this room's messages.
    pub messages_collection_id: CollectionId,
    /// User who created the room.
    pub created_by: UserId,
    /// When the room was created.
    pub created_on: DateTime<Utc>,
    /// The participant pair for DM rooms; `None` for group rooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<UserId>>,
    /// Per-room retention override in days, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    /// Generated rooms are hidden from the default room listing and
    /// subscribed to on demand.
    #[serde(default)]
    pub is_generated: bool,
}

impl Room {
    pub fn is_direct(&self) -> bool {
        self.participants.is_some()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A reaction on a message. Unique per (user, emoji); business logic, not
/// storage, enforces the uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
    /// Emoji metadata (shortcode name), when the picker supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji_name: Option<String>,
}

/// A user mention with the text span it covers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub user_id: UserId,
    pub start: usize,
    pub end: usize,
}

/// What kind of content a message carries, derived from which attachment
/// references are set. Drives the deleted-message placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
    File,
}

/// A single chat entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// The room this message belongs to.
    pub room_id: RoomId,
    /// Author of the message.
    pub author_id: UserId,
    /// When the message was created. Replacement messages keep the
    /// original's timestamp so the version chain occupies the original
    /// conversation turn under ascending ordering.
    pub created_on: DateTime<Utc>,
    /// Message text; placeholder text for deleted messages.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_token: Option<AttachmentToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_token: Option<AttachmentToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_token: Option<AttachmentToken>,
    /// Set on a message that has been superseded by an edit or delete.
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub is_deleted: bool,
    /// Id of the message this one supersedes, if it is a replacement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_message: Option<MessageId>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl Message {
    /// The message this one supersedes in its version chain, if any.
    pub fn supersedes(&self) -> Option<&MessageId> {
        self.archived_message.as_ref()
    }

    pub fn content_kind(&self) -> ContentKind {
        if self.image_token.is_some() || self.thumbnail_token.is_some() {
            ContentKind::Image
        } else if self.file_token.is_some() {
            ContentKind::File
        } else {
            ContentKind::Text
        }
    }

    /// Placeholder text for the replacement created by a delete.
    pub fn deleted_placeholder(&self) -> &'static str {
        match self.content_kind() {
            ContentKind::Text => "[deleted message]",
            ContentKind::Image => "[deleted image]",
            ContentKind::File => "[deleted file]",
        }
    }

    pub fn mentions_user(&self, user: &UserId) -> bool {
        self.mentions.iter().any(|m| &m.user_id == user)
    }
}

// ---------------------------------------------------------------------------
// ChatUser
// ---------------------------------------------------------------------------

/// A user directory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub id: UserId,
    pub display_name: String,
    /// Per-room subscription timestamp. `Some(None)` is an explicit
    /// unsubscribe; a set timestamp only ever moves forward.
    #[serde(default)]
    pub subscriptions: HashMap<RoomId, Option<DateTime<Utc>>>,
    /// Per-room list of message ids mentioning this user that they have not
    /// yet read.
    #[serde(default)]
    pub pending_mentions: HashMap<RoomId, Vec<MessageId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_token: Option<AttachmentToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_thumbnail_token: Option<AttachmentToken>,
}

impl ChatUser {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            subscriptions: HashMap::new(),
            pending_mentions: HashMap::new(),
            avatar_token: None,
            avatar_thumbnail_token: None,
        }
    }

    /// Whether the user has an active (non-null) subscription for a room.
    pub fn is_subscribed_to(&self, room: &RoomId) -> bool {
        matches!(self.subscriptions.get(room), Some(Some(_)))
    }
}

// ---------------------------------------------------------------------------
// MessageWithUser
// ---------------------------------------------------------------------------

/// Denormalized join of a message with its resolved author; the unit stored
/// in the per-room projection list. Author resolution is best-effort.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithUser {
    pub message: Message,
    pub author: Option<ChatUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> Message {
        Message {
            id: MessageId(id.into()),
            room_id: RoomId("room".into()),
            author_id: UserId("alice".into()),
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

    #[test]
    fn placeholder_follows_content_kind() {
        let text = message("m1");
        assert_eq!(text.deleted_placeholder(), "[deleted message]");

        let mut image = message("m2");
        image.thumbnail_token = Some(AttachmentToken("thumb".into()));
        image.image_token = Some(AttachmentToken("full".into()));
        assert_eq!(image.deleted_placeholder(), "[deleted image]");

        let mut file = message("m3");
        file.file_token = Some(AttachmentToken("file".into()));
        assert_eq!(file.deleted_placeholder(), "[deleted file]");
    }

    #[test]
    fn supersedes_names_the_archived_message() {
        let mut edit = message("m2");
        assert!(edit.supersedes().is_none());
        edit.archived_message = Some(MessageId("m1".into()));
        assert_eq!(edit.supersedes(), Some(&MessageId("m1".into())));
    }

    #[test]
    fn document_round_trips_as_camel_case() {
        let mut msg = message("m1");
        msg.mentions.push(Mention {
            user_id: UserId("bob".into()),
            start: 0,
            end: 4,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("roomId").is_some());
        assert!(value.get("createdOn").is_some());
        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }
}
