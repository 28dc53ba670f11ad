//! Notification eligibility and payload construction.
//!
//! [`should_notify`] is a pure decision function; the projection calls it
//! for net-new messages and hands eligible ones to the UI-registered
//! handler. The evaluator itself performs no I/O.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use palaver_shared::{ChatUser, ContentKind, Message, MessageId, Room, RoomId};

use crate::ChatClient;

/// Messages older than this are historical backfill and never notify.
pub const NOTIFICATION_RECENCY_SECONDS: i64 = 10;

/// Maximum preview length in characters.
pub const PREVIEW_MAX_CHARS: usize = 30;

/// Payload handed to the UI-registered notification callback.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub room_id: RoomId,
    pub message_id: MessageId,
    pub title: String,
    pub preview: String,
}

pub type NotificationHandler = Arc<dyn Fn(Notification) + Send + Sync>;

/// Whether an incoming message should alert the viewer.
pub fn should_notify(message: &Message, room: &Room, viewer: &ChatUser, now: DateTime<Utc>) -> bool {
    if message.author_id == viewer.id {
        return false;
    }
    let age = now.signed_duration_since(message.created_on);
    if age > Duration::seconds(NOTIFICATION_RECENCY_SECONDS) {
        return false;
    }
    viewer.is_subscribed_to(&room.id) || room.is_direct() || message.mentions_user(&viewer.id)
}

/// Build the title/preview pair for an eligible message. DM notifications
/// are titled by the sender, group notifications by the room.
pub fn build_notification(
    message: &Message,
    room: &Room,
    author: Option<&ChatUser>,
) -> Notification {
    let title = if room.is_direct() {
        author
            .map(|a| a.display_name.clone())
            .unwrap_or_else(|| message.author_id.to_string())
    } else {
        room.name.clone()
    };

    let preview = if !message.text.is_empty() {
        message.text.chars().take(PREVIEW_MAX_CHARS).collect()
    } else {
        match message.content_kind() {
            ContentKind::Image => "[image]".to_string(),
            ContentKind::File => "[file]".to_string(),
            ContentKind::Text => String::new(),
        }
    };

    Notification {
        room_id: room.id.clone(),
        message_id: message.id.clone(),
        title,
        preview,
    }
}

impl ChatClient {
    /// Register the callback invoked for notification-eligible messages.
    pub fn set_notification_handler<F>(&self, handler: F)
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.inner.state().notification_handler = Some(Arc::new(handler));
    }
}
