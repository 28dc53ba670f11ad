//! Typed statements and queries accepted by the store boundary.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use palaver_shared::{CollectionId, RoomId, UserId};

/// A data-mutating or point-read statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Insert the document, replacing any existing document with the same id.
    Upsert {
        collection: CollectionId,
        document: Value,
    },
    /// Merge fields into an existing document; a no-op if it is absent.
    Patch {
        collection: CollectionId,
        id: String,
        fields: Map<String, Value>,
    },
    /// Point read by document id.
    SelectById { collection: CollectionId, id: String },
}

impl Statement {
    pub fn collection(&self) -> &CollectionId {
        match self {
            Statement::Upsert { collection, .. }
            | Statement::Patch { collection, .. }
            | Statement::SelectById { collection, .. } => collection,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Statement::SelectById { .. })
    }
}

/// Predicate a live query filters documents by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Every document in the collection.
    All,
    /// Messages for one room, not archived, created at or after the cutoff,
    /// ordered ascending by creation time.
    VisibleMessagesSince {
        room_id: RoomId,
        cutoff: DateTime<Utc>,
    },
    /// Rooms whose participant list contains the user.
    DirectRoomsWith { user_id: UserId },
}

/// A live query: a collection plus a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: CollectionId,
    pub filter: Filter,
}

impl Query {
    pub fn all(collection: CollectionId) -> Self {
        Self {
            collection,
            filter: Filter::All,
        }
    }

    pub fn visible_messages_since(
        collection: CollectionId,
        room_id: RoomId,
        cutoff: DateTime<Utc>,
    ) -> Self {
        Self {
            collection,
            filter: Filter::VisibleMessagesSince { room_id, cutoff },
        }
    }

    pub fn direct_rooms_with(collection: CollectionId, user_id: UserId) -> Self {
        Self {
            collection,
            filter: Filter::DirectRoomsWith { user_id },
        }
    }
}
