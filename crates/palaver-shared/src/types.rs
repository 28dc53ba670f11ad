use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque user identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An identity is usable only when it is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier. Freshly created rooms get a random UUID; generated rooms
/// carry a caller-supplied id; DM rooms use the canonical pair key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Canonical id for the DM room between two users. Both orderings of the
    /// pair map to the same id, so racing creators upsert one document.
    pub fn dm_pair(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("dm:{lo}:{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier, globally unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a document collection in the replicated store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CollectionId(pub String);

impl CollectionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Per-room message collection for a regular room.
    pub fn messages_for(room: &RoomId) -> Self {
        Self(format!("messages:{room}"))
    }

    /// Per-pair message collection for a DM room.
    pub fn dm_messages_for(room: &RoomId) -> Self {
        Self(format!("dmMessages:{room}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a binary attachment held by the store. Transfer
/// mechanics live entirely behind the store boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct AttachmentToken(pub String);

impl AttachmentToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_pair_key_is_order_independent() {
        let a = UserId("alice".into());
        let b = UserId("bob".into());
        assert_eq!(RoomId::dm_pair(&a, &b), RoomId::dm_pair(&b, &a));
        assert_eq!(RoomId::dm_pair(&a, &b).as_str(), "dm:alice:bob");
    }

    #[test]
    fn blank_user_id_is_invalid() {
        assert!(!UserId("".into()).is_valid());
        assert!(!UserId("   ".into()).is_valid());
        assert!(UserId("carol".into()).is_valid());
    }
}
