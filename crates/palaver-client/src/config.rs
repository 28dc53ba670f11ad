use palaver_shared::CollectionId;

/// Retention window applied when neither the room, the subscriber, nor the
/// session config specifies one.
pub const FALLBACK_RETENTION_DAYS: u32 = 30;

/// Session configuration: which collections the client binds to and the
/// global retention default.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rooms_collection: CollectionId,
    pub dm_rooms_collection: CollectionId,
    pub users_collection: CollectionId,
    /// Global retention default in days; rooms and subscribers may override.
    pub default_retention_days: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rooms_collection: CollectionId::new("rooms"),
            dm_rooms_collection: CollectionId::new("dmRooms"),
            users_collection: CollectionId::new("users"),
            default_retention_days: None,
        }
    }
}
