//! # palaver-shared
//!
//! Domain model types shared between the store boundary and the client
//! engine: typed identifiers, room/message/user documents, and the closed
//! capability enumeration with its default-allow table.
//!
//! Everything persisted to the replicated store serializes as a camelCase
//! JSON document so the same structs double as wire documents and as the
//! values handed to the UI layer.

pub mod capability;
pub mod models;
pub mod types;

pub use capability::Capability;
pub use models::*;
pub use types::{AttachmentToken, CollectionId, MessageId, RoomId, UserId};
