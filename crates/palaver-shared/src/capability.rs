//! Closed enumeration of capabilities checked by the permission gate.
//!
//! The default table is a total mapping: adding a variant without deciding
//! its default fails to compile instead of silently defaulting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    CreateRoom,
    EditOwnMessage,
    DeleteOwnMessage,
    MentionUsers,
}

impl Capability {
    /// Default policy when no explicit override is set. Every capability
    /// currently defaults to allowed.
    pub fn default_allow(self) -> bool {
        match self {
            Capability::CreateRoom => true,
            Capability::EditOwnMessage => true,
            Capability::DeleteOwnMessage => true,
            Capability::MentionUsers => true,
        }
    }

    pub const ALL: [Capability; 4] = [
        Capability::CreateRoom,
        Capability::EditOwnMessage,
        Capability::DeleteOwnMessage,
        Capability::MentionUsers,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_capability_defaults_to_allowed() {
        for cap in Capability::ALL {
            assert!(cap.default_allow(), "{cap:?} should default to allowed");
        }
    }
}
