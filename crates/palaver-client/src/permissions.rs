//! The permission gate: one boolean capability check.
//!
//! Overrides are consulted first; an unset capability falls back to the
//! closed default table on [`Capability`]. Pure and synchronous, no error
//! conditions.

use std::collections::HashMap;

use palaver_shared::Capability;

use crate::ChatClient;

/// Resolve a capability against the override table, falling back to the
/// default-allow table.
pub(crate) fn allowed(overrides: &HashMap<Capability, bool>, capability: Capability) -> bool {
    overrides
        .get(&capability)
        .copied()
        .unwrap_or_else(|| capability.default_allow())
}

impl ChatClient {
    pub fn can_perform(&self, capability: Capability) -> bool {
        allowed(&self.inner.state().capability_overrides, capability)
    }

    pub fn set_capability_override(&self, capability: Capability, allow: bool) {
        self.inner
            .state()
            .capability_overrides
            .insert(capability, allow);
    }

    pub fn clear_capability_override(&self, capability: Capability) {
        self.inner.state().capability_overrides.remove(&capability);
    }
}
