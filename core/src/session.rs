//! Session identity.
//!
//! A session is one logical browsing/query episode. Its uuid versions every
//! piece of per-session derived state: anything tagged with a stale uuid is
//! discarded, never reused.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    /// Unique session id
    pub uuid: Uuid,
    /// Whether the session has been started
    pub active: bool,
}

impl Session {
    /// A freshly minted, not yet started session
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            active: false,
        }
    }

    /// The same session, marked active
    #[must_use]
    pub const fn activated(self) -> Self {
        Self {
            uuid: self.uuid,
            active: true,
        }
    }

    /// Whether `other` refers to the same session (regardless of activity)
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}
