//! Hub field registry.
//!
//! The hub is keyed by a closed set of fields. Each field has exactly one
//! value shape, encoded by the matching [`Signal`] variant, so a subscriber
//! to a field can only ever receive that field's payload.

use crate::interaction::Interaction;
use crate::session::Session;
use crate::view::{Role, ViewState};
use std::fmt;

/// A hub field identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The current session
    Session,
    /// View state of one role
    View(Role),
    /// Aggregated interaction events
    Interaction,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::View(role) => write!(f, "view:{role}"),
            Self::Interaction => f.write_str("interaction"),
        }
    }
}

/// A value published on a hub field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// New current session
    Session(Session),
    /// New view state for a role
    View(Role, ViewState),
    /// An interaction event
    Interaction(Interaction),
}

impl Signal {
    /// The field this signal belongs to
    #[must_use]
    pub const fn field(&self) -> Field {
        match self {
            Self::Session(_) => Field::Session,
            Self::View(role, _) => Field::View(*role),
            Self::Interaction(_) => Field::Interaction,
        }
    }

    /// The session payload, for `Session` signals
    #[must_use]
    pub const fn as_session(&self) -> Option<&Session> {
        match self {
            Self::Session(session) => Some(session),
            _ => None,
        }
    }

    /// The view payload, for `View` signals
    #[must_use]
    pub const fn as_view(&self) -> Option<&ViewState> {
        match self {
            Self::View(_, view) => Some(view),
            _ => None,
        }
    }

    /// The interaction payload, for `Interaction` signals
    #[must_use]
    pub const fn as_interaction(&self) -> Option<&Interaction> {
        match self {
            Self::Interaction(interaction) => Some(interaction),
            _ => None,
        }
    }
}
