//! Error types for tracking operations.
//!
//! Errors fall into a small taxonomy:
//!
//! - **Configuration** errors (unknown event type or status, invalid option,
//!   reconfiguring a started workflow) are fatal to the call that caused them.
//! - **Precondition** errors (no active session, view not ready) are returned
//!   to manual callers. Automatic paths skip silently instead.
//!
//! Detection races and duplicate trigger attempts are never errors: the
//! tracker recovers from the former and filters the latter.

use crate::element::ElementId;
use crate::view::Role;
use thiserror::Error;

/// Errors raised by the tracking core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    /// An event type string outside `impression` / `viewable` / `click`
    #[error("Unrecognized event type: {0}")]
    UnknownEventType(String),

    /// A tracking status string outside `untracked` / `tracking` / `triggered`
    #[error("Unrecognized tracking status: {0}")]
    UnknownTrackingStatus(String),

    /// A tracker option failed validation
    #[error("Invalid tracker option: {0}")]
    InvalidOption(String),

    /// Tracker options were changed after the workflow started
    #[error("Cannot change configuration after workflow starts")]
    ConfigurationLocked,

    /// A tracking call was made without an active session
    #[error("Workflow is not active. Call start() to activate it")]
    NotActive,

    /// A tracking call was made before the view reported `ready`
    #[error(
        "Workflow is not rendered yet. If you handle rendering by yourself, call notify_view_update() when the view is ready"
    )]
    NotReady,

    /// A second viewability observation was requested for a live element
    #[error("Element {0} is already under viewability observation")]
    AlreadyObserving(ElementId),

    /// No tracker is registered for the role
    #[error("No tracker registered for role '{0}'")]
    UnknownRole(Role),
}

impl TrackingError {
    /// Whether this error reports a transient lifecycle precondition
    /// (as opposed to a caller mistake)
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::NotActive | Self::NotReady)
    }
}

/// Errors reported by an interaction sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The payload could not be serialized
    #[error("Failed to serialize interaction: {0}")]
    Serialization(String),

    /// The transport rejected or failed to send the payload
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for DeliveryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_are_classified() {
        assert!(TrackingError::NotActive.is_precondition());
        assert!(TrackingError::NotReady.is_precondition());
        assert!(!TrackingError::ConfigurationLocked.is_precondition());
        assert!(!TrackingError::UnknownEventType("hover".into()).is_precondition());
    }

    #[test]
    fn messages_name_the_offending_value() {
        let error = TrackingError::UnknownTrackingStatus("done".into());
        assert_eq!(error.to_string(), "Unrecognized tracking status: done");
        let error = TrackingError::AlreadyObserving(ElementId::new(7));
        assert!(error.to_string().contains("#7"));
    }
}
