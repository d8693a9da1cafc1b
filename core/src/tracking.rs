//! Event types, tracking statuses and per-product snapshots.
//!
//! Both enums are closed: any string outside them is rejected when parsed,
//! which is the only place an unvalidated value can enter the system.

use crate::error::TrackingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of interaction reported for a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The product was rendered
    Impression,
    /// The product was visible long enough
    Viewable,
    /// The product was clicked
    Click,
}

impl EventType {
    /// All event types, in reporting order
    pub const ALL: [Self; 3] = [Self::Impression, Self::Viewable, Self::Click];

    /// Internal name, also the tracking state key
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Viewable => "viewable",
            Self::Click => "click",
        }
    }

    /// Name reported to the backend
    #[must_use]
    pub const fn public_name(self) -> &'static str {
        match self {
            Self::Viewable => "viewable_impression",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TrackingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "impression" => Ok(Self::Impression),
            "viewable" => Ok(Self::Viewable),
            "click" => Ok(Self::Click),
            other => Err(TrackingError::UnknownEventType(other.to_string())),
        }
    }
}

/// Tracking progress of one (product, event type) pair.
///
/// Within a session the status only moves forward
/// (`untracked → tracking → triggered`), except that an aborted viewability
/// detection returns `tracking` to `untracked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// Nothing observed yet
    #[default]
    Untracked,
    /// Waiting on an async condition
    Tracking,
    /// Event emitted; never emitted again in this session
    Triggered,
}

impl TrackingStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Untracked => "untracked",
            Self::Tracking => "tracking",
            Self::Triggered => "triggered",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingStatus {
    type Err = TrackingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "untracked" => Ok(Self::Untracked),
            "tracking" => Ok(Self::Tracking),
            "triggered" => Ok(Self::Triggered),
            other => Err(TrackingError::UnknownTrackingStatus(other.to_string())),
        }
    }
}

/// Frozen snapshot of a product's three statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductState {
    /// Impression status
    pub impression: TrackingStatus,
    /// Viewability status
    pub viewable: TrackingStatus,
    /// Click status
    pub click: TrackingStatus,
}

impl ProductState {
    /// Everything untracked
    pub const UNTRACKED: Self = Self {
        impression: TrackingStatus::Untracked,
        viewable: TrackingStatus::Untracked,
        click: TrackingStatus::Untracked,
    };

    /// Status for one event type
    #[must_use]
    pub const fn get(&self, event: EventType) -> TrackingStatus {
        match event {
            EventType::Impression => self.impression,
            EventType::Viewable => self.viewable,
            EventType::Click => self.click,
        }
    }
}
