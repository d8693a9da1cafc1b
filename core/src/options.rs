//! Tracker configuration.
//!
//! The configuration surface mirrors the JSON integrators write:
//!
//! ```json
//! { "impression": {}, "viewable": { "area": 0.5, "duration": 1000 }, "click": { "lenient": false }, "watch": false }
//! ```
//!
//! Each event key accepts `false` (disabled), `true` or `{}` (defaults), or a
//! partial object merged over the defaults.

use crate::error::TrackingError;
use crate::tracking::EventType;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// Impression tracking options (currently none)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImpressionOptions {}

/// Viewability thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewableOptions {
    /// Fraction of the element's area that must be exposed (`0.0..=1.0`)
    pub area: f64,
    /// Minimum continuous exposure, in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

impl ViewableOptions {
    /// Minimum continuous exposure
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for ViewableOptions {
    fn default() -> Self {
        Self {
            area: 0.5,
            duration_ms: 1000,
        }
    }
}

/// Click validation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickOptions {
    /// Accept any click on a bound element, skipping the button, default
    /// action and anchor checks
    pub lenient: bool,
}

/// Tracker configuration; `None` disables an event type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTrackerOptions")]
pub struct TrackerOptions {
    /// Impression tracking
    #[serde(serialize_with = "serialize_toggle")]
    pub impression: Option<ImpressionOptions>,
    /// Viewability tracking
    #[serde(serialize_with = "serialize_toggle")]
    pub viewable: Option<ViewableOptions>,
    /// Click tracking
    #[serde(serialize_with = "serialize_toggle")]
    pub click: Option<ClickOptions>,
    /// Re-reconcile on element tree mutations
    pub watch: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            impression: Some(ImpressionOptions::default()),
            viewable: Some(ViewableOptions::default()),
            click: Some(ClickOptions::default()),
            watch: false,
        }
    }
}

impl TrackerOptions {
    /// Everything disabled
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            impression: None,
            viewable: None,
            click: None,
            watch: false,
        }
    }

    /// Parse options from their JSON form
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::InvalidOption`] if the JSON is malformed or a
    /// value is out of range.
    pub fn from_json(json: &str) -> Result<Self, TrackingError> {
        serde_json::from_str(json).map_err(|e| TrackingError::InvalidOption(e.to_string()))
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::InvalidOption`] if `viewable.area` is not a
    /// finite fraction in `[0, 1]`.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if let Some(viewable) = &self.viewable {
            if !viewable.area.is_finite() || !(0.0..=1.0).contains(&viewable.area) {
                return Err(TrackingError::InvalidOption(format!(
                    "viewable.area must be between 0 and 1, got {}",
                    viewable.area
                )));
            }
        }
        Ok(())
    }

    /// Whether tracking of `event` is enabled
    #[must_use]
    pub const fn is_enabled(&self, event: EventType) -> bool {
        match event {
            EventType::Impression => self.impression.is_some(),
            EventType::Viewable => self.viewable.is_some(),
            EventType::Click => self.click.is_some(),
        }
    }
}

// Disabled serializes as `false` so the JSON form reads back unchanged
fn serialize_toggle<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(options) => options.serialize(serializer),
        None => serializer.serialize_bool(false),
    }
}

/// `false`, `true` or an options object
#[derive(Deserialize)]
#[serde(untagged)]
enum Toggle<T> {
    Flag(bool),
    Options(T),
}

impl<T: Default> Toggle<T> {
    fn into_option(self) -> Option<T> {
        match self {
            Self::Flag(false) => None,
            Self::Flag(true) => Some(T::default()),
            Self::Options(options) => Some(options),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTrackerOptions {
    impression: Option<Toggle<ImpressionOptions>>,
    viewable: Option<Toggle<ViewableOptions>>,
    click: Option<Toggle<ClickOptions>>,
    #[serde(default)]
    watch: bool,
}

fn resolve<T: Default>(raw: Option<Toggle<T>>) -> Option<T> {
    raw.map_or_else(|| Some(T::default()), Toggle::into_option)
}

impl TryFrom<RawTrackerOptions> for TrackerOptions {
    type Error = TrackingError;

    fn try_from(raw: RawTrackerOptions) -> Result<Self, Self::Error> {
        let options = Self {
            impression: resolve(raw.impression),
            viewable: resolve(raw.viewable),
            click: resolve(raw.click),
            watch: raw.watch,
        };
        options.validate()?;
        Ok(options)
    }
}
