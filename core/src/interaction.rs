//! Aggregated interaction payloads.
//!
//! One [`Interaction`] reports one event type for a batch of products. The
//! tracker publishes it on the hub's `interaction` field; a delivery
//! collaborator transmits it.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "type": "viewable_impression",
//!   "product_ids": ["P1"],
//!   "miso_id": "c232ab00-9414-11ec-b3c8-9f6bdeced846",
//!   "context": {
//!     "custom_context": { "api_ts": 1645557742000, "res_prop": "products", "trigger": "auto" }
//!   }
//! }
//! ```
//!
//! Absent optional values are omitted rather than serialized as `null`.

use crate::tracking::EventType;
use crate::view::Role;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Whether an interaction came from an integrator call or from observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Called through the public tracking API
    Manual,
    /// Produced by binding, viewability or click observation
    Auto,
}

/// Tracking-specific context fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomContext {
    /// Response time (Unix ms) recovered from the response id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_ts: Option<i64>,
    /// Response property that rendered the products
    pub res_prop: String,
    /// Manual or automatic provenance
    pub trigger: Trigger,
    /// API group of the originating request, filled in by delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    /// API name of the originating request, filled in by delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
}

/// Interaction context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionContext {
    /// Tracking-specific context
    pub custom_context: CustomContext,
}

/// One aggregated interaction event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interaction {
    /// Event type, serialized under its public name
    #[serde(rename = "type", serialize_with = "serialize_public_name")]
    pub event: EventType,
    /// Products the event reports, without duplicates
    pub product_ids: Vec<String>,
    /// Response-correlating id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miso_id: Option<String>,
    /// Context
    pub context: InteractionContext,
}

fn serialize_public_name<S: Serializer>(event: &EventType, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(event.public_name())
}

impl Interaction {
    /// Build an interaction for `product_ids` rendered under `role`
    #[must_use]
    pub fn new(
        event: EventType,
        product_ids: Vec<String>,
        role: Role,
        trigger: Trigger,
        miso_id: Option<String>,
    ) -> Self {
        let api_ts = miso_id.as_deref().and_then(uuid_to_timestamp);
        Self {
            event,
            product_ids,
            miso_id,
            context: InteractionContext {
                custom_context: CustomContext {
                    api_ts,
                    res_prop: role.res_prop().to_string(),
                    trigger,
                    api_group: None,
                    api_name: None,
                },
            },
        }
    }

    /// Whether the interaction came from a manual API call
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.context.custom_context.trigger == Trigger::Manual
    }
}

/// Unix milliseconds embedded in a time-based UUID.
///
/// Returns `None` when `id` is not a UUID or carries no timestamp
/// (v4 and friends).
#[must_use]
pub fn uuid_to_timestamp(id: &str) -> Option<i64> {
    let uuid = Uuid::parse_str(id).ok()?;
    let (secs, nanos) = uuid.get_timestamp()?.to_unix();
    i64::try_from(secs)
        .ok()?
        .checked_mul(1000)?
        .checked_add(i64::from(nanos / 1_000_000))
}
