//! Per-session tracking statuses.

use std::collections::HashMap;
use widget_tracking_core::{EventType, ProductState, TrackingStatus, Uuid};

/// Tracking statuses of every product seen during one session.
///
/// A `States` belongs to exactly one session uuid and is dropped when the
/// session rotates; it is never carried over. Entries are created lazily
/// on first write, never on read.
#[derive(Debug, Clone)]
pub struct States {
    uuid: Uuid,
    entries: HashMap<String, ProductState>,
}

impl States {
    /// Empty statuses for session `uuid`
    #[must_use]
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            entries: HashMap::new(),
        }
    }

    /// Session these statuses belong to
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Status of `product_id` for `event`; `Untracked` if never written
    #[must_use]
    pub fn get(&self, product_id: &str, event: EventType) -> TrackingStatus {
        self.entries
            .get(product_id)
            .map_or(TrackingStatus::Untracked, |state| state.get(event))
    }

    /// Stored snapshot of `product_id`, if anything was written for it
    #[must_use]
    pub fn full_state(&self, product_id: &str) -> Option<ProductState> {
        self.entries.get(product_id).copied()
    }

    /// Write `status` for `event` on every product in `product_ids`
    pub fn set<S: AsRef<str>>(&mut self, product_ids: &[S], event: EventType, status: TrackingStatus) {
        for product_id in product_ids {
            let entry = self
                .entries
                .entry(product_id.as_ref().to_owned())
                .or_insert(ProductState::UNTRACKED);
            match event {
                EventType::Impression => entry.impression = status,
                EventType::Viewable => entry.viewable = status,
                EventType::Click => entry.click = status,
            }
        }
    }

    /// The products of `product_ids` not yet triggered for `event`, in order.
    ///
    /// This is the at-most-once gate: every trigger writes `Triggered` for
    /// exactly the ids this returns.
    #[must_use]
    pub fn untriggered(&self, product_ids: &[String], event: EventType) -> Vec<String> {
        product_ids
            .iter()
            .filter(|id| self.get(id, event) != TrackingStatus::Triggered)
            .cloned()
            .collect()
    }

    /// Number of products with a stored entry
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was written yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
