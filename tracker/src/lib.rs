//! # Widget Tracking
//!
//! At-most-once interaction tracking for embeddable search and
//! recommendation widgets.
//!
//! A [`Workflow`] owns a hub, its session lifecycle and one [`Tracker`] per
//! rendered role. Each tracker reconciles the products rendered under its
//! root ([`Items`]), reports impressions as soon as products are bound,
//! viewable impressions once a product stays exposed long enough, and clicks
//! that pass the configured policy. Every `(product, event)` pair is reported
//! at most once per session ([`States`]); rotating the session discards all
//! of it.
//!
//! ## Example
//!
//! ```ignore
//! let workflow = Workflow::new(Rc::new(UuidV4Generator), viewport);
//! workflow.use_trackers(TrackerOptions::from_json(r#"{"click": {"lenient": true}}"#)?)?;
//! workflow.use_delivery(Rc::new(BeaconSink::new()));
//! let tracker = workflow.add_tracker(Role::Products, renderer.clone());
//!
//! workflow.start();
//! workflow.notify_view_update(Role::Products, ViewUpdate::ready())?;
//! tracker.click(["P1"], TriggerOptions::default())?;
//! ```
//!
//! Viewability waits run on `tokio::task::spawn_local`; drive the workflow
//! from inside a `tokio::task::LocalSet`.

pub mod delivery;
pub mod items;
pub mod reducer;
pub mod states;
pub mod tracker;
pub mod workflow;

pub use delivery::{ApiInfo, Delivery};
pub use items::{Binding, BindingDelta, Items};
pub use reducer::{
    ClickEvent, TrackerAction, TrackerEnvironment, TrackerReducer, TrackerState, TriggerOptions,
};
pub use states::States;
pub use tracker::{Collaborators, Tracker};
pub use widget_tracking_core::environment::InteractionSink;
pub use workflow::{ViewUpdate, Workflow};
