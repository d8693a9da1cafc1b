//! # Widget Tracking Runtime
//!
//! Runtime implementation for the widget tracking architecture.
//!
//! This crate provides the pieces that execute what the core crate
//! describes: the hub every component coordinates through, the session
//! lifecycle, the Store that runs reducers and their effects, and the
//! viewability detector behind `Effect::Future` waits.
//!
//! ## Core Components
//!
//! - **Hub**: Synchronous, field-keyed state store and event bus
//! - **SessionMaker**: Mints, rotates and starts sessions on the hub
//! - **Store**: Runs a reducer and executes its effects (feedback loop)
//! - **ViewabilityDetector**: Cancellable area/duration visibility waits
//!
//! Everything is single-threaded. Futures are spawned with
//! `tokio::task::spawn_local`, so stores must be driven from inside a
//! `tokio::task::LocalSet`.
//!
//! ## Example
//!
//! ```ignore
//! use widget_tracking_runtime::{Hub, SessionMaker, Store};
//!
//! let hub = Hub::new();
//! let sessions = SessionMaker::new(hub.clone(), Rc::new(UuidV4Generator));
//! sessions.start();
//!
//! let store = Store::new(initial_state, reducer, environment, hub.clone());
//! store.send(Action::DoSomething);
//! let value = store.state(|s| s.some_field);
//! ```

/// Synchronous field-keyed hub
pub mod hub;

/// Prometheus metrics for observability
pub mod metrics;

/// Session lifecycle
pub mod session;

/// Single-threaded reducer runtime
pub mod store;

/// Cancellable viewability detection
pub mod viewability;

pub use hub::{Hub, HubStates, Subscription};
pub use session::SessionMaker;
pub use store::Store;
pub use viewability::{Detection, ViewabilityDetector};
