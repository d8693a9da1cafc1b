//! # Widget Tracking Core
//!
//! Core traits and types for interaction tracking in embeddable
//! search/recommendation widgets.
//!
//! A widget reports three kinds of interaction per product (impression,
//! viewability, click) at most once per session. This crate holds the pieces
//! every other crate in the workspace builds on:
//!
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (hub publication, async waits)
//! - **Environment**: Injected collaborators (id generation, viewport, element tree)
//! - **Signal**: The closed registry of hub fields and their value shapes
//! - **Tracking model**: sessions, view states, statuses, interaction payloads
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Single-threaded, cooperative scheduling (`Rc`, no locks)
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```ignore
//! use widget_tracking_core::*;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         state.count += 1;
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};
pub use uuid::Uuid;

/// Element tree abstraction consumed from the rendering collaborator
pub mod element;

/// Error taxonomy shared by every crate in the workspace
pub mod error;

/// Aggregated interaction payloads published on the hub
pub mod interaction;

/// Tracker configuration surface
pub mod options;

/// Session identity
pub mod session;

/// Hub field registry (`Field` / `Signal`)
pub mod signal;

/// Event types, tracking statuses and per-product snapshots
pub mod tracking;

/// View state reported by the rendering collaborator
pub mod view;

pub use element::{find_in_ancestors, Element, ElementId, ElementRef};
pub use error::{DeliveryError, TrackingError};
pub use interaction::{uuid_to_timestamp, CustomContext, Interaction, InteractionContext, Trigger};
pub use options::{ClickOptions, ImpressionOptions, TrackerOptions, ViewableOptions};
pub use session::Session;
pub use signal::{Field, Signal};
pub use tracking::{EventType, ProductState, TrackingStatus};
pub use view::{Role, ViewMeta, ViewState, ViewStatus};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for TrackerReducer {
    ///     type State = TrackerState;
    ///     type Action = TrackerAction;
    ///     type Environment = TrackerEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut TrackerState,
    ///         action: TrackerAction,
    ///         env: &TrackerEnvironment,
    ///     ) -> SmallVec<[Effect<TrackerAction>; 4]> {
    ///         match action {
    ///             TrackerAction::Retire => {
    ///                 state.retire(env);
    ///                 smallvec![Effect::None]
    ///             }
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution). The runtime executes them on a single
/// thread, so futures are not required to be `Send`.
pub mod effect {
    use crate::signal::Signal;
    use futures::future::LocalBoxFuture;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Publish a fire-and-forget signal on the hub
        ///
        /// The signal is not persisted; subscribers of its field are notified
        /// synchronously.
        Publish(Signal),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(LocalBoxFuture<'static, Option<Action>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Publish(signal) => f.debug_tuple("Effect::Publish").field(signal).finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Returns the published signal, if this is a `Publish` effect
        #[must_use]
        pub const fn as_signal(&self) -> Option<&Signal> {
            match self {
                Effect::Publish(signal) => Some(signal),
                _ => None,
            }
        }

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external collaborators are abstracted behind traits and injected
/// via the Environment parameter or the workflow constructor.
pub mod environment {
    use crate::element::ElementRef;
    use crate::error::DeliveryError;
    use crate::interaction::Interaction;
    use std::rc::Rc;
    use tokio::sync::watch;
    use uuid::Uuid;

    /// Source of fresh, unique identifiers
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - random v4 UUIDs
    /// let ids = UuidV4Generator;
    ///
    /// // Test - predictable ids for deterministic assertions
    /// let ids = SequentialIdGenerator::new();
    /// ```
    pub trait IdGenerator {
        /// Mint a new identifier
        fn next_id(&self) -> Uuid;
    }

    /// Random v4 UUID generator
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidV4Generator;

    impl IdGenerator for UuidV4Generator {
        fn next_id(&self) -> Uuid {
            Uuid::new_v4()
        }
    }

    /// Reports how much of an element is visible
    ///
    /// The receiver carries the exposed fraction of the element's area
    /// (`0.0..=1.0`). Implementations push a new value whenever it changes,
    /// the way an intersection observer would.
    pub trait Viewport {
        /// Start reporting the visible fraction of `element`
        fn intersection(&self, element: &ElementRef) -> watch::Receiver<f64>;
    }

    /// The rendering collaborator's accessor for the current element tree
    pub trait ElementSource {
        /// Root element of the rendered view, if any
        fn element(&self) -> Option<ElementRef>;
    }

    /// Stops a mutation watch when called
    pub type Disconnect = Box<dyn FnOnce()>;

    /// Watches an element subtree for structural mutations
    pub trait MutationWatcher {
        /// Call `on_mutation` whenever the subtree under `root` changes
        fn observe(&self, root: &ElementRef, on_mutation: Rc<dyn Fn()>) -> Disconnect;
    }

    /// Transmits interaction payloads to a backend
    ///
    /// Sends are fire-and-forget (beacon style): a sink reports failure but
    /// callers never retry.
    pub trait InteractionSink {
        /// Transmit one interaction
        ///
        /// # Errors
        ///
        /// Returns [`DeliveryError`] if the payload could not be handed off.
        fn send(&self, interaction: &Interaction) -> Result<(), DeliveryError>;
    }
}
