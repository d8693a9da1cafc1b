//! # Widget Tracking Testing
//!
//! Testing utilities and helpers for the widget tracking workspace.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - An in-memory element tree ([`MockElement`])
//! - Recorders for published interactions
//! - Property-based testing strategies
//! - Assertion helpers for reducers
//!
//! ## Example
//!
//! ```ignore
//! use widget_tracking_testing::{InteractionRecorder, ManualViewport, MockElement};
//!
//! #[tokio::test(start_paused = true)]
//! async fn impression_fires_once() {
//!     let viewport = Rc::new(ManualViewport::new());
//!     let workflow = Workflow::new(/* ... */);
//!     let recorder = InteractionRecorder::attach(workflow.hub());
//!
//!     // ... bind products, start the session ...
//!
//!     assert_eq!(recorder.count_for("P1", EventType::Impression), 1);
//! }
//! ```

/// In-memory element tree
pub mod element_mocks;


pub use element_mocks::MockElement;
pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;
    use tokio::sync::watch;
    use widget_tracking_core::environment::{
        Disconnect, ElementSource, IdGenerator, InteractionSink, MutationWatcher, Viewport,
    };
    use widget_tracking_core::{DeliveryError, ElementId, ElementRef, Interaction, Uuid};

    /// Predictable id generator
    ///
    /// Mints `Uuid::from_u128(1)`, `Uuid::from_u128(2)`, ...
    ///
    /// # Example
    ///
    /// ```
    /// use widget_tracking_testing::mocks::SequentialIdGenerator;
    /// use widget_tracking_core::environment::IdGenerator;
    /// use widget_tracking_core::Uuid;
    ///
    /// let ids = SequentialIdGenerator::new();
    /// assert_eq!(ids.next_id(), Uuid::from_u128(1));
    /// assert_eq!(ids.next_id(), Uuid::from_u128(2));
    /// ```
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        next: Cell<u128>,
    }

    impl SequentialIdGenerator {
        /// Start counting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self { next: Cell::new(1) }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new()
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> Uuid {
            let n = self.next.get();
            self.next.set(n.wrapping_add(1));
            Uuid::from_u128(n)
        }
    }

    /// Viewport whose intersection ratios are set by the test.
    ///
    /// Every element starts fully hidden (`0.0`).
    #[derive(Debug, Default)]
    pub struct ManualViewport {
        ratios: RefCell<HashMap<ElementId, watch::Sender<f64>>>,
    }

    impl ManualViewport {
        /// Create a viewport where nothing is visible
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the visible fraction of `element`
        pub fn set_ratio(&self, element: ElementId, ratio: f64) {
            self.ratios
                .borrow_mut()
                .entry(element)
                .or_insert_with(|| watch::channel(0.0).0)
                .send_replace(ratio);
        }

        /// Current visible fraction of `element`
        #[must_use]
        pub fn ratio(&self, element: ElementId) -> f64 {
            self.ratios
                .borrow()
                .get(&element)
                .map_or(0.0, |sender| *sender.borrow())
        }
    }

    impl Viewport for ManualViewport {
        fn intersection(&self, element: &ElementRef) -> watch::Receiver<f64> {
            self.ratios
                .borrow_mut()
                .entry(element.id())
                .or_insert_with(|| watch::channel(0.0).0)
                .subscribe()
        }
    }

    /// Element source the test points at whatever root it likes
    #[derive(Debug, Clone, Default)]
    pub struct MockElementSource {
        root: Rc<RefCell<Option<ElementRef>>>,
    }

    impl MockElementSource {
        /// Create a source with no rendered root
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Render `root`
        pub fn set(&self, root: ElementRef) {
            *self.root.borrow_mut() = Some(root);
        }

        /// Unrender the root
        pub fn clear(&self) {
            self.root.borrow_mut().take();
        }
    }

    impl ElementSource for MockElementSource {
        fn element(&self) -> Option<ElementRef> {
            self.root.borrow().clone()
        }
    }

    type Observers = RefCell<Vec<(u64, Rc<dyn Fn()>)>>;

    /// Mutation watcher fired by hand with [`MockMutationWatcher::mutate`]
    #[derive(Clone, Default)]
    pub struct MockMutationWatcher {
        observers: Rc<Observers>,
        next: Rc<Cell<u64>>,
    }

    impl std::fmt::Debug for MockMutationWatcher {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockMutationWatcher")
                .field("observers", &self.observer_count())
                .finish()
        }
    }

    impl MockMutationWatcher {
        /// Create a watcher with no observers
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Notify every connected observer
        pub fn mutate(&self) {
            let callbacks: Vec<Rc<dyn Fn()>> = self
                .observers
                .borrow()
                .iter()
                .map(|(_, cb)| Rc::clone(cb))
                .collect();
            for callback in callbacks {
                callback();
            }
        }

        /// Number of connected observers
        #[must_use]
        pub fn observer_count(&self) -> usize {
            self.observers.borrow().len()
        }
    }

    impl MutationWatcher for MockMutationWatcher {
        fn observe(&self, _root: &ElementRef, on_mutation: Rc<dyn Fn()>) -> Disconnect {
            let id = self.next.get();
            self.next.set(id.wrapping_add(1));
            self.observers.borrow_mut().push((id, on_mutation));
            let observers = Rc::downgrade(&self.observers);
            Box::new(move || {
                if let Some(observers) = observers.upgrade() {
                    observers.borrow_mut().retain(|(other, _)| *other != id);
                }
            })
        }
    }

    /// Sink that keeps every payload it is handed
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        sent: Rc<RefCell<Vec<Interaction>>>,
        failing: Rc<Cell<bool>>,
    }

    impl RecordingSink {
        /// Create an empty, succeeding sink
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent sends fail with a transport error
        pub fn fail(&self, failing: bool) {
            self.failing.set(failing);
        }

        /// Payloads sent so far (failed sends are not kept)
        #[must_use]
        pub fn sent(&self) -> Vec<Interaction> {
            self.sent.borrow().clone()
        }
    }

    impl InteractionSink for RecordingSink {
        fn send(&self, interaction: &Interaction) -> Result<(), DeliveryError> {
            if self.failing.get() {
                return Err(DeliveryError::Transport("sink offline".into()));
            }
            self.sent.borrow_mut().push(interaction.clone());
            Ok(())
        }
    }
}

/// Recorders observing a live hub
pub mod recorders {
    use std::cell::RefCell;
    use std::rc::Rc;
    use widget_tracking_core::{EventType, Field, Interaction};
    use widget_tracking_runtime::{Hub, Subscription};

    /// Captures every interaction published on a hub
    #[derive(Debug)]
    pub struct InteractionRecorder {
        events: Rc<RefCell<Vec<Interaction>>>,
        _subscription: Subscription,
    }

    impl InteractionRecorder {
        /// Subscribe to `hub`'s interaction field
        #[must_use]
        pub fn attach(hub: &Hub) -> Self {
            let events = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&events);
            let subscription = hub.on(Field::Interaction, move |signal| {
                if let Some(interaction) = signal.as_interaction() {
                    sink.borrow_mut().push(interaction.clone());
                }
            });
            Self {
                events,
                _subscription: subscription,
            }
        }

        /// Everything recorded so far, in publication order
        #[must_use]
        pub fn events(&self) -> Vec<Interaction> {
            self.events.borrow().clone()
        }

        /// Number of recorded interactions
        #[must_use]
        pub fn len(&self) -> usize {
            self.events.borrow().len()
        }

        /// Whether nothing was recorded
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.events.borrow().is_empty()
        }

        /// `(event, product_ids)` pairs, the shape most assertions need
        #[must_use]
        pub fn summary(&self) -> Vec<(EventType, Vec<String>)> {
            self.events
                .borrow()
                .iter()
                .map(|i| (i.event, i.product_ids.clone()))
                .collect()
        }

        /// How many recorded interactions of `event` reference `product_id`
        #[must_use]
        pub fn count_for(&self, product_id: &str, event: EventType) -> usize {
            self.events
                .borrow()
                .iter()
                .filter(|i| i.event == event && i.product_ids.iter().any(|p| p == product_id))
                .count()
        }

        /// Drain the recorded interactions
        pub fn take(&self) -> Vec<Interaction> {
            std::mem::take(&mut *self.events.borrow_mut())
        }
    }
}

/// Property-based testing utilities
///
/// Strategies over the small, collision-heavy id spaces that exercise the
/// at-most-once gate.
pub mod properties {
    use proptest::prelude::*;
    use widget_tracking_core::EventType;

    /// One of a handful of product ids, so duplicates are common
    pub fn product_id() -> impl Strategy<Value = String> {
        (1u8..=5).prop_map(|n| format!("P{n}"))
    }

    /// A short list of product ids, possibly with repeats
    pub fn product_ids() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(product_id(), 0..6)
    }

    /// Any event type
    pub fn event_type() -> impl Strategy<Value = EventType> {
        prop::sample::select(EventType::ALL.to_vec())
    }
}

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-writer tracing subscriber once per test binary.
    ///
    /// Honours `RUST_LOG`; defaults to `warn`.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{
    ManualViewport, MockElementSource, MockMutationWatcher, RecordingSink, SequentialIdGenerator,
};
pub use recorders::InteractionRecorder;

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use widget_tracking_core::environment::{IdGenerator, InteractionSink, MutationWatcher, Viewport};
    use widget_tracking_core::{Element, EventType, Interaction, Role, Trigger, Uuid};

    #[test]
    fn sequential_ids_are_predictable() {
        let ids = SequentialIdGenerator::new();
        assert_eq!(ids.next_id(), Uuid::from_u128(1));
        assert_eq!(ids.next_id(), Uuid::from_u128(2));
    }

    #[test]
    fn manual_viewport_pushes_ratios_to_receivers() {
        let viewport = ManualViewport::new();
        let el = MockElement::product("P1");
        let mut rx = viewport.intersection(&el.handle());
        assert!((*rx.borrow_and_update()).abs() < f64::EPSILON);

        viewport.set_ratio(el.id(), 0.75);
        assert!(rx.has_changed().unwrap());
        assert!((*rx.borrow() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn mutation_watcher_disconnects() {
        let watcher = MockMutationWatcher::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let root = MockElement::root(None);
        let disconnect = watcher.observe(&root.handle(), Rc::new(move || counter.set(counter.get() + 1)));

        watcher.mutate();
        disconnect();
        watcher.mutate();

        assert_eq!(hits.get(), 1);
        assert_eq!(watcher.observer_count(), 0);
    }

    #[test]
    fn recording_sink_can_fail() {
        let sink = RecordingSink::new();
        let interaction =
            Interaction::new(EventType::Click, vec!["P1".into()], Role::Products, Trigger::Auto, None);
        sink.send(&interaction).unwrap();
        sink.fail(true);
        assert!(sink.send(&interaction).is_err());
        assert_eq!(sink.sent().len(), 1);
    }
}
