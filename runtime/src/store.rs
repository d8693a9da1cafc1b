//! Store runtime for coordinating reducer execution and effect handling.
//!
//! The Store manages:
//! 1. State (behind a `RefCell`, single-threaded)
//! 2. Reducer (business logic)
//! 3. Environment (injected dependencies)
//! 4. Effect execution (with feedback loop)
//!
//! # Dispatch
//!
//! [`Store::send`] runs the reducer synchronously and executes the returned
//! effects before returning. Actions sent while a dispatch is already running
//! (from a hub subscriber reacting to a published signal, say) are queued
//! and drained in order before the outermost `send` returns, so the reducer
//! is never re-entered and the stack stays flat.
//!
//! `Effect::Future`s are spawned with [`tokio::task::spawn_local`]; the
//! store must therefore be driven from inside a [`tokio::task::LocalSet`].

use crate::hub::Hub;
use crate::metrics::TrackingMetrics;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use widget_tracking_core::{effect::Effect, reducer::Reducer, Signal};

struct StoreInner<R: Reducer> {
    state: RefCell<R::State>,
    reducer: R,
    environment: R::Environment,
    hub: Hub,
    queue: RefCell<VecDeque<R::Action>>,
    dispatching: Cell<bool>,
    pending_effects: Rc<Cell<usize>>,
}

/// The Store - runtime coordinator for a reducer
///
/// # Example
///
/// ```ignore
/// let store = Store::new(
///     TrackerState::new(Role::Products, TrackerOptions::default()),
///     TrackerReducer,
///     environment,
///     hub.clone(),
/// );
///
/// store.send(TrackerAction::Retire);
/// let live = store.state(|s| s.is_ready());
/// ```
pub struct Store<R: Reducer> {
    inner: Rc<StoreInner<R>>,
}

impl<R: Reducer> Clone for Store<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: Reducer> fmt::Debug for Store<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dispatching", &self.inner.dispatching.get())
            .field("queued_actions", &self.inner.queue.borrow().len())
            .field("pending_effects", &self.inner.pending_effects.get())
            .finish_non_exhaustive()
    }
}

/// Internal: clears the dispatching flag on drop, even if the reducer panics
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Internal: decrements the pending effect counter on drop
struct PendingGuard(Rc<Cell<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl<R> Store<R>
where
    R: Reducer + 'static,
    R::Action: 'static,
{
    /// Create a new store with initial state, reducer, environment and the
    /// hub that `Effect::Publish` targets
    #[must_use]
    pub fn new(initial_state: R::State, reducer: R, environment: R::Environment, hub: Hub) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(initial_state),
                reducer,
                environment,
                hub,
                queue: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
                pending_effects: Rc::new(Cell::new(0)),
            }),
        }
    }

    /// Send an action to the store
    ///
    /// 1. Borrows state mutably and calls the reducer
    /// 2. Releases the borrow
    /// 3. Executes the returned effects
    /// 4. Drains actions queued by reentrant sends
    ///
    /// # Panics
    ///
    /// If the reducer panics, the panic propagates. Reducers should be pure
    /// functions that do not panic.
    #[tracing::instrument(skip(self, action), name = "store_send")]
    pub fn send(&self, action: R::Action) {
        self.inner.queue.borrow_mut().push_back(action);
        if self.inner.dispatching.get() {
            tracing::trace!("Store is dispatching, action queued");
            return;
        }
        self.inner.dispatching.set(true);
        let _guard = DispatchGuard(&self.inner.dispatching);

        loop {
            let Some(action) = self.inner.queue.borrow_mut().pop_front() else {
                break;
            };
            let effects = {
                let mut state = self.inner.state.borrow_mut();
                self.inner
                    .reducer
                    .reduce(&mut state, action, &self.inner.environment)
            };
            for effect in effects {
                self.execute_effect(effect);
            }
        }
    }

    /// Read current state
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&R::State) -> T,
    {
        f(&self.inner.state.borrow())
    }

    /// The injected environment
    #[must_use]
    pub fn environment(&self) -> &R::Environment {
        &self.inner.environment
    }

    /// Hub targeted by `Effect::Publish`
    #[must_use]
    pub fn hub(&self) -> &Hub {
        &self.inner.hub
    }

    /// Number of spawned futures that have not completed
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.inner.pending_effects.get()
    }

    fn downgrade(&self) -> Weak<StoreInner<R>> {
        Rc::downgrade(&self.inner)
    }

    fn execute_effect(&self, effect: Effect<R::Action>) {
        match effect {
            Effect::None => {
                tracing::trace!("Executing Effect::None (no-op)");
            }
            Effect::Publish(signal) => {
                tracing::trace!(field = %signal.field(), "Executing Effect::Publish");
                if let Signal::Interaction(interaction) = &signal {
                    TrackingMetrics::record_interaction(interaction);
                }
                self.inner.hub.trigger(signal);
            }
            Effect::Future(fut) => {
                tracing::trace!("Executing Effect::Future");
                let pending = Rc::clone(&self.inner.pending_effects);
                pending.set(pending.get().saturating_add(1));
                let guard = PendingGuard(pending);
                let store = self.downgrade();

                tokio::task::spawn_local(async move {
                    let _guard = guard;
                    let Some(action) = fut.await else {
                        tracing::trace!("Effect::Future completed with no action");
                        return;
                    };
                    match store.upgrade() {
                        Some(inner) => Store { inner }.send(action),
                        None => tracing::trace!("Store dropped, discarding feedback action"),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::task::LocalSet;
    use widget_tracking_core::{
        smallvec, EventType, Field, Interaction, Role, SmallVec, Trigger,
    };

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
        IncrementLater,
        Announce,
        Record(&'static str),
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                }
                TestAction::IncrementLater => smallvec![Effect::Future(Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Some(TestAction::Increment)
                }))],
                TestAction::Announce => smallvec![Effect::Publish(Signal::Interaction(Interaction::new(
                    EventType::Impression,
                    vec![state.value.to_string()],
                    Role::Products,
                    Trigger::Auto,
                    None,
                )))],
                TestAction::Record(tag) => {
                    state.log.push(tag);
                    smallvec![Effect::None]
                }
            }
        }
    }

    fn store() -> Store<TestReducer> {
        Store::new(
            TestState {
                value: 0,
                log: Vec::new(),
            },
            TestReducer,
            (),
            Hub::new(),
        )
    }

    #[test]
    fn send_reduces_synchronously() {
        let store = store();
        store.send(TestAction::Increment);
        store.send(TestAction::Increment);
        assert_eq!(store.state(|s| s.value), 2);
    }

    #[test]
    fn publish_triggers_on_hub_without_persisting() {
        let store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let _sub = store.hub().on(Field::Interaction, move |signal| {
            log.borrow_mut().push(signal.as_interaction().unwrap().product_ids.clone());
        });

        store.send(TestAction::Increment);
        store.send(TestAction::Announce);

        assert_eq!(*seen.borrow(), vec![vec!["1".to_string()]]);
        assert_eq!(store.hub().states().interaction, None);
    }

    #[test]
    fn reentrant_send_is_queued_until_current_action_finishes() {
        let store = store();
        let reentrant = store.clone();
        let _sub = store.hub().on(Field::Interaction, move |_| {
            reentrant.send(TestAction::Record("from-subscriber"));
            reentrant.send(TestAction::Record("second"));
        });

        store.send(TestAction::Announce);

        assert_eq!(store.state(|s| s.log.clone()), vec!["from-subscriber", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn future_effects_feed_actions_back() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let store = store();
                store.send(TestAction::IncrementLater);
                assert_eq!(store.pending_effects(), 1);
                assert_eq!(store.state(|s| s.value), 0);

                tokio::time::sleep(Duration::from_millis(20)).await;

                assert_eq!(store.state(|s| s.value), 1);
                assert_eq!(store.pending_effects(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn feedback_is_dropped_when_store_is_gone() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let store = store();
                store.send(TestAction::IncrementLater);
                drop(store);
                // Must not panic when the future completes
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
            .await;
    }
}
