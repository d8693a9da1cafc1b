//! The hub: a synchronous, field-keyed state store and event bus.
//!
//! Every component of a workflow coordinates through one [`Hub`]:
//!
//! ```text
//!  SessionMaker ──update(Session)──┐
//!  Rendering    ──update(View)─────┤        ┌──► Tracker (session, view)
//!                                  ├──Hub───┤
//!  Tracker      ──trigger(Interaction)      └──► Delivery (interaction)
//! ```
//!
//! # Semantics
//!
//! - [`Hub::update`] persists the value and notifies every subscriber of its
//!   field, in subscription order. Equal values are never coalesced.
//! - [`Hub::trigger`] notifies without persisting.
//! - Dispatch is single-flight per field. A reentrant `update`/`trigger` on
//!   a field whose notification is running is queued and drained, in call
//!   order, once that notification finishes and before the outermost call
//!   returns. A reentrant call on a different field runs depth-first.
//! - Handlers must not form update cycles across fields; the hub does not
//!   detect them.
//!
//! The hub is single-threaded (`Rc`/`RefCell`) by construction.

use crate::metrics::HubMetrics;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use widget_tracking_core::{Field, Interaction, Role, Session, Signal, ViewState};

/// Latest persisted value per field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStates {
    /// Current session
    pub session: Option<Session>,
    /// Latest view state per role
    pub views: HashMap<Role, ViewState>,
    /// Latest interaction passed to `update` (triggered ones are not kept)
    pub interaction: Option<Interaction>,
}

struct Subscriber {
    id: u64,
    active: Cell<bool>,
    handler: Box<dyn Fn(&Signal)>,
}

struct Pending {
    signal: Signal,
    persist: bool,
}

#[derive(Default)]
struct HubInner {
    states: RefCell<HubStates>,
    subscribers: RefCell<HashMap<Field, Vec<Rc<Subscriber>>>>,
    next_id: Cell<u64>,
    in_flight: RefCell<HashSet<Field>>,
    queued: RefCell<HashMap<Field, VecDeque<Pending>>>,
}

/// Shared handle to a workflow's hub
#[derive(Clone, Default)]
pub struct Hub {
    inner: Rc<HubInner>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("states", &*self.inner.states.borrow())
            .field("in_flight", &*self.inner.in_flight.borrow())
            .finish_non_exhaustive()
    }
}

/// Registration of a hub handler.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// removes the handler. A handler removed while its field is dispatching is
/// not called again, even for the signal in progress.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<HubInner>,
    field: Field,
    subscriber: Rc<Subscriber>,
}

impl Subscription {
    /// Field this subscription listens to
    #[must_use]
    pub const fn field(&self) -> Field {
        self.field
    }

    /// Remove the handler
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("field", &self.field)
            .field("id", &self.subscriber.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscriber.active.set(false);
        if let Some(inner) = self.hub.upgrade() {
            if let Some(list) = inner.subscribers.borrow_mut().get_mut(&self.field) {
                list.retain(|s| s.id != self.subscriber.id);
            }
        }
    }
}

/// RAII guard that releases a field's in-flight slot, even if a handler panics
struct InFlightGuard<'a> {
    inner: &'a HubInner,
    field: Field,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.borrow_mut().remove(&self.field);
    }
}

impl Hub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist `signal` as its field's latest value and notify subscribers
    pub fn update(&self, signal: Signal) {
        self.dispatch(Pending {
            signal,
            persist: true,
        });
    }

    /// Notify subscribers of `signal` without persisting it
    pub fn trigger(&self, signal: Signal) {
        self.dispatch(Pending {
            signal,
            persist: false,
        });
    }

    /// Register `handler` for `field`
    pub fn on<F>(&self, field: Field, handler: F) -> Subscription
    where
        F: Fn(&Signal) + 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id.wrapping_add(1));
        let subscriber = Rc::new(Subscriber {
            id,
            active: Cell::new(true),
            handler: Box::new(handler),
        });
        self.inner
            .subscribers
            .borrow_mut()
            .entry(field)
            .or_default()
            .push(Rc::clone(&subscriber));
        Subscription {
            hub: Rc::downgrade(&self.inner),
            field,
            subscriber,
        }
    }

    /// Snapshot of the latest persisted values
    #[must_use]
    pub fn states(&self) -> HubStates {
        self.inner.states.borrow().clone()
    }

    /// Current session
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.states.borrow().session
    }

    /// Latest view state of `role`
    #[must_use]
    pub fn view(&self, role: Role) -> Option<ViewState> {
        self.inner.states.borrow().views.get(&role).cloned()
    }

    /// Whether the current session has been started
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session().is_some_and(|session| session.active)
    }

    /// Number of live handlers for `field`
    #[must_use]
    pub fn subscriber_count(&self, field: Field) -> usize {
        self.inner
            .subscribers
            .borrow()
            .get(&field)
            .map_or(0, Vec::len)
    }

    fn dispatch(&self, pending: Pending) {
        let field = pending.signal.field();
        if !self.inner.in_flight.borrow_mut().insert(field) {
            tracing::trace!(%field, "Field is dispatching, queueing reentrant signal");
            self.inner
                .queued
                .borrow_mut()
                .entry(field)
                .or_default()
                .push_back(pending);
            return;
        }
        let _guard = InFlightGuard {
            inner: &self.inner,
            field,
        };

        let mut next = Some(pending);
        while let Some(pending) = next {
            self.notify(field, pending);
            next = self
                .inner
                .queued
                .borrow_mut()
                .get_mut(&field)
                .and_then(VecDeque::pop_front);
        }
    }

    fn notify(&self, field: Field, Pending { signal, persist }: Pending) {
        if persist {
            self.persist(&signal);
        }
        let subscribers: Vec<Rc<Subscriber>> = self
            .inner
            .subscribers
            .borrow()
            .get(&field)
            .cloned()
            .unwrap_or_default();

        tracing::trace!(%field, persist, subscribers = subscribers.len(), "Dispatching signal");
        for subscriber in subscribers {
            if subscriber.active.get() {
                (subscriber.handler)(&signal);
            }
        }
        HubMetrics::record_dispatch(field);
    }

    fn persist(&self, signal: &Signal) {
        let mut states = self.inner.states.borrow_mut();
        match signal {
            Signal::Session(session) => states.session = Some(*session),
            Signal::View(role, view) => {
                states.views.insert(*role, view.clone());
            }
            Signal::Interaction(interaction) => states.interaction = Some(interaction.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use widget_tracking_core::Uuid;

    fn session(n: u128) -> Session {
        Session::new(Uuid::from_u128(n))
    }

    fn recorder(hub: &Hub, field: Field, log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Subscription {
        let log = Rc::clone(log);
        hub.on(field, move |signal| {
            let entry = match signal {
                Signal::Session(s) => format!("{tag}:session:{}", s.uuid.as_u128()),
                Signal::View(role, _) => format!("{tag}:view:{role}"),
                Signal::Interaction(i) => format!("{tag}:interaction:{}", i.product_ids.join(",")),
            };
            log.borrow_mut().push(entry);
        })
    }

    #[test]
    fn update_persists_and_notifies_in_subscription_order() {
        let hub = Hub::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _a = recorder(&hub, Field::Session, &log, "a");
        let _b = recorder(&hub, Field::Session, &log, "b");

        hub.update(Signal::Session(session(1)));

        assert_eq!(hub.session(), Some(session(1)));
        assert_eq!(*log.borrow(), vec!["a:session:1", "b:session:1"]);
    }

    #[test]
    fn equal_values_are_not_coalesced() {
        let hub = Hub::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _a = recorder(&hub, Field::Session, &log, "a");

        hub.update(Signal::Session(session(1)));
        hub.update(Signal::Session(session(1)));

        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn trigger_does_not_persist() {
        let hub = Hub::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _a = recorder(&hub, Field::Session, &log, "a");

        hub.trigger(Signal::Session(session(5)));

        assert_eq!(hub.session(), None);
        assert_eq!(*log.borrow(), vec!["a:session:5"]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let hub = Hub::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = recorder(&hub, Field::Session, &log, "a");
        assert_eq!(hub.subscriber_count(Field::Session), 1);

        sub.unsubscribe();
        hub.update(Signal::Session(session(1)));

        assert!(log.borrow().is_empty());
        assert_eq!(hub.subscriber_count(Field::Session), 0);
    }

    #[test]
    fn reentrant_update_on_same_field_is_queued_after_current_notification() {
        let hub = Hub::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let reentrant = hub.clone();
        let first_log = Rc::clone(&log);
        let _first = hub.on(Field::Session, move |signal| {
            let n = signal.as_session().unwrap().uuid.as_u128();
            first_log.borrow_mut().push(format!("first:{n}"));
            if n == 1 {
                reentrant.update(Signal::Session(session(2)));
                // Still the outer value: the queued update has not run yet
                first_log
                    .borrow_mut()
                    .push(format!("after:{}", reentrant.session().unwrap().uuid.as_u128()));
            }
        });
        let _second = recorder(&hub, Field::Session, &log, "second");

        hub.update(Signal::Session(session(1)));

        assert_eq!(
            *log.borrow(),
            vec!["first:1", "after:1", "second:session:1", "first:2", "second:session:2"]
        );
        assert_eq!(hub.session(), Some(session(2)));
    }

    #[test]
    fn reentrant_update_on_other_field_runs_depth_first() {
        let hub = Hub::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let reentrant = hub.clone();
        let outer_log = Rc::clone(&log);
        let _outer = hub.on(Field::Session, move |signal| {
            let s = *signal.as_session().unwrap();
            reentrant.update(Signal::View(Role::Products, ViewState::ready(s)));
            outer_log.borrow_mut().push("session-handler-done".to_string());
        });
        let _view = recorder(&hub, Field::View(Role::Products), &log, "view");

        hub.update(Signal::Session(session(1)));

        assert_eq!(*log.borrow(), vec!["view:view:products", "session-handler-done"]);
        assert!(hub.view(Role::Products).is_some());
    }

    #[test]
    fn handler_removed_mid_dispatch_is_skipped() {
        let hub = Hub::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&victim);
        let _killer = hub.on(Field::Session, move |_| {
            slot.borrow_mut().take();
        });
        *victim.borrow_mut() = Some(recorder(&hub, Field::Session, &log, "victim"));

        hub.update(Signal::Session(session(1)));

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn is_active_follows_session() {
        let hub = Hub::new();
        assert!(!hub.is_active());
        hub.update(Signal::Session(session(1)));
        assert!(!hub.is_active());
        hub.update(Signal::Session(session(1).activated()));
        assert!(hub.is_active());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Every subscriber sees every update, in order, even when a
            // handler re-publishes on the same field
            #[test]
            fn reentrant_updates_keep_call_order(ids in prop::collection::vec(1u128..1_000, 1..20)) {
                let hub = Hub::new();
                let seen = Rc::new(RefCell::new(Vec::new()));

                let echo = hub.clone();
                let _echo = hub.on(Field::Session, move |signal| {
                    let n = signal.as_session().map_or(0, |s| s.uuid.as_u128());
                    if n < 1_000 {
                        echo.update(Signal::Session(session(n + 1_000)));
                    }
                });
                let log = Rc::clone(&seen);
                let _log = hub.on(Field::Session, move |signal| {
                    if let Some(s) = signal.as_session() {
                        log.borrow_mut().push(s.uuid.as_u128());
                    }
                });

                for id in &ids {
                    hub.update(Signal::Session(session(*id)));
                }

                let expected: Vec<u128> = ids.iter().flat_map(|id| [*id, id + 1_000]).collect();
                prop_assert_eq!(&*seen.borrow(), &expected);
                prop_assert_eq!(hub.session(), ids.last().map(|id| session(id + 1_000)));
            }
        }
    }
}
