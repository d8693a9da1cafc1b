//! The tracker facade.
//!
//! A [`Tracker`] wires one role's [`TrackerReducer`] to the hub: it refreshes
//! whenever the session or the role's view changes, exposes the manual
//! tracking API (which, unlike the automatic paths, reports precondition
//! failures), and optionally keeps a mutation watch on the rendered root.

use crate::reducer::{
    ClickEvent, TrackerAction, TrackerEnvironment, TrackerReducer, TrackerState, TriggerOptions,
};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use widget_tracking_core::environment::{Disconnect, ElementSource, MutationWatcher, Viewport};
use widget_tracking_core::{
    ElementId, ElementRef, EventType, Field, ProductState, Role, TrackerOptions, TrackingError,
};
use widget_tracking_runtime::{Hub, Store, Subscription, ViewabilityDetector};

/// External collaborators a tracker reads from
#[derive(Clone)]
pub struct Collaborators {
    /// Accessor for the role's rendered root
    pub source: Rc<dyn ElementSource>,
    /// Intersection ratios for viewability
    pub viewport: Rc<dyn Viewport>,
    /// Mutation watching, used when `watch` is on
    pub watcher: Option<Rc<dyn MutationWatcher>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("watcher", &self.watcher.is_some())
            .finish_non_exhaustive()
    }
}

struct Watch {
    root: ElementId,
    disconnect: Disconnect,
}

struct TrackerInner {
    role: Role,
    hub: Hub,
    store: Store<TrackerReducer>,
    source: Rc<dyn ElementSource>,
    watcher: Option<Rc<dyn MutationWatcher>>,
    watch: RefCell<Option<Watch>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

/// Interaction tracker for one role
#[derive(Clone)]
pub struct Tracker {
    inner: Rc<TrackerInner>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("role", &self.inner.role)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Create the tracker of `role` and subscribe it to `hub`
    #[must_use]
    pub fn new(hub: &Hub, role: Role, collaborators: Collaborators, options: TrackerOptions) -> Self {
        let detector = ViewabilityDetector::new(collaborators.viewport);
        let store = Store::new(
            TrackerState::new(role, options),
            TrackerReducer,
            TrackerEnvironment { detector },
            hub.clone(),
        );
        let tracker = Self {
            inner: Rc::new(TrackerInner {
                role,
                hub: hub.clone(),
                store,
                source: collaborators.source,
                watcher: collaborators.watcher,
                watch: RefCell::new(None),
                subscriptions: RefCell::new(Vec::new()),
            }),
        };

        let subscriptions = [Field::Session, Field::View(role)]
            .into_iter()
            .map(|field| {
                let weak = Rc::downgrade(&tracker.inner);
                hub.on(field, move |_| refresh_weak(&weak))
            })
            .collect();
        *tracker.inner.subscriptions.borrow_mut() = subscriptions;

        tracing::debug!(%role, "Tracker created");
        tracker.refresh();
        tracker
    }

    /// Role this tracker reports for
    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Active options
    #[must_use]
    pub fn options(&self) -> TrackerOptions {
        self.inner.store.state(|s| *s.options())
    }

    /// Replace the options.
    ///
    /// # Errors
    ///
    /// - [`TrackingError::ConfigurationLocked`] once the workflow is active
    /// - [`TrackingError::InvalidOption`] if a value is out of range
    pub fn config(&self, options: TrackerOptions) -> Result<(), TrackingError> {
        if self.inner.hub.is_active() {
            return Err(TrackingError::ConfigurationLocked);
        }
        options.validate()?;
        self.inner.store.send(TrackerAction::Configure(options));
        self.disconnect_watch();
        self.sync_watch(self.inner.source.element().as_ref());
        Ok(())
    }

    /// Re-read the session, the view state and the rendered root, and
    /// reconcile bindings
    pub fn refresh(&self) {
        let root = self.inner.source.element();
        self.sync_watch(root.as_ref());
        self.inner.store.send(TrackerAction::Refresh {
            session: self.inner.hub.session(),
            view: self.inner.hub.view(self.inner.role),
            root,
        });
    }

    /// Manually report impressions
    ///
    /// # Errors
    ///
    /// [`TrackingError::NotActive`] or [`TrackingError::NotReady`] if the
    /// session is not started or the view is not rendered yet.
    pub fn impression<I, S>(&self, product_ids: I, options: TriggerOptions) -> Result<(), TrackingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger(EventType::Impression, product_ids, options)
    }

    /// Manually report viewable impressions
    ///
    /// # Errors
    ///
    /// Same as [`Tracker::impression`].
    pub fn viewable<I, S>(&self, product_ids: I, options: TriggerOptions) -> Result<(), TrackingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger(EventType::Viewable, product_ids, options)
    }

    /// Manually report clicks
    ///
    /// # Errors
    ///
    /// Same as [`Tracker::impression`].
    pub fn click<I, S>(&self, product_ids: I, options: TriggerOptions) -> Result<(), TrackingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger(EventType::Click, product_ids, options)
    }

    /// Manually report `event`. Already triggered products are skipped
    /// silently.
    ///
    /// # Errors
    ///
    /// Same as [`Tracker::impression`].
    pub fn trigger<I, S>(
        &self,
        event: EventType,
        product_ids: I,
        options: TriggerOptions,
    ) -> Result<(), TrackingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assert_view_ready()?;
        self.inner.store.send(TrackerAction::Manual {
            event,
            product_ids: product_ids.into_iter().map(Into::into).collect(),
            options,
        });
        Ok(())
    }

    /// Feed a user click
    pub fn handle_click(&self, click: ClickEvent) {
        self.inner.store.send(TrackerAction::Click(click));
    }

    /// Snapshot of `product_id`'s statuses
    #[must_use]
    pub fn get_state(&self, product_id: &str) -> ProductState {
        self.inner.store.state(|s| s.product_state(product_id))
    }

    /// Number of viewability detections in flight
    #[must_use]
    pub fn live_detections(&self) -> usize {
        self.inner.store.environment().detector.live_count()
    }

    /// Unsubscribe, stop watching and drop all session state.
    ///
    /// Calling it again is a no-op.
    pub fn destroy(&self) {
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.borrow_mut());
        if subscriptions.is_empty() {
            return;
        }
        drop(subscriptions);
        self.disconnect_watch();
        self.inner.store.send(TrackerAction::Retire);
        tracing::debug!(role = %self.inner.role, "Tracker destroyed");
    }

    fn assert_view_ready(&self) -> Result<(), TrackingError> {
        let hub = &self.inner.hub;
        let Some(session) = hub.session().filter(|s| s.active) else {
            return Err(TrackingError::NotActive);
        };
        match hub.view(self.inner.role) {
            Some(view) if view.is_ready() && view.session.uuid == session.uuid => Ok(()),
            _ => Err(TrackingError::NotReady),
        }
    }

    fn sync_watch(&self, root: Option<&ElementRef>) {
        let watching = self.inner.watch.borrow().as_ref().map(|w| w.root);
        let wanted = root
            .filter(|_| self.inner.watcher.is_some() && self.options().watch)
            .map(|root| root.id());
        if watching == wanted {
            return;
        }
        self.disconnect_watch();

        let (Some(root), Some(watcher)) = (root.filter(|_| wanted.is_some()), &self.inner.watcher) else {
            return;
        };
        let weak = Rc::downgrade(&self.inner);
        let disconnect = watcher.observe(root, Rc::new(move || refresh_weak(&weak)));
        tracing::debug!(role = %self.inner.role, root = %root.id(), "Watching root for mutations");
        *self.inner.watch.borrow_mut() = Some(Watch {
            root: root.id(),
            disconnect,
        });
    }

    fn disconnect_watch(&self) {
        let watch = self.inner.watch.borrow_mut().take();
        if let Some(watch) = watch {
            (watch.disconnect)();
        }
    }
}

fn refresh_weak(inner: &Weak<TrackerInner>) {
    if let Some(inner) = inner.upgrade() {
        Tracker { inner }.refresh();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use widget_tracking_core::{Session, Signal, TrackingStatus, Uuid, ViewState};
    use widget_tracking_testing::{
        InteractionRecorder, ManualViewport, MockElement, MockElementSource, MockMutationWatcher,
    };

    struct Fixture {
        hub: Hub,
        source: MockElementSource,
        watcher: MockMutationWatcher,
        tracker: Tracker,
    }

    fn fixture() -> Fixture {
        let hub = Hub::new();
        let source = MockElementSource::new();
        let watcher = MockMutationWatcher::new();
        let tracker = Tracker::new(
            &hub,
            Role::Products,
            Collaborators {
                source: Rc::new(source.clone()),
                viewport: Rc::new(ManualViewport::new()),
                watcher: Some(Rc::new(watcher.clone())),
            },
            TrackerOptions {
                viewable: None,
                ..TrackerOptions::default()
            },
        );
        Fixture {
            hub,
            source,
            watcher,
            tracker,
        }
    }

    fn start(hub: &Hub) -> Session {
        let session = Session::new(Uuid::from_u128(1)).activated();
        hub.update(Signal::Session(session));
        session
    }

    #[test]
    fn manual_calls_report_preconditions() {
        let f = fixture();
        assert_eq!(
            f.tracker.impression(["P1"], TriggerOptions::default()),
            Err(TrackingError::NotActive)
        );
        let session = start(&f.hub);
        assert_eq!(
            f.tracker.impression(["P1"], TriggerOptions::default()),
            Err(TrackingError::NotReady)
        );
        f.hub.update(Signal::View(Role::Products, ViewState::ready(session)));
        assert_eq!(f.tracker.impression(["P1"], TriggerOptions::default()), Ok(()));
        assert_eq!(f.tracker.get_state("P1").impression, TrackingStatus::Triggered);
    }

    #[test]
    fn view_update_binds_rendered_items() {
        let f = fixture();
        let recorder = InteractionRecorder::attach(&f.hub);
        let root = MockElement::with_children(MockElement::root(None), &[MockElement::product("P1")]);
        f.source.set(root.handle());

        let session = start(&f.hub);
        assert!(recorder.is_empty());
        f.hub.update(Signal::View(Role::Products, ViewState::ready(session)));

        assert_eq!(recorder.summary(), vec![(EventType::Impression, vec!["P1".to_string()])]);
    }

    #[test]
    fn views_of_other_roles_are_ignored() {
        let f = fixture();
        let recorder = InteractionRecorder::attach(&f.hub);
        let root = MockElement::with_children(MockElement::root(None), &[MockElement::product("P1")]);
        f.source.set(root.handle());

        let session = start(&f.hub);
        f.hub.update(Signal::View(Role::Answer, ViewState::ready(session)));
        assert!(recorder.is_empty());
    }

    #[test]
    fn config_is_locked_once_active() {
        let f = fixture();
        assert!(f.tracker.config(TrackerOptions::disabled()).is_ok());
        assert_eq!(f.tracker.options(), TrackerOptions::disabled());
        start(&f.hub);
        assert_eq!(
            f.tracker.config(TrackerOptions::default()),
            Err(TrackingError::ConfigurationLocked)
        );
    }

    #[test]
    fn watch_refreshes_on_mutation() {
        let f = fixture();
        f.tracker
            .config(TrackerOptions {
                watch: true,
                viewable: None,
                ..TrackerOptions::default()
            })
            .unwrap();
        let recorder = InteractionRecorder::attach(&f.hub);
        let root = MockElement::root(None);
        f.source.set(root.handle());
        let session = start(&f.hub);
        f.hub.update(Signal::View(Role::Products, ViewState::ready(session)));
        assert_eq!(f.watcher.observer_count(), 1);

        MockElement::append(&root, &MockElement::product("P2"));
        f.watcher.mutate();

        assert_eq!(recorder.count_for("P2", EventType::Impression), 1);
    }

    #[test]
    fn destroy_unsubscribes_and_disconnects() {
        let f = fixture();
        f.tracker
            .config(TrackerOptions {
                watch: true,
                ..TrackerOptions::disabled()
            })
            .unwrap();
        f.source.set(MockElement::root(None).handle());
        f.tracker.refresh();
        assert_eq!(f.watcher.observer_count(), 1);
        assert_eq!(f.hub.subscriber_count(Field::Session), 1);

        f.tracker.destroy();
        f.tracker.destroy();

        assert_eq!(f.watcher.observer_count(), 0);
        assert_eq!(f.hub.subscriber_count(Field::Session), 0);
    }
}
