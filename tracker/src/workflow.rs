//! Workflow: one hub, its session lifecycle and a tracker per role.

use crate::delivery::{ApiInfo, Delivery};
use crate::tracker::{Collaborators, Tracker};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use widget_tracking_core::environment::{
    ElementSource, IdGenerator, InteractionSink, MutationWatcher, Viewport,
};
use widget_tracking_core::{
    Role, Session, Signal, TrackerOptions, TrackingError, ViewMeta, ViewState, ViewStatus,
};
use widget_tracking_runtime::{Hub, SessionMaker};

/// A view update reported by the rendering collaborator.
///
/// Missing fields default to `ready` and the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewUpdate {
    /// Rendering status
    pub status: Option<ViewStatus>,
    /// Session the view was rendered for
    pub session: Option<Session>,
    /// Response metadata
    pub meta: Option<ViewMeta>,
}

impl ViewUpdate {
    /// A ready view for the current session
    #[must_use]
    pub fn ready() -> Self {
        Self::default()
    }

    /// Attach a response id
    #[must_use]
    pub fn with_miso_id(mut self, miso_id: impl Into<String>) -> Self {
        self.meta = Some(ViewMeta {
            miso_id: Some(miso_id.into()),
        });
        self
    }
}

/// A tracked widget workflow
pub struct Workflow {
    hub: Hub,
    sessions: SessionMaker,
    viewport: Rc<dyn Viewport>,
    watcher: Option<Rc<dyn MutationWatcher>>,
    api: ApiInfo,
    tracker_options: Cell<TrackerOptions>,
    trackers: RefCell<HashMap<Role, Tracker>>,
    delivery: RefCell<Option<Delivery>>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("session", &self.session())
            .field("roles", &self.trackers.borrow().keys().collect::<Vec<_>>())
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Create a workflow minting session ids from `ids`
    #[must_use]
    pub fn new(ids: Rc<dyn IdGenerator>, viewport: Rc<dyn Viewport>) -> Self {
        let hub = Hub::new();
        Self {
            sessions: SessionMaker::new(hub.clone(), ids),
            hub,
            viewport,
            watcher: None,
            api: ApiInfo::default(),
            tracker_options: Cell::new(TrackerOptions::default()),
            trackers: RefCell::new(HashMap::new()),
            delivery: RefCell::new(None),
        }
    }

    /// Use `watcher` for trackers configured with `watch: true`
    #[must_use]
    pub fn with_mutation_watcher(mut self, watcher: Rc<dyn MutationWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Attribute delivered interactions to `api`
    #[must_use]
    pub fn with_api(mut self, api: ApiInfo) -> Self {
        self.api = api;
        self
    }

    /// The workflow's hub
    #[must_use]
    pub const fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Mint a new session, retiring everything derived from the old one
    pub fn reset(&self) -> &Self {
        self.sessions.new_session();
        self
    }

    /// Start the current session (minting one if needed)
    pub fn start(&self) -> &Self {
        self.sessions.start();
        self
    }

    /// `reset` then `start`
    pub fn restart(&self) -> &Self {
        self.reset().start()
    }

    /// Current session
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.hub.session()
    }

    /// Whether the current session has started
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.hub.is_active()
    }

    /// Publish a view update for `role`
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::NotActive`] if the session has not started.
    pub fn notify_view_update(&self, role: Role, update: ViewUpdate) -> Result<(), TrackingError> {
        let Some(current) = self.session().filter(|s| s.active) else {
            return Err(TrackingError::NotActive);
        };
        let state = ViewState {
            status: update.status.unwrap_or(ViewStatus::Ready),
            session: update.session.unwrap_or(current),
            meta: update.meta,
        };
        tracing::debug!(%role, status = ?state.status, "View updated");
        self.hub.update(Signal::View(role, state));
        Ok(())
    }

    /// Create the tracker of `role`, reading its root from `source`.
    ///
    /// The tracker starts with the options last given to
    /// [`Workflow::use_trackers`]. Adding a role twice returns the existing
    /// tracker.
    pub fn add_tracker(&self, role: Role, source: Rc<dyn ElementSource>) -> Tracker {
        if let Some(existing) = self.trackers.borrow().get(&role) {
            return existing.clone();
        }
        let tracker = Tracker::new(
            &self.hub,
            role,
            Collaborators {
                source,
                viewport: Rc::clone(&self.viewport),
                watcher: self.watcher.clone(),
            },
            self.tracker_options.get(),
        );
        self.trackers.borrow_mut().insert(role, tracker.clone());
        tracker
    }

    /// Tracker of `role`
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::UnknownRole`] if no tracker was added for it.
    pub fn tracker(&self, role: Role) -> Result<Tracker, TrackingError> {
        self.trackers
            .borrow()
            .get(&role)
            .cloned()
            .ok_or(TrackingError::UnknownRole(role))
    }

    /// Configure every tracker, present and future
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::ConfigurationLocked`] once the workflow is
    /// active, or [`TrackingError::InvalidOption`] for out-of-range values.
    pub fn use_trackers(&self, options: TrackerOptions) -> Result<&Self, TrackingError> {
        if self.is_active() {
            return Err(TrackingError::ConfigurationLocked);
        }
        options.validate()?;
        self.tracker_options.set(options);
        let trackers: Vec<Tracker> = self.trackers.borrow().values().cloned().collect();
        for tracker in trackers {
            tracker.config(options)?;
        }
        Ok(self)
    }

    /// Send published interactions to `sink`, replacing any previous sink
    pub fn use_delivery(&self, sink: Rc<dyn InteractionSink>) -> &Self {
        *self.delivery.borrow_mut() = Some(Delivery::attach(&self.hub, sink, self.api.clone()));
        self
    }

    /// Tear down every tracker and stop delivery
    pub fn destroy(&self) {
        let trackers: Vec<Tracker> = self.trackers.borrow_mut().drain().map(|(_, t)| t).collect();
        for tracker in trackers {
            tracker.destroy();
        }
        self.delivery.borrow_mut().take();
        tracing::debug!("Workflow destroyed");
    }
}
