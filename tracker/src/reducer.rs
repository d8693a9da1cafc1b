//! The interaction tracking state machine.
//!
//! Per product and event type the status moves `Untracked → Tracking →
//! Triggered` (impression and click skip `Tracking`). The only regression is
//! viewability's `Tracking → Untracked`, taken when the observed element goes
//! away or when its detection completes while the view is not ready. Every
//! ready refresh starts detections again for bindings left `Untracked`.
//!
//! All transitions happen in [`TrackerReducer::reduce`]. Publication is an
//! `Effect::Publish` and each viewability wait is an `Effect::Future` whose
//! resolution comes back as [`TrackerAction::ViewableResolved`]. Starting and
//! cancelling detections goes through the detector in the environment so the
//! side table is always in step with the statuses.

use crate::items::{Binding, Items};
use crate::states::States;
use widget_tracking_core::effect::Effect;
use widget_tracking_core::element::ATTR_MISO_ID;
use widget_tracking_core::reducer::Reducer;
use widget_tracking_core::{
    find_in_ancestors, ElementId, ElementRef, EventType, Interaction, ProductState, Role,
    Session, Signal, SmallVec, TrackerOptions, TrackingStatus, Trigger, Uuid, ViewState,
};
use widget_tracking_runtime::metrics::TrackingMetrics;
use widget_tracking_runtime::ViewabilityDetector;

type Effects = SmallVec<[Effect<TrackerAction>; 4]>;

/// Options of a manual tracking call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerOptions {
    /// Response id to attach; defaults to the view's
    pub miso_id: Option<String>,
}

/// A user click delivered to the tracker
#[derive(Debug, Clone)]
pub struct ClickEvent {
    /// Innermost element that was clicked
    pub target: ElementRef,
    /// Mouse button (`0` is the primary button)
    pub button: i16,
    /// Whether a handler already prevented the default action
    pub default_prevented: bool,
}

impl ClickEvent {
    /// A primary-button click on `target` whose default is not prevented
    #[must_use]
    pub fn primary(target: ElementRef) -> Self {
        Self {
            target,
            button: 0,
            default_prevented: false,
        }
    }
}

/// Actions processed by the tracker
#[derive(Debug, Clone)]
pub enum TrackerAction {
    /// Replace the options
    Configure(TrackerOptions),
    /// Re-read session, view state and root, and reconcile bindings
    Refresh {
        /// Current session
        session: Option<Session>,
        /// Latest view state of the tracker's role
        view: Option<ViewState>,
        /// Currently rendered root element
        root: Option<ElementRef>,
    },
    /// A manual `impression`/`viewable`/`click` call
    Manual {
        /// Event to trigger
        event: EventType,
        /// Products to trigger it for
        product_ids: Vec<String>,
        /// Call options
        options: TriggerOptions,
    },
    /// A user click
    Click(ClickEvent),
    /// A viewability detection completed
    ViewableResolved {
        /// Session the detection was started under
        session: Uuid,
        /// Product bound to the observed element
        product_id: String,
        /// Observed element
        element: ElementId,
    },
    /// Drop all session-scoped state and cancel every detection
    Retire,
}

/// Tracker state
#[derive(Debug, Clone)]
pub struct TrackerState {
    role: Role,
    options: TrackerOptions,
    session: Option<Session>,
    view: Option<ViewState>,
    root: Option<ElementRef>,
    states: Option<States>,
    items: Items,
}

impl TrackerState {
    /// Fresh state for the tracker of `role`
    #[must_use]
    pub fn new(role: Role, options: TrackerOptions) -> Self {
        Self {
            role,
            options,
            session: None,
            view: None,
            root: None,
            states: None,
            items: Items::new(),
        }
    }

    /// Role the tracker reports for
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Active options
    #[must_use]
    pub const fn options(&self) -> &TrackerOptions {
        &self.options
    }

    /// Statuses of the current session, if one was seen
    #[must_use]
    pub const fn states(&self) -> Option<&States> {
        self.states.as_ref()
    }

    /// Live bindings
    #[must_use]
    pub const fn items(&self) -> &Items {
        &self.items
    }

    /// Whether the session is active and the view is ready for it
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let (Some(session), Some(view)) = (&self.session, &self.view) else {
            return false;
        };
        session.active && view.is_ready() && view.session.uuid == session.uuid
    }

    /// Snapshot of `product_id`'s statuses.
    ///
    /// Click is never stored as `Tracking`; until it triggers it reads as
    /// `Tracking` whenever a root is rendered.
    #[must_use]
    pub fn product_state(&self, product_id: &str) -> ProductState {
        let mut snapshot = self
            .states
            .as_ref()
            .and_then(|states| states.full_state(product_id))
            .unwrap_or(ProductState::UNTRACKED);
        if snapshot.click == TrackingStatus::Untracked && self.root.is_some() {
            snapshot.click = TrackingStatus::Tracking;
        }
        snapshot
    }

    /// Response id for automatic events: view meta first, then the root
    #[must_use]
    pub fn miso_id(&self) -> Option<String> {
        self.view
            .as_ref()
            .and_then(ViewState::miso_id)
            .map(str::to_owned)
            .or_else(|| self.root.as_ref().and_then(|root| root.attribute(ATTR_MISO_ID)))
    }
}

/// Injected collaborators of the tracker reducer
#[derive(Debug, Clone)]
pub struct TrackerEnvironment {
    /// Detector owning the viewability side table
    pub detector: ViewabilityDetector,
}

/// The tracker reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerReducer;

impl Reducer for TrackerReducer {
    type State = TrackerState;
    type Action = TrackerAction;
    type Environment = TrackerEnvironment;

    fn reduce(
        &self,
        state: &mut TrackerState,
        action: TrackerAction,
        env: &TrackerEnvironment,
    ) -> Effects {
        match action {
            TrackerAction::Configure(options) => {
                state.options = options;
                SmallVec::new()
            }
            TrackerAction::Refresh {
                session,
                view,
                root,
            } => refresh(state, env, session, view, root),
            TrackerAction::Manual {
                event,
                product_ids,
                options,
            } => {
                let miso_id = options.miso_id.or_else(|| state.miso_id());
                attempt_trigger(state, product_ids, event, Trigger::Manual, miso_id)
                    .into_iter()
                    .collect()
            }
            TrackerAction::Click(click) => handle_click(state, &click),
            TrackerAction::ViewableResolved {
                session,
                product_id,
                element,
            } => {
                if state.states.as_ref().map(States::uuid) != Some(session) {
                    tracing::debug!(%element, %product_id, "Dropping detection from a retired session");
                    return SmallVec::new();
                }
                if !state.is_ready() {
                    tracing::debug!(%element, %product_id, "Detection completed while the view was not ready");
                    reset_viewable(state, &product_id);
                    return SmallVec::new();
                }
                let miso_id = state.miso_id();
                attempt_trigger(state, vec![product_id], EventType::Viewable, Trigger::Auto, miso_id)
                    .into_iter()
                    .collect()
            }
            TrackerAction::Retire => {
                retire_states(state, env);
                state.items.unbind_all();
                env.detector.cancel_all();
                state.root = None;
                SmallVec::new()
            }
        }
    }
}

fn refresh(
    state: &mut TrackerState,
    env: &TrackerEnvironment,
    session: Option<Session>,
    view: Option<ViewState>,
    root: Option<ElementRef>,
) -> Effects {
    state.session = session;
    state.view = view;
    state.root = root;

    let Some(session) = state.session else {
        return SmallVec::new();
    };
    if state.states.as_ref().is_some_and(|s| s.uuid() != session.uuid) {
        retire_states(state, env);
    }
    if state.states.is_none() {
        state.states = Some(States::new(session.uuid));
    }
    if !state.is_ready() {
        return SmallVec::new();
    }

    let delta = state.items.refresh(state.root.as_ref());
    untrack_viewables(state, env, &delta.unbound);

    let mut effects: Effects = SmallVec::new();
    if state.options.impression.is_some() && !delta.bound.is_empty() {
        let product_ids = delta.bound.iter().map(|b| b.product_id.clone()).collect();
        let miso_id = state.miso_id();
        effects.extend(attempt_trigger(
            state,
            product_ids,
            EventType::Impression,
            Trigger::Auto,
            miso_id,
        ));
    }
    let bindings = state.items.bindings().to_vec();
    effects.extend(track_viewables(state, env, &bindings));
    effects
}

/// Unbind everything, cancel the old session's detections and drop its statuses
fn retire_states(state: &mut TrackerState, env: &TrackerEnvironment) {
    let Some(old) = state.states.as_ref().map(States::uuid) else {
        return;
    };
    let delta = state.items.unbind_all();
    untrack_viewables(state, env, &delta.unbound);
    state.states = None;
    tracing::debug!(role = %state.role, session = %old, "Retired tracking states");
    TrackingMetrics::record_rotation();
}

fn track_viewables(state: &mut TrackerState, env: &TrackerEnvironment, bound: &[Binding]) -> Effects {
    let mut effects = SmallVec::new();
    let Some(options) = state.options.viewable else {
        return effects;
    };
    let Some(states) = state.states.as_mut() else {
        return effects;
    };
    let session = states.uuid();

    for binding in bound {
        if states.get(&binding.product_id, EventType::Viewable) != TrackingStatus::Untracked {
            continue;
        }
        let detection = match env.detector.observe(&binding.element, &options) {
            Ok(detection) => detection,
            Err(error) => {
                tracing::debug!(%error, product_id = %binding.product_id, "Skipping viewability tracking");
                continue;
            }
        };
        states.set(&[&binding.product_id], EventType::Viewable, TrackingStatus::Tracking);

        let product_id = binding.product_id.clone();
        let element = binding.element_id();
        effects.push(Effect::Future(Box::pin(async move {
            detection.await.ok()?;
            Some(TrackerAction::ViewableResolved {
                session,
                product_id,
                element,
            })
        })));
    }
    effects
}

fn untrack_viewables(state: &mut TrackerState, env: &TrackerEnvironment, unbound: &[Binding]) {
    for binding in unbound {
        // Completed detections are no longer in the detector's table
        env.detector.cancel(binding.element_id());
        reset_viewable(state, &binding.product_id);
    }
}

fn reset_viewable(state: &mut TrackerState, product_id: &str) {
    if let Some(states) = state.states.as_mut() {
        if states.get(product_id, EventType::Viewable) == TrackingStatus::Tracking {
            states.set(&[product_id], EventType::Viewable, TrackingStatus::Untracked);
        }
    }
}

fn handle_click(state: &mut TrackerState, click: &ClickEvent) -> Effects {
    let Some(options) = state.options.click else {
        return SmallVec::new();
    };
    if !state.is_ready() {
        return SmallVec::new();
    }
    let items = &state.items;
    let Some(product_id) = find_in_ancestors(&click.target, |el| {
        items.get(el.id()).map(|binding| binding.product_id.clone())
    }) else {
        return SmallVec::new();
    };

    if !options.lenient {
        if click.button != 0 || click.default_prevented {
            tracing::trace!(%product_id, button = click.button, "Ignoring click by policy");
            return SmallVec::new();
        }
        if find_in_ancestors(&click.target, |el| el.is_link().then_some(())).is_none() {
            tracing::trace!(%product_id, "Ignoring click outside a link");
            return SmallVec::new();
        }
    }

    let miso_id = state.miso_id();
    attempt_trigger(state, vec![product_id], EventType::Click, Trigger::Auto, miso_id)
        .into_iter()
        .collect()
}

/// Filter to untriggered products, mark them triggered, publish one event
fn attempt_trigger(
    state: &mut TrackerState,
    product_ids: Vec<String>,
    event: EventType,
    trigger: Trigger,
    miso_id: Option<String>,
) -> Option<Effect<TrackerAction>> {
    if !state.is_ready() {
        return None;
    }
    let states = state.states.as_mut()?;

    let mut unique: Vec<String> = Vec::with_capacity(product_ids.len());
    for id in product_ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    let product_ids = states.untriggered(&unique, event);
    if product_ids.is_empty() {
        return None;
    }
    states.set(&product_ids, event, TrackingStatus::Triggered);

    let interaction = Interaction::new(event, product_ids, state.role, trigger, miso_id);
    tracing::debug!(
        role = %state.role,
        event = event.public_name(),
        products = ?interaction.product_ids,
        manual = interaction.is_manual(),
        "Interaction triggered"
    );
    Some(Effect::Publish(Signal::Interaction(interaction)))
}
