//! Integration tests: store effects driving viewability detections against
//! the session lifecycle.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use widget_tracking_core::effect::Effect;
use widget_tracking_core::reducer::Reducer;
use widget_tracking_core::{
    smallvec, Element, EventType, Field, Interaction, Role, Signal, SmallVec, Trigger, Uuid,
    ViewableOptions,
};
use widget_tracking_runtime::{Hub, SessionMaker, Store, ViewabilityDetector};
use widget_tracking_testing::helpers::init_tracing;
use widget_tracking_testing::{ManualViewport, MockElement, SequentialIdGenerator};

#[derive(Debug, Clone)]
enum Action {
    Session(Uuid),
    Watch(Rc<MockElement>, String),
    Seen(Uuid, String),
}

#[derive(Debug, Clone, Default)]
struct State {
    session: Option<Uuid>,
    seen: Vec<String>,
}

struct Env {
    detector: ViewabilityDetector,
}

struct WatchReducer;

impl Reducer for WatchReducer {
    type State = State;
    type Action = Action;
    type Environment = Env;

    fn reduce(
        &self,
        state: &mut State,
        action: Action,
        env: &Env,
    ) -> SmallVec<[Effect<Action>; 4]> {
        match action {
            Action::Session(uuid) => {
                if state.session != Some(uuid) {
                    env.detector.cancel_all();
                    state.seen.clear();
                }
                state.session = Some(uuid);
                smallvec![Effect::None]
            }
            Action::Watch(element, product_id) => {
                let Some(session) = state.session else {
                    return smallvec![Effect::None];
                };
                let Ok(detection) = env.detector.observe(&element.handle(), &ViewableOptions::default())
                else {
                    return smallvec![Effect::None];
                };
                smallvec![Effect::Future(Box::pin(async move {
                    detection.await.ok().map(|()| Action::Seen(session, product_id))
                }))]
            }
            Action::Seen(session, product_id) => {
                if state.session != Some(session) {
                    return smallvec![Effect::None];
                }
                state.seen.push(product_id.clone());
                smallvec![Effect::Publish(Signal::Interaction(Interaction::new(
                    EventType::Viewable,
                    vec![product_id],
                    Role::Products,
                    Trigger::Auto,
                    None,
                )))]
            }
        }
    }
}

struct Fixture {
    hub: Hub,
    sessions: SessionMaker,
    viewport: Rc<ManualViewport>,
    store: Store<WatchReducer>,
    published: Rc<RefCell<Vec<Vec<String>>>>,
    _subscriptions: Vec<widget_tracking_runtime::Subscription>,
}

fn fixture() -> Fixture {
    init_tracing();
    let hub = Hub::new();
    let sessions = SessionMaker::new(hub.clone(), Rc::new(SequentialIdGenerator::new()));
    let viewport = Rc::new(ManualViewport::new());
    let detector = ViewabilityDetector::new(viewport.clone());
    let store = Store::new(State::default(), WatchReducer, Env { detector }, hub.clone());

    let rotating = store.clone();
    let on_session = hub.on(Field::Session, move |signal| {
        if let Some(session) = signal.as_session() {
            rotating.send(Action::Session(session.uuid));
        }
    });

    let published = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&published);
    let on_interaction = hub.on(Field::Interaction, move |signal| {
        if let Some(interaction) = signal.as_interaction() {
            log.borrow_mut().push(interaction.product_ids.clone());
        }
    });

    Fixture {
        hub,
        sessions,
        viewport,
        store,
        published,
        _subscriptions: vec![on_session, on_interaction],
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn detection_feeds_back_into_the_store() {
    LocalSet::new()
        .run_until(async {
            let f = fixture();
            f.sessions.start();
            let item = MockElement::product("P1");

            f.store.send(Action::Watch(item.clone(), "P1".into()));
            f.viewport.set_ratio(item.id(), 0.75);
            assert_eq!(f.store.pending_effects(), 1);

            sleep_ms(1_001).await;

            assert_eq!(f.store.state(|s| s.seen.clone()), vec!["P1".to_string()]);
            assert_eq!(*f.published.borrow(), vec![vec!["P1".to_string()]]);
            assert_eq!(f.store.pending_effects(), 0);
            // Published interactions are not persisted
            assert!(f.hub.states().interaction.is_none());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn rotation_cancels_pending_detections() {
    LocalSet::new()
        .run_until(async {
            let f = fixture();
            f.sessions.start();
            let item = MockElement::product("P1");

            f.store.send(Action::Watch(item.clone(), "P1".into()));
            f.viewport.set_ratio(item.id(), 1.0);
            sleep_ms(400).await;

            f.sessions.new_session();
            f.sessions.start();
            sleep_ms(5_000).await;

            assert!(f.published.borrow().is_empty());
            assert_eq!(f.store.pending_effects(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn watching_the_same_element_twice_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let f = fixture();
            f.sessions.start();
            let item = MockElement::product("P1");

            f.store.send(Action::Watch(item.clone(), "P1".into()));
            f.store.send(Action::Watch(item.clone(), "P1".into()));
            assert_eq!(f.store.pending_effects(), 1);

            f.viewport.set_ratio(item.id(), 1.0);
            sleep_ms(1_001).await;
            assert_eq!(f.published.borrow().len(), 1);
        })
        .await;
}
