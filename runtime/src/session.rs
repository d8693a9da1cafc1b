//! Session lifecycle.
//!
//! [`SessionMaker`] mints sessions and publishes them on the hub's
//! `session` field. Because hub dispatch is synchronous, every subscriber has
//! seen a rotated session (and retired whatever it derived from the old one)
//! by the time [`SessionMaker::new_session`] returns, so nothing can start
//! tracking against the new session before the old state is gone.

use crate::hub::Hub;
use std::fmt;
use std::rc::Rc;
use widget_tracking_core::environment::IdGenerator;
use widget_tracking_core::{Session, Signal};

/// Mints and starts sessions for one workflow
pub struct SessionMaker {
    hub: Hub,
    ids: Rc<dyn IdGenerator>,
}

impl fmt::Debug for SessionMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMaker")
            .field("current", &self.hub.session())
            .finish_non_exhaustive()
    }
}

impl SessionMaker {
    /// Create a session maker publishing to `hub`
    #[must_use]
    pub fn new(hub: Hub, ids: Rc<dyn IdGenerator>) -> Self {
        Self { hub, ids }
    }

    /// Mint a new, inactive session and publish it, replacing the current one
    pub fn new_session(&self) -> Session {
        let session = Session::new(self.ids.next_id());
        if let Some(previous) = self.hub.session() {
            tracing::debug!(previous = %previous.uuid, next = %session.uuid, "Rotating session");
        } else {
            tracing::debug!(uuid = %session.uuid, "Minting first session");
        }
        self.hub.update(Signal::Session(session));
        session
    }

    /// Mark the current session active and republish it.
    ///
    /// Starting an already active session is a no-op. Starting with no
    /// session mints one first.
    pub fn start(&self) -> Session {
        let current = self.hub.session().unwrap_or_else(|| self.new_session());
        if current.active {
            return current;
        }
        let started = current.activated();
        tracing::info!(uuid = %started.uuid, "Session started");
        self.hub.update(Signal::Session(started));
        started
    }

    /// Current session, if any
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.hub.session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use widget_tracking_core::Field;
    use widget_tracking_testing::SequentialIdGenerator;

    fn maker() -> (Hub, SessionMaker) {
        let hub = Hub::new();
        let maker = SessionMaker::new(hub.clone(), Rc::new(SequentialIdGenerator::new()));
        (hub, maker)
    }

    #[test]
    fn new_session_is_inactive_and_published() {
        let (hub, maker) = maker();
        let session = maker.new_session();
        assert!(!session.active);
        assert_eq!(hub.session(), Some(session));
    }

    #[test]
    fn start_is_idempotent() {
        let (hub, maker) = maker();
        let published = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&published);
        let _sub = hub.on(Field::Session, move |signal| {
            log.borrow_mut().extend(signal.as_session().copied());
        });

        maker.new_session();
        let started = maker.start();
        let again = maker.start();

        assert!(started.active);
        assert_eq!(started, again);
        // mint + start; the second start publishes nothing
        assert_eq!(published.borrow().len(), 2);
    }

    #[test]
    fn start_without_session_mints_one() {
        let (hub, maker) = maker();
        let started = maker.start();
        assert!(started.active);
        assert!(hub.is_active());
    }

    #[test]
    fn rotation_replaces_rather_than_merges() {
        let (hub, maker) = maker();
        let first = maker.start();
        let second = maker.new_session();
        assert!(!first.same_as(&second));
        assert_eq!(hub.session(), Some(second));
        assert!(!hub.is_active());
    }
}
