//! Viewability detection.
//!
//! A [`ViewabilityDetector`] waits, per element, until the element has been
//! continuously exposed above an area threshold for a minimum duration.
//! Live observations are kept in a side table keyed by [`ElementId`]; each
//! entry holds the [`AbortHandle`] that cancels it. Entries are removed when
//! the observation resolves, when it is cancelled, or by [`ViewabilityDetector::cancel_all`].
//!
//! # Contract
//!
//! - At most one live observation per element. Observing an element that is
//!   already observed is an error ([`TrackingError::AlreadyObserving`]).
//! - The countdown restarts whenever visibility drops below the threshold.
//! - A cancelled [`Detection`] completes with `Err(Aborted)`; callers treat
//!   that as abandonment, never as a signal.

use crate::metrics::DetectionMetrics;
use futures::future::{AbortHandle, Abortable, Aborted, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::watch;
use widget_tracking_core::environment::Viewport;
use widget_tracking_core::{ElementId, ElementRef, TrackingError, ViewableOptions};

struct DetectorInner {
    viewport: Rc<dyn Viewport>,
    live: RefCell<HashMap<ElementId, AbortHandle>>,
}

impl DetectorInner {
    fn resolve(&self, element: ElementId) {
        if self.live.borrow_mut().remove(&element).is_some() {
            tracing::debug!(%element, "Viewability observation resolved");
            DetectionMetrics::record_resolved();
        }
    }
}

/// Cancellable viewability detector shared by one tracker
#[derive(Clone)]
pub struct ViewabilityDetector {
    inner: Rc<DetectorInner>,
}

impl fmt::Debug for ViewabilityDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewabilityDetector")
            .field("live", &self.live_count())
            .finish_non_exhaustive()
    }
}

/// A pending observation.
///
/// Resolves with `Ok(())` once the element has been viewable long enough,
/// or with `Err(Aborted)` if the observation was cancelled.
#[must_use = "a Detection does nothing unless awaited"]
pub struct Detection {
    element: ElementId,
    inner: LocalBoxFuture<'static, Result<(), Aborted>>,
}

impl Detection {
    /// The observed element
    #[must_use]
    pub const fn element(&self) -> ElementId {
        self.element
    }
}

impl fmt::Debug for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detection")
            .field("element", &self.element)
            .finish_non_exhaustive()
    }
}

impl Future for Detection {
    type Output = Result<(), Aborted>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl ViewabilityDetector {
    /// Create a detector reading intersection ratios from `viewport`
    #[must_use]
    pub fn new(viewport: Rc<dyn Viewport>) -> Self {
        Self {
            inner: Rc::new(DetectorInner {
                viewport,
                live: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Start observing `element`.
    ///
    /// The observation is registered immediately; the returned [`Detection`]
    /// must be polled for the countdown to make progress.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::AlreadyObserving`] if `element` already has a
    /// live observation.
    pub fn observe(
        &self,
        element: &ElementRef,
        options: &ViewableOptions,
    ) -> Result<Detection, TrackingError> {
        let id = element.id();
        let (handle, registration) = AbortHandle::new_pair();
        {
            let mut table = self.inner.live.borrow_mut();
            if table.contains_key(&id) {
                return Err(TrackingError::AlreadyObserving(id));
            }
            table.insert(id, handle);
        }
        tracing::debug!(
            element = %id,
            area = options.area,
            duration_ms = options.duration_ms,
            "Viewability observation started"
        );
        DetectionMetrics::record_started();

        let ratio = self.inner.viewport.intersection(element);
        let wait = wait_viewable(ratio, options.area, options.duration());
        let detector: Weak<DetectorInner> = Rc::downgrade(&self.inner);
        let inner = async move {
            let outcome = Abortable::new(wait, registration).await;
            if outcome.is_ok() {
                if let Some(detector) = detector.upgrade() {
                    detector.resolve(id);
                }
            }
            outcome
        };

        Ok(Detection {
            element: id,
            inner: Box::pin(inner),
        })
    }

    /// Stop observing `element`.
    ///
    /// Returns whether a live observation was stopped. Cancelling an element
    /// that is not observed (never was, already resolved or already
    /// cancelled) is a no-op.
    pub fn cancel(&self, element: ElementId) -> bool {
        let removed = self.inner.live.borrow_mut().remove(&element);
        let Some(handle) = removed else {
            return false;
        };
        handle.abort();
        tracing::debug!(%element, "Viewability observation cancelled");
        DetectionMetrics::record_cancelled();
        true
    }

    /// Stop every live observation, returning how many were stopped
    pub fn cancel_all(&self) -> usize {
        let handles: Vec<(ElementId, AbortHandle)> =
            self.inner.live.borrow_mut().drain().collect();
        let count = handles.len();
        for (element, handle) in handles {
            handle.abort();
            tracing::debug!(%element, "Viewability observation cancelled");
            DetectionMetrics::record_cancelled();
        }
        count
    }

    /// Whether `element` has a live observation
    #[must_use]
    pub fn is_observing(&self, element: ElementId) -> bool {
        self.inner.live.borrow().contains_key(&element)
    }

    /// Number of live observations
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.live.borrow().len()
    }
}

fn is_visible(ratio: f64, area: f64) -> bool {
    ratio > 0.0 && ratio >= area
}

async fn wait_viewable(mut ratio: watch::Receiver<f64>, area: f64, duration: Duration) {
    loop {
        // Wait for the element to cross the threshold
        loop {
            if is_visible(*ratio.borrow_and_update(), area) {
                break;
            }
            if ratio.changed().await.is_err() {
                // The viewport stopped reporting while hidden
                return std::future::pending().await;
            }
        }

        let countdown = tokio::time::sleep(duration);
        tokio::pin!(countdown);
        loop {
            tokio::select! {
                () = &mut countdown => return,
                changed = ratio.changed() => {
                    if changed.is_err() {
                        // Last value was visible and will never change
                        countdown.await;
                        return;
                    }
                    if !is_visible(*ratio.borrow_and_update(), area) {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use tokio::task::LocalSet;
    use widget_tracking_core::Element;

    #[derive(Debug)]
    struct Leaf(ElementId);

    impl Element for Leaf {
        fn id(&self) -> ElementId {
            self.0
        }
        fn tag_name(&self) -> String {
            "div".into()
        }
        fn attribute(&self, _name: &str) -> Option<String> {
            None
        }
        fn parent(&self) -> Option<ElementRef> {
            None
        }
        fn children(&self) -> Vec<ElementRef> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct TestViewport {
        ratios: RefCell<HashMap<ElementId, watch::Sender<f64>>>,
    }

    impl TestViewport {
        fn set(&self, id: ElementId, ratio: f64) {
            self.ratios
                .borrow_mut()
                .entry(id)
                .or_insert_with(|| watch::channel(0.0).0)
                .send_replace(ratio);
        }
    }

    impl Viewport for TestViewport {
        fn intersection(&self, element: &ElementRef) -> watch::Receiver<f64> {
            self.ratios
                .borrow_mut()
                .entry(element.id())
                .or_insert_with(|| watch::channel(0.0).0)
                .subscribe()
        }
    }

    fn options(area: f64, duration_ms: u64) -> ViewableOptions {
        ViewableOptions { area, duration_ms }
    }

    fn leaf(n: u64) -> ElementRef {
        Rc::new(Leaf(ElementId::new(n)))
    }

    type Outcome = Rc<RefCell<Option<Result<(), Aborted>>>>;

    fn spawn(detection: Detection) -> Outcome {
        let outcome: Outcome = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&outcome);
        tokio::task::spawn_local(async move {
            *slot.borrow_mut() = Some(detection.await);
        });
        outcome
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_after_continuous_exposure() {
        LocalSet::new()
            .run_until(async {
                let viewport = Rc::new(TestViewport::default());
                let detector = ViewabilityDetector::new(viewport.clone());
                let el = leaf(1);
                viewport.set(el.id(), 0.6);

                let outcome = spawn(detector.observe(&el, &options(0.5, 1000)).unwrap());
                assert!(detector.is_observing(el.id()));

                sleep_ms(999).await;
                assert!(outcome.borrow().is_none());

                sleep_ms(2).await;
                assert_eq!(*outcome.borrow(), Some(Ok(())));
                assert!(!detector.is_observing(el.id()));
                assert_eq!(detector.live_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_restarts_when_visibility_drops() {
        LocalSet::new()
            .run_until(async {
                let viewport = Rc::new(TestViewport::default());
                let detector = ViewabilityDetector::new(viewport.clone());
                let el = leaf(1);
                viewport.set(el.id(), 0.6);
                let outcome = spawn(detector.observe(&el, &options(0.5, 1000)).unwrap());

                sleep_ms(500).await;
                viewport.set(el.id(), 0.2);
                sleep_ms(100).await;
                viewport.set(el.id(), 0.6);

                // 600ms restart + 1000ms countdown
                sleep_ms(999).await;
                assert!(outcome.borrow().is_none());
                sleep_ms(2).await;
                assert_eq!(*outcome.borrow(), Some(Ok(())));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_element_never_resolves() {
        LocalSet::new()
            .run_until(async {
                let viewport = Rc::new(TestViewport::default());
                let detector = ViewabilityDetector::new(viewport.clone());
                let el = leaf(1);
                // Zero exposure never counts, even with a zero threshold
                let outcome = spawn(detector.observe(&el, &options(0.0, 10)).unwrap());

                sleep_ms(10_000).await;
                assert!(outcome.borrow().is_none());
                assert!(detector.is_observing(el.id()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_abandons_the_detection_and_is_idempotent() {
        LocalSet::new()
            .run_until(async {
                let viewport = Rc::new(TestViewport::default());
                let detector = ViewabilityDetector::new(viewport.clone());
                let el = leaf(1);
                viewport.set(el.id(), 1.0);
                let outcome = spawn(detector.observe(&el, &options(0.5, 1000)).unwrap());

                sleep_ms(400).await;
                assert!(detector.cancel(el.id()));
                assert!(!detector.cancel(el.id()));
                sleep_ms(2000).await;

                assert_eq!(*outcome.borrow(), Some(Err(Aborted)));
                assert!(!detector.is_observing(el.id()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_resolution_is_a_no_op() {
        LocalSet::new()
            .run_until(async {
                let viewport = Rc::new(TestViewport::default());
                let detector = ViewabilityDetector::new(viewport.clone());
                let el = leaf(1);
                viewport.set(el.id(), 1.0);
                let outcome = spawn(detector.observe(&el, &options(0.5, 0)).unwrap());

                sleep_ms(1).await;
                assert_eq!(*outcome.borrow(), Some(Ok(())));
                assert!(!detector.cancel(el.id()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn detection_is_pending_until_the_countdown_elapses() {
        let viewport = Rc::new(TestViewport::default());
        let detector = ViewabilityDetector::new(viewport.clone());
        let el = leaf(1);
        viewport.set(el.id(), 0.5);

        let mut detection = tokio_test::task::spawn(detector.observe(&el, &options(0.5, 1000)).unwrap());
        tokio_test::assert_pending!(detection.poll());

        tokio::time::advance(Duration::from_millis(999)).await;
        tokio_test::assert_pending!(detection.poll());

        tokio::time::advance(Duration::from_millis(1)).await;
        tokio_test::assert_ready_ok!(detection.poll());
        assert_eq!(detector.live_count(), 0);
    }

    #[test]
    fn second_observe_of_live_element_is_rejected() {
        let detector = ViewabilityDetector::new(Rc::new(TestViewport::default()));
        let el = leaf(7);
        let _first = detector.observe(&el, &options(0.5, 1000)).unwrap();

        let err = detector.observe(&el, &options(0.5, 1000)).unwrap_err();
        assert_eq!(err, TrackingError::AlreadyObserving(ElementId::new(7)));

        // A cancelled element can be observed again
        assert!(detector.cancel(el.id()));
        assert!(detector.observe(&el, &options(0.5, 1000)).is_ok());
    }

    #[test]
    fn cancel_all_clears_the_table() {
        let detector = ViewabilityDetector::new(Rc::new(TestViewport::default()));
        let _pending: Vec<Detection> = (0..3)
            .map(|n| detector.observe(&leaf(n), &options(0.5, 1000)).unwrap())
            .collect();
        assert_eq!(detector.live_count(), 3);
        assert_eq!(detector.cancel_all(), 3);
        assert_eq!(detector.live_count(), 0);
    }

    fn live_gauge(handle: &metrics_exporter_prometheus::PrometheusHandle) -> Option<f64> {
        handle
            .render()
            .lines()
            .find_map(|line| line.strip_prefix("tracking_detections_live "))
            .and_then(|value| value.trim().parse().ok())
    }

    #[test]
    fn live_gauge_counts_every_detector() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let products = ViewabilityDetector::new(Rc::new(TestViewport::default()));
            let results = ViewabilityDetector::new(Rc::new(TestViewport::default()));
            let _first = products.observe(&leaf(1), &options(0.5, 1000)).unwrap();
            let _second = results.observe(&leaf(2), &options(0.5, 1000)).unwrap();
            assert_eq!(live_gauge(&handle), Some(2.0));

            // Emptying one detector leaves the other's observation counted
            assert!(products.cancel(ElementId::new(1)));
            assert_eq!(live_gauge(&handle), Some(1.0));

            assert_eq!(results.cancel_all(), 1);
            assert_eq!(live_gauge(&handle), Some(0.0));
        });
    }
}
