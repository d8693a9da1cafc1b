//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the tracking components:
//! - Hub signal dispatch
//! - Session rotation
//! - Viewability detection lifecycle
//! - Published interactions
//! - Delivery failures
//!
//! Recording is always on; the values only go somewhere once a recorder is
//! installed.
//!
//! # Example
//!
//! ```rust,no_run
//! use widget_tracking_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//!
//! // ... run a workflow ...
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use widget_tracking_core::{Field, Interaction};

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Register metric descriptions and install a Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the recorder cannot be installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), a warning is
    /// logged and the returned recorder renders nothing.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                tracing::info!("Metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this recorder did not install the global one.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Hub
    describe_counter!(
        "hub_signals_dispatched_total",
        "Total number of signals delivered to hub subscribers"
    );

    // Sessions
    describe_counter!(
        "tracking_sessions_rotated_total",
        "Total number of times a tracker retired its per-session state"
    );

    // Viewability
    describe_counter!(
        "tracking_detections_started_total",
        "Total number of viewability observations started"
    );
    describe_counter!(
        "tracking_detections_cancelled_total",
        "Total number of viewability observations cancelled before resolving"
    );
    describe_counter!(
        "tracking_detections_resolved_total",
        "Total number of viewability observations that resolved"
    );
    describe_gauge!(
        "tracking_detections_live",
        "Viewability observations currently in flight, summed over every detector"
    );

    // Interactions
    describe_counter!(
        "tracking_interactions_published_total",
        "Total number of aggregated interaction events published"
    );
    describe_counter!(
        "delivery_failures_total",
        "Total number of interaction payloads a sink failed to send"
    );
}

/// Hub metrics recorder.
pub struct HubMetrics;

impl HubMetrics {
    /// Record one signal delivered to the subscribers of `field`.
    pub fn record_dispatch(field: Field) {
        counter!("hub_signals_dispatched_total", "field" => field.to_string()).increment(1);
    }
}

/// Tracking metrics recorder.
pub struct TrackingMetrics;

impl TrackingMetrics {
    /// Record a published interaction.
    pub fn record_interaction(interaction: &Interaction) {
        let trigger = if interaction.is_manual() { "manual" } else { "auto" };
        counter!(
            "tracking_interactions_published_total",
            "type" => interaction.event.public_name(),
            "trigger" => trigger
        )
        .increment(1);
    }

    /// Record a session rotation.
    pub fn record_rotation() {
        counter!("tracking_sessions_rotated_total").increment(1);
    }

    /// Record a delivery failure.
    pub fn record_delivery_failure() {
        counter!("delivery_failures_total").increment(1);
    }
}

/// Viewability detection metrics recorder.
pub struct DetectionMetrics;

impl DetectionMetrics {
    /// Record a started observation.
    pub fn record_started() {
        counter!("tracking_detections_started_total").increment(1);
        gauge!("tracking_detections_live").increment(1.0);
    }

    /// Record a cancelled observation.
    pub fn record_cancelled() {
        counter!("tracking_detections_cancelled_total").increment(1);
        gauge!("tracking_detections_live").decrement(1.0);
    }

    /// Record a resolved observation.
    pub fn record_resolved() {
        counter!("tracking_detections_resolved_total").increment(1);
        gauge!("tracking_detections_live").decrement(1.0);
    }
}
