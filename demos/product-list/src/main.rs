//! Product list demo
//!
//! Replays a short browsing episode against an in-memory page:
//!
//! 1. Two products render: one aggregated impression
//! 2. P1 stays half visible for a second: viewable
//! 3. The shopper clicks P2's link: click
//! 4. P2 scrolls into view, but a new query rotates the session first
//! 5. The list re-renders for the new session and tracking starts over
//!
//! Delivered payloads are printed as JSON, followed by the Prometheus
//! metrics the run produced.

use anyhow::Context;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use widget_tracking::{ApiInfo, ClickEvent, InteractionSink, ViewUpdate, Workflow};
use widget_tracking_core::environment::UuidV4Generator;
use widget_tracking_core::{DeliveryError, Element, EventType, Interaction, Role, TrackerOptions};
use widget_tracking_runtime::metrics::MetricsRecorder;
use widget_tracking_testing::{ManualViewport, MockElement, MockElementSource};

const OPTIONS: &str = r#"{ "impression": {}, "viewable": { "area": 0.5, "duration": 1000 }, "click": true }"#;

// Response id of the rendered search, a version 1 UUID
const MISO_ID: &str = "c232ab00-9414-11ec-b3c8-9f6bdeced846";

/// Prints each payload on stdout, as a beacon would post it
struct StdoutSink;

impl InteractionSink for StdoutSink {
    fn send(&self, interaction: &Interaction) -> Result<(), DeliveryError> {
        let body = serde_json::to_string(interaction)?;
        println!("  → {body}");
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let recorder = MetricsRecorder::install().context("installing metrics recorder")?;

    LocalSet::new().run_until(run()).await?;

    if let Some(rendered) = recorder.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    println!("=== Product list tracking demo ===\n");

    let viewport = Rc::new(ManualViewport::new());
    let workflow = Workflow::new(Rc::new(UuidV4Generator), viewport.clone()).with_api(ApiInfo {
        group: Some("search".into()),
        name: Some("search".into()),
    });
    workflow.use_trackers(TrackerOptions::from_json(OPTIONS)?)?;
    workflow.use_delivery(Rc::new(StdoutSink));

    let root = MockElement::root(Some(MISO_ID));
    let p1 = MockElement::product("P1");
    let p2_link = MockElement::link("/products/P2");
    let p2 = MockElement::with_children(MockElement::product("P2"), &[p2_link.clone()]);
    MockElement::append(&root, &p1);
    MockElement::append(&root, &p2);

    let source = MockElementSource::new();
    source.set(root.handle());
    let tracker = workflow.add_tracker(Role::Products, Rc::new(source));

    println!(">>> Render P1 and P2");
    workflow.start();
    workflow.notify_view_update(Role::Products, ViewUpdate::ready())?;

    println!("\n>>> P1 half visible for one second");
    viewport.set_ratio(p1.id(), 0.5);
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    println!("\n>>> Click on P2's link");
    tracker.handle_click(ClickEvent::primary(p2_link.handle()));

    println!("\n>>> P2 visible, then a new query after 500ms");
    viewport.set_ratio(p2.id(), 1.0);
    tokio::time::sleep(Duration::from_millis(500)).await;
    workflow.restart();
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let p2_state = tracker.get_state("P2");
    println!(
        "  P2 after rotation: impression={} viewable={}",
        p2_state.get(EventType::Impression),
        p2_state.get(EventType::Viewable)
    );

    println!("\n>>> Re-render for the new session");
    workflow.notify_view_update(Role::Products, ViewUpdate::ready())?;
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    workflow.destroy();
    println!("\n=== Done ===");
    Ok(())
}
