//! Bridge from the hub's interaction field to a transport.

use std::fmt;
use std::rc::Rc;
use widget_tracking_core::environment::InteractionSink;
use widget_tracking_core::{Field, Interaction};
use widget_tracking_runtime::metrics::TrackingMetrics;
use widget_tracking_runtime::{Hub, Subscription};

/// API the interactions of a workflow are attributed to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiInfo {
    /// API group (e.g. `"search"`)
    pub group: Option<String>,
    /// API name (e.g. `"search"`, `"autocomplete"`)
    pub name: Option<String>,
}

/// Forwards every published interaction to an [`InteractionSink`].
///
/// Before sending, `api_group`/`api_name` are filled in from [`ApiInfo`]
/// unless the payload already carries them. Failures are logged and
/// counted, never retried.
pub struct Delivery {
    _subscription: Subscription,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery").finish_non_exhaustive()
    }
}

impl Delivery {
    /// Subscribe `sink` to `hub`'s interactions
    #[must_use]
    pub fn attach(hub: &Hub, sink: Rc<dyn InteractionSink>, api: ApiInfo) -> Self {
        let subscription = hub.on(Field::Interaction, move |signal| {
            let Some(interaction) = signal.as_interaction() else {
                return;
            };
            let payload = preprocess(interaction, &api);
            if let Err(error) = sink.send(&payload) {
                tracing::warn!(
                    %error,
                    event = payload.event.public_name(),
                    products = ?payload.product_ids,
                    "Failed to deliver interaction"
                );
                TrackingMetrics::record_delivery_failure();
            }
        });
        Self {
            _subscription: subscription,
        }
    }
}

fn preprocess(interaction: &Interaction, api: &ApiInfo) -> Interaction {
    let mut payload = interaction.clone();
    let context = &mut payload.context.custom_context;
    if context.api_group.is_none() {
        context.api_group.clone_from(&api.group);
    }
    if context.api_name.is_none() {
        context.api_name.clone_from(&api.name);
    }
    payload
}
