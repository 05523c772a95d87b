use std::sync::Arc;

use async_trait::async_trait;
use mochi_core::{ScheduledEvent, Value};
use mochi_registry::{AppRegistry, Event, EventSource};
use mochi_scheduler::{ScheduleDispatcher, SchedulerError};

/// Wires `mochi-scheduler`'s dispatch seam to the process-wide
/// [`AppRegistry`]. A scheduled row carries no `service` field (it targets
/// an app's event handler directly, not one of its declared services), so
/// the synthesized [`Event`] reuses the app id as `service` — the same
/// placeholder `mochi-wire` uses for its own non-service-call `ack`/`nack`
/// headers.
pub struct RegistryScheduleDispatcher {
    registry: Arc<AppRegistry>,
}

impl RegistryScheduleDispatcher {
    pub fn new(registry: Arc<AppRegistry>) -> Self {
        RegistryScheduleDispatcher { registry }
    }
}

#[async_trait]
impl ScheduleDispatcher for RegistryScheduleDispatcher {
    async fn app_event_exists(&self, _user: i64, app: &str, event: &str) -> bool {
        self.registry.has_event(app, event)
    }

    async fn dispatch_schedule(&self, event: &ScheduledEvent) -> Result<(), SchedulerError> {
        let data = decode_data_blob(event.data_blob.as_deref());

        let registry_event = Event {
            user: event.user,
            msg_id: None,
            from_entity: None,
            service: event.app.clone(),
            event_name: event.event_name.clone(),
            content: Value::None,
            data,
            source: EventSource::Schedule,
            stream: None,
        };

        self.registry
            .dispatch_event(&event.app, registry_event)
            .await
            .map_err(|e| SchedulerError::Dispatch(e.to_string()))
    }
}

fn decode_data_blob(blob: Option<&[u8]>) -> Value {
    let Some(bytes) = blob else {
        return Value::None;
    };
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(json) => Value::from_json(&json),
        Err(_) => Value::None,
    }
}
