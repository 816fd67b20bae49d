use crate::application_port::EventListener;
use crate::domain_model::*;

/// Logs every lifecycle event.
#[derive(Debug, Default)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_event(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        let name = event.name();
        match &event.payload {
            EventPayload::Lease(LeaseEvent::Error {
                id,
                attempt,
                error,
                retrying,
                ..
            }) => {
                tracing::warn!(event = name, lease_id = %id, attempt, retrying, "{error}");
            }
            EventPayload::Lease(LeaseEvent::Rotated { previous, lease }) => {
                tracing::info!(event = name, previous = %previous, lease_id = %lease.id);
            }
            EventPayload::Lease(_) => {
                let id = event.lease_id().map(LeaseId::to_string).unwrap_or_default();
                tracing::info!(event = name, lease_id = %id);
            }
            EventPayload::Session(SessionEvent::Error { error }) => {
                tracing::warn!(event = name, "{error}");
            }
            EventPayload::Session(_) => {
                tracing::info!(event = name, at = %event.occurred_at);
            }
        }
        Ok(())
    }
}
