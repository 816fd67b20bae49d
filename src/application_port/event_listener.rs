use crate::domain_model::LifecycleEvent;

/// Receives lifecycle events on the thread that produced them. Errors and
/// panics are logged by the publisher and do not reach other listeners.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        self(event)
    }
}
