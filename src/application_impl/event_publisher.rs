use crate::application_port::EventListener;
use crate::domain_model::LifecycleEvent;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous fan-out of lifecycle events, in subscription order.
#[derive(Default)]
pub struct EventPublisher {
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn EventListener>)>>,
    next_id: AtomicU64,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn publish(&self, event: LifecycleEvent) {
        // listeners may subscribe from inside a callback
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(subscription = id.0, event = event.name(), "listener failed: {e:#}");
                }
                Err(payload) => {
                    tracing::error!(
                        subscription = id.0,
                        event = event.name(),
                        "listener panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
