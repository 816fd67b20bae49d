#![allow(dead_code)]

use leasekeeper::application_impl::*;
use leasekeeper::application_port::*;
use leasekeeper::domain_model::*;
use leasekeeper::domain_port::TaskScheduler;
use leasekeeper::runtime::TokioTaskScheduler;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Collects every published event.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(LifecycleEvent::name).collect()
    }

    /// Names of the events concerning `id`, in publication order.
    pub fn names_for(&self, id: &LeaseId) -> Vec<&'static str> {
        self.events()
            .iter()
            .filter(|event| event.concerns(id))
            .map(LifecycleEvent::name)
            .collect()
    }

    pub fn session_names(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .filter(|event| matches!(event.payload, EventPayload::Session(_)))
            .map(LifecycleEvent::name)
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }
}

impl EventListener for Recorder {
    fn on_event(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub backend: Arc<FakeVaultBackend>,
    pub manager: Arc<LeaseManager>,
    pub recorder: Arc<Recorder>,
    pub started: Instant,
}

impl Harness {
    pub fn new(backend: FakeBackendConfig) -> Self {
        Self::with(backend, RetryPolicy::default(), RenewalConfig::default())
    }

    pub fn with(backend: FakeBackendConfig, policy: RetryPolicy, config: RenewalConfig) -> Self {
        Self::with_executor(backend, Arc::new(TokioTaskScheduler::new(4)), policy, config)
    }

    pub fn with_executor(
        backend: FakeBackendConfig,
        executor: Arc<dyn TaskScheduler>,
        policy: RetryPolicy,
        config: RenewalConfig,
    ) -> Self {
        let backend = FakeVaultBackend::new(backend);
        let manager = LeaseManager::open(backend.ports(), executor, policy, config);
        let recorder = Arc::new(Recorder::default());
        manager.subscribe(recorder.clone());
        Self {
            backend,
            manager,
            recorder,
            started: Instant::now(),
        }
    }

    /// Renewal instants for `id`, as offsets from harness creation.
    pub fn renewal_offsets(&self, id: &LeaseId) -> Vec<Duration> {
        self.backend
            .renewals()
            .into_iter()
            .filter(|(renewed, _)| renewed == id)
            .map(|(_, at)| at - self.started)
            .collect()
    }
}

pub fn static_lease(id: &str, ttl: Duration, mode: LeaseMode) -> Lease {
    Lease::new(id, "database/creds/app", SecretPayload::new(), ttl, true, mode)
}

/// Lets paused time run forward by `duration`.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

pub fn revoking_on_close() -> RenewalConfig {
    RenewalConfig::new(Ratio::two_thirds(), secs(10), true).unwrap()
}

pub fn secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// `actual` lies within a few milliseconds after `expected`.
pub fn assert_near(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {actual:?}"
    );
}
