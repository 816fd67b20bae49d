use super::{
    AuthenticationSession, EventPublisher, LeaseRegistry, RenewalConfig, RenewalScheduler,
    RetryPolicy, SubscriptionId,
};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use futures_util::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Backend collaborators the manager is opened with.
#[derive(Clone)]
pub struct BackendPorts {
    pub authentication: Arc<dyn ClientAuthentication>,
    pub tokens: Arc<dyn TokenOperations>,
    pub leases: Arc<dyn LeaseOperations>,
}

/// Entry point tying session, registry and scheduler together.
pub struct LeaseManager {
    registry: Arc<LeaseRegistry>,
    scheduler: Arc<RenewalScheduler>,
    session: Arc<AuthenticationSession>,
    publisher: Arc<EventPublisher>,
    leases: Arc<dyn LeaseOperations>,
    closed: AtomicBool,
}

impl LeaseManager {
    pub fn open(
        backend: BackendPorts,
        executor: Arc<dyn TaskScheduler>,
        policy: RetryPolicy,
        config: RenewalConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(LeaseRegistry::new());
        let publisher = Arc::new(EventPublisher::new());
        let scheduler = RenewalScheduler::new(
            executor,
            registry.clone(),
            backend.leases.clone(),
            publisher.clone(),
            policy,
            config,
        );
        let session = AuthenticationSession::new(
            backend.authentication,
            backend.tokens,
            scheduler.clone(),
            publisher.clone(),
        );
        tracing::info!("lease manager opened");

        Arc::new(Self {
            registry,
            scheduler,
            session,
            publisher,
            leases: backend.leases,
            closed: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        self.publisher.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    pub fn session(&self) -> &Arc<AuthenticationSession> {
        &self.session
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops registrations, drains the registry (cancelling every pending
    /// timer), optionally revokes what was drained and the session token,
    /// then shuts the executor down with `grace` for in-flight renewals.
    pub async fn close(&self, grace: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("lease manager closing...");

        self.scheduler.stop_registrations();
        let drained = self.registry.drain();
        let revoke = self.scheduler.config().revoke_on_close;
        if revoke {
            let revocations = drained.iter().map(|lease| self.revoke_drained(lease));
            join_all(revocations).await;
        }
        tracing::info!(leases = drained.len(), "registry drained");

        self.session.close(revoke).await;
        self.scheduler.shutdown(grace).await;
        tracing::info!("lease manager closed");
    }

    async fn revoke_drained(&self, lease: &Lease) {
        if self.scheduler.revoke_quietly(&lease.id).await {
            self.publisher.publish(LifecycleEvent::lease(LeaseEvent::Revoked {
                id: lease.id.clone(),
                path: lease.path.clone(),
            }));
        }
    }
}

#[async_trait::async_trait]
impl LeaseContainer for LeaseManager {
    fn register(&self, lease: Lease) -> Result<(), RegistrationError> {
        if self.is_closed() {
            return Err(RegistrationError::Closed);
        }
        let lease = self
            .scheduler
            .register_lease(lease, |lease| LeaseEvent::Created { lease })?;
        tracing::info!(lease_id = %lease.id, path = %lease.path, ttl = ?lease.ttl, "lease registered");
        Ok(())
    }

    async fn acquire(&self, path: &str, mode: LeaseMode) -> Result<Lease, RegistrationError> {
        if self.is_closed() {
            return Err(RegistrationError::Closed);
        }
        let issued = self
            .scheduler
            .call(self.leases.reissue(path))
            .await
            .map_err(|source| RegistrationError::Acquire {
                path: path.to_owned(),
                source,
            })?;
        let lease = self
            .scheduler
            .register_issued(Lease::from_issued(path, issued, mode), |lease| {
                LeaseEvent::Created { lease }
            })
            .await?;
        tracing::info!(lease_id = %lease.id, path, ttl = ?lease.ttl, "secret acquired");
        Ok(lease)
    }

    fn unregister(&self, id: &LeaseId) -> Option<Lease> {
        let removed = self.registry.remove(id);
        if removed.is_some() {
            tracing::info!(lease_id = %id, "lease unregistered");
        }
        removed
    }

    async fn revoke(&self, id: &LeaseId) -> Option<Lease> {
        let removed = self.unregister(id)?;
        self.revoke_drained(&removed).await;
        Some(removed)
    }

    fn lookup(&self, id: &LeaseId) -> Option<Lease> {
        self.registry.lookup(id)
    }

    fn list(&self) -> Vec<Lease> {
        self.registry.list()
    }
}

#[async_trait::async_trait]
impl SessionManager for LeaseManager {
    async fn get_token(&self) -> Result<VaultToken, AuthenticationError> {
        self.session.get_token().await
    }
}
