use super::{
    AuthenticationSession, EventPublisher, LeaseRegistry, RenewalConfig, RetryDecision,
    RetryPolicy, Ticket,
};
use crate::application_port::{RegistrationError, RenewalError};
use crate::domain_model::*;
use crate::domain_port::*;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Renewal fires this long after issue. Strictly before `issued_at + ttl`
/// for any non-zero ttl because the threshold is below one.
pub fn renewal_deadline(issued_at: Instant, ttl: Duration, threshold: Ratio) -> Instant {
    deadline_after(issued_at, threshold.of(ttl))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseAction {
    Renew,
    Expire,
}

enum Rejection {
    /// Registration raced shutdown. Carries the lease when this call still
    /// owns it, i.e. the drain did not pick it up.
    Closed(Option<Lease>),
    Scheduling(SchedulingError),
}

impl From<Rejection> for RegistrationError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Closed(_) => RegistrationError::Closed,
            Rejection::Scheduling(e) => RegistrationError::Scheduling(e),
        }
    }
}

/// Drives every timed transition: lease renewal, retry, rotation and expiry,
/// and the session's renewal or expiry timer. Work runs on the shared
/// [`TaskScheduler`]; nothing here runs on a caller's task except the
/// initial scheduling done by `register_lease`.
pub struct RenewalScheduler {
    executor: Arc<dyn TaskScheduler>,
    registry: Arc<LeaseRegistry>,
    leases: Arc<dyn LeaseOperations>,
    publisher: Arc<EventPublisher>,
    policy: RetryPolicy,
    config: RenewalConfig,
    closed: AtomicBool,
    me: Weak<RenewalScheduler>,
}

impl RenewalScheduler {
    pub fn new(
        executor: Arc<dyn TaskScheduler>,
        registry: Arc<LeaseRegistry>,
        leases: Arc<dyn LeaseOperations>,
        publisher: Arc<EventPublisher>,
        policy: RetryPolicy,
        config: RenewalConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            executor,
            registry,
            leases,
            publisher,
            policy,
            config,
            closed: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    pub fn config(&self) -> &RenewalConfig {
        &self.config
    }

    /// Applies the request timeout to a backend call.
    pub async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, RenewalError>>,
    ) -> Result<T, RenewalError> {
        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RenewalError::Timeout(self.config.request_timeout)),
        }
    }

    // region leases

    /// Refuses every later registration. Called before the registry is
    /// drained so nothing lands behind the drain.
    pub fn stop_registrations(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Stores the lease, announces it and arms its first timer before
    /// returning. If the executor refuses the task the lease is expired on
    /// the spot.
    pub fn register_lease(
        &self,
        lease: Lease,
        announce: impl FnOnce(Lease) -> LeaseEvent,
    ) -> Result<Lease, RegistrationError> {
        Ok(self.insert_and_schedule(lease, announce)?)
    }

    /// Like `register_lease` for a lease issued on the caller's behalf. When
    /// shutdown wins the race the lease is revoked, since nobody else will.
    pub async fn register_issued(
        &self,
        lease: Lease,
        announce: impl FnOnce(Lease) -> LeaseEvent,
    ) -> Result<Lease, RegistrationError> {
        match self.insert_and_schedule(lease, announce) {
            Ok(lease) => Ok(lease),
            Err(Rejection::Closed(Some(orphan))) => {
                tracing::info!(lease_id = %orphan.id, "registration raced shutdown, revoking");
                self.revoke_quietly(&orphan.id).await;
                Err(RegistrationError::Closed)
            }
            Err(rejection) => Err(rejection.into()),
        }
    }

    fn insert_and_schedule(
        &self,
        lease: Lease,
        announce: impl FnOnce(Lease) -> LeaseEvent,
    ) -> Result<Lease, Rejection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Rejection::Closed(Some(lease)));
        }
        let (ticket, stored, replaced) = self.registry.insert(lease);
        if let Some(replaced) = replaced {
            tracing::debug!(lease_id = %replaced.id, "replaced existing lease");
        }
        if self.closed.load(Ordering::SeqCst) {
            // whichever of this and the drain removes the entry owns it
            return Err(Rejection::Closed(self.registry.remove(&stored.id)));
        }
        self.publisher
            .publish(LifecycleEvent::lease(announce(stored.clone())));
        match self.schedule_lease(&stored, ticket) {
            Ok(()) => Ok(stored),
            Err(e) => {
                self.on_schedule_failed(&stored.id, ticket, &e);
                Err(Rejection::Scheduling(e))
            }
        }
    }

    fn schedule_lease(&self, lease: &Lease, ticket: Ticket) -> Result<(), SchedulingError> {
        if lease.renewable && !lease.ttl.is_zero() {
            let fire_at = renewal_deadline(lease.issued_at, lease.ttl, self.config.threshold);
            self.submit_lease_task(&lease.id, ticket, fire_at, LeaseAction::Renew)
        } else {
            self.submit_lease_task(&lease.id, ticket, lease.expires_at(), LeaseAction::Expire)
        }
    }

    fn submit_lease_task(
        &self,
        id: &LeaseId,
        ticket: Ticket,
        fire_at: Instant,
        action: LeaseAction,
    ) -> Result<(), SchedulingError> {
        let delay = fire_at.saturating_duration_since(Instant::now());
        let me = self.me.clone();
        let task_id = id.clone();
        let task = async move {
            if let Some(scheduler) = me.upgrade() {
                scheduler.fire_lease(task_id, ticket, action).await;
            }
        }
        .boxed();

        let handle = self.executor.schedule(delay, task)?;
        tracing::trace!(lease_id = %id, ?action, ?delay, task = handle.id(), "lease task scheduled");
        self.registry.attach_task(id, ticket, handle);
        Ok(())
    }

    async fn fire_lease(&self, id: LeaseId, ticket: Ticket, action: LeaseAction) {
        match action {
            LeaseAction::Expire => {
                if let Some(lease) = self.registry.retire(&id, ticket, CredentialState::Expired) {
                    tracing::info!(lease_id = %lease.id, path = %lease.path, "lease expired");
                    self.publish_expired(lease);
                }
            }
            LeaseAction::Renew => self.renew_lease(id, ticket).await,
        }
    }

    async fn renew_lease(&self, id: LeaseId, ticket: Ticket) {
        let Some(lease) = self.registry.begin_renewal(&id, ticket) else {
            tracing::debug!(lease_id = %id, "stale renewal fire ignored");
            return;
        };

        match self.call(self.leases.renew(&lease.id)).await {
            Ok(ttl) => self.on_renewed(&lease.id, ticket, ttl),
            Err(e) => self.on_renewal_failed(&lease.id, ticket, e).await,
        }
    }

    fn on_renewed(&self, id: &LeaseId, ticket: Ticket, ttl: Duration) {
        let Some((next, renewed)) = self
            .registry
            .complete_renewal(id, ticket, ttl, Instant::now())
        else {
            tracing::debug!(lease_id = %id, "lease removed during renewal");
            return;
        };
        tracing::info!(lease_id = %id, ?ttl, "lease renewed");

        self.publisher.publish(LifecycleEvent::lease(LeaseEvent::Renewed {
            lease: renewed.clone(),
        }));
        if let Err(e) = self.schedule_lease(&renewed, next) {
            self.on_schedule_failed(id, next, &e);
        }
    }

    async fn on_renewal_failed(&self, id: &LeaseId, ticket: Ticket, error: RenewalError) {
        let Some(failed) = self.registry.record_failure(id, ticket) else {
            return;
        };

        let now = Instant::now();
        let can_rotate = failed.supports_rotation();
        let retry_at = match self.policy.decide(failed.attempts, error.kind(), can_rotate) {
            RetryDecision::Retry { after } => retry_time(&failed, now, after),
            _ => None,
        };

        self.publish_error(&failed, error.to_string(), retry_at.is_some());

        if let Some(fire_at) = retry_at {
            tracing::warn!(
                lease_id = %id,
                attempt = failed.attempts,
                "lease renewal failed, retrying: {error}"
            );
            let Some(next) = self.registry.rearm(id, ticket) else {
                return;
            };
            if let Err(e) = self.submit_lease_task(id, next, fire_at, LeaseAction::Renew) {
                self.on_schedule_failed(id, next, &e);
            }
            return;
        }

        match self.policy.exhausted(can_rotate) {
            RetryDecision::Rotate => {
                tracing::warn!(lease_id = %id, attempt = failed.attempts, "lease renewal exhausted, rotating: {error}");
                self.rotate(failed, ticket).await;
            }
            _ => {
                tracing::error!(lease_id = %id, attempt = failed.attempts, "lease renewal exhausted, giving up: {error}");
                if let Some(expired) = self.registry.retire(id, ticket, CredentialState::Expired) {
                    self.publish_expired(expired);
                }
            }
        }
    }

    async fn rotate(&self, failed: Lease, ticket: Ticket) {
        let issued = match self.call(self.leases.reissue(&failed.path)).await {
            Ok(issued) => issued,
            Err(e) => {
                tracing::error!(lease_id = %failed.id, path = %failed.path, "reissue failed: {e}");
                if let Some(expired) = self
                    .registry
                    .retire(&failed.id, ticket, CredentialState::Expired)
                {
                    self.publish_error(&expired, format!("reissue failed: {e}"), false);
                    self.publish_expired(expired);
                }
                return;
            }
        };

        let Some(previous) = self
            .registry
            .retire(&failed.id, ticket, CredentialState::Rotated)
        else {
            tracing::debug!(lease_id = %failed.id, "lease removed during rotation, discarding replacement");
            self.revoke_quietly(&issued.id).await;
            return;
        };

        let replacement = Lease::from_issued(previous.path.clone(), issued, previous.mode);
        let previous_id = previous.id.clone();
        match self
            .register_issued(replacement, |lease| LeaseEvent::Rotated {
                previous: previous_id,
                lease,
            })
            .await
        {
            Ok(lease) => {
                tracing::info!(previous = %previous.id, lease_id = %lease.id, "lease rotated");
            }
            Err(e) => {
                tracing::error!(previous = %previous.id, "rotated lease could not be scheduled: {e}");
            }
        }
    }

    /// Best-effort backend revocation; failures are only logged.
    pub async fn revoke_quietly(&self, id: &LeaseId) -> bool {
        let timeout = self.config.request_timeout;
        let result = match tokio::time::timeout(timeout, self.leases.revoke(id)).await {
            Ok(result) => result,
            Err(_) => Err(crate::application_port::RevocationError::Timeout(timeout)),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(lease_id = %id, "lease revocation failed: {e}");
                false
            }
        }
    }

    fn on_schedule_failed(&self, id: &LeaseId, ticket: Ticket, error: &SchedulingError) {
        tracing::error!(lease_id = %id, "renewal task rejected: {error}");
        if let Some(expired) = self.registry.retire(id, ticket, CredentialState::Expired) {
            self.publish_error(&expired, error.to_string(), false);
            self.publish_expired(expired);
        }
    }

    fn publish_error(&self, lease: &Lease, error: String, retrying: bool) {
        self.publisher.publish(LifecycleEvent::lease(LeaseEvent::Error {
            id: lease.id.clone(),
            path: lease.path.clone(),
            attempt: lease.attempts,
            error,
            retrying,
        }));
    }

    fn publish_expired(&self, lease: Lease) {
        self.publisher.publish(LifecycleEvent::lease(LeaseEvent::Expired {
            id: lease.id,
            path: lease.path,
        }));
    }

    // endregion

    // region session

    /// Arms the session's next timer: renewal for renewable tokens, an expiry
    /// notification for the others, nothing for tokens without a TTL.
    pub fn schedule_session(
        &self,
        session: Weak<AuthenticationSession>,
        snapshot: &Session,
        generation: u64,
    ) -> Result<Option<TaskHandle>, SchedulingError> {
        let Some(ttl) = snapshot.ttl else {
            return Ok(None);
        };

        let (fire_at, task) = if snapshot.renewable && !ttl.is_zero() {
            let fire_at = renewal_deadline(snapshot.issued_at, ttl, self.config.threshold);
            let task = async move {
                if let Some(session) = session.upgrade() {
                    session.renew(generation).await;
                }
            }
            .boxed();
            (fire_at, task)
        } else {
            let task = async move {
                if let Some(session) = session.upgrade() {
                    session.expire(generation);
                }
            }
            .boxed();
            (deadline_after(snapshot.issued_at, ttl), task)
        };

        let delay = fire_at.saturating_duration_since(Instant::now());
        let handle = self.executor.schedule(delay, task)?;
        tracing::trace!(?delay, task = handle.id(), "session task scheduled");
        Ok(Some(handle))
    }

    // endregion

    pub async fn shutdown(&self, grace: Duration) {
        self.executor.shutdown(grace).await;
    }
}

/// Backoff clamped to half the remaining lifetime so the retry still fires
/// before expiry. `None` once the lease has no lifetime left.
fn retry_time(lease: &Lease, now: Instant, backoff: Duration) -> Option<Instant> {
    let remaining = lease.expires_at().checked_duration_since(now)?;
    if remaining.is_zero() {
        return None;
    }
    Some(now + backoff.min(remaining / 2))
}
