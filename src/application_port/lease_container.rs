use crate::domain_model::{Lease, LeaseId, LeaseMode};
use crate::domain_port::SchedulingError;
use std::time::Duration;

/// How a failed backend call should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth retrying: timeouts, unavailable backend.
    Transient,
    /// Retrying the same call cannot succeed.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenewalError {
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("lease {0} is not renewable")]
    NotRenewable(LeaseId),
    #[error("lease {0} not found")]
    NotFound(LeaseId),
    #[error("rejected by backend: {0}")]
    Rejected(String),
}

impl RenewalError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RenewalError::Timeout(_) | RenewalError::Unavailable(_) => FailureKind::Transient,
            RenewalError::NotRenewable(_) | RenewalError::NotFound(_) | RenewalError::Rejected(_) => {
                FailureKind::Permanent
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevocationError {
    #[error("revocation timed out after {0:?}")]
    Timeout(Duration),
    #[error("revocation failed: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("could not schedule lease: {0}")]
    Scheduling(#[from] SchedulingError),
    #[error("could not obtain secret from {path}: {source}")]
    Acquire { path: String, source: RenewalError },
    #[error("lease container is closed")]
    Closed,
}

#[async_trait::async_trait]
pub trait LeaseContainer: Send + Sync {
    /// Inserts or replaces the lease and schedules its first renewal.
    fn register(&self, lease: Lease) -> Result<(), RegistrationError>;
    /// Issues a fresh secret from `path` and registers it.
    async fn acquire(&self, path: &str, mode: LeaseMode) -> Result<Lease, RegistrationError>;
    /// Cancels and removes without contacting the backend.
    fn unregister(&self, id: &LeaseId) -> Option<Lease>;
    /// Unregisters, then revokes on the backend (best effort).
    async fn revoke(&self, id: &LeaseId) -> Option<Lease>;
    fn lookup(&self, id: &LeaseId) -> Option<Lease>;
    fn list(&self) -> Vec<Lease>;
}
