use crate::application_port::{RenewalError, RevocationError};
use crate::domain_model::{IssuedLease, LeaseId};
use std::time::Duration;

#[async_trait::async_trait]
pub trait LeaseOperations: Send + Sync {
    /// Extends the lease, returning its new TTL.
    async fn renew(&self, id: &LeaseId) -> Result<Duration, RenewalError>;
    async fn revoke(&self, id: &LeaseId) -> Result<(), RevocationError>;
    /// Issues a new secret (and lease) from a backend path.
    async fn reissue(&self, path: &str) -> Result<IssuedLease, RenewalError>;
}
