use super::{CredentialState, LeaseId, deadline_after};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Secret material handed out with a lease. Owned by the caller and never
/// inspected here.
pub type SecretPayload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseMode {
    /// Renew until the backend refuses, then expire.
    #[default]
    Renew,
    /// Renew until retries run out, then reissue from the lease path.
    Rotate,
}

/// A lease as returned by the backend when a secret is (re)issued.
#[derive(Debug, Clone)]
pub struct IssuedLease {
    pub id: LeaseId,
    pub payload: SecretPayload,
    pub ttl: Duration,
    pub renewable: bool,
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub id: LeaseId,
    pub path: String,
    pub payload: Arc<SecretPayload>,
    pub ttl: Duration,
    pub renewable: bool,
    pub mode: LeaseMode,
    pub issued_at: Instant,
    pub last_renewed: Option<Instant>,
    pub state: CredentialState,
    pub attempts: u32,
}

impl Lease {
    pub fn new(
        id: impl Into<LeaseId>,
        path: impl Into<String>,
        payload: SecretPayload,
        ttl: Duration,
        renewable: bool,
        mode: LeaseMode,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            payload: Arc::new(payload),
            ttl,
            renewable,
            mode,
            issued_at: Instant::now(),
            last_renewed: None,
            state: CredentialState::Active,
            attempts: 0,
        }
    }

    pub fn from_issued(path: impl Into<String>, issued: IssuedLease, mode: LeaseMode) -> Self {
        Self::new(
            issued.id,
            path,
            issued.payload,
            issued.ttl,
            issued.renewable,
            mode,
        )
    }

    pub fn expires_at(&self) -> Instant {
        deadline_after(self.issued_at, self.ttl)
    }

    pub fn supports_rotation(&self) -> bool {
        self.mode == LeaseMode::Rotate
    }
}
