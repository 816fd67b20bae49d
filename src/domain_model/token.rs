use super::{CredentialState, deadline_after};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Session token. Formatting shows a fingerprint, never the value.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultToken(String);

impl VaultToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for VaultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultToken({})", self.fingerprint())
    }
}

impl fmt::Display for VaultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{}", self.fingerprint())
    }
}

/// What a login or a token self-renewal hands back.
#[derive(Debug, Clone)]
pub struct LoginToken {
    pub token: VaultToken,
    /// `None` for tokens that never expire.
    pub ttl: Option<Duration>,
    pub renewable: bool,
}

/// Snapshot of the live session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: VaultToken,
    pub ttl: Option<Duration>,
    pub renewable: bool,
    pub issued_at: Instant,
    pub last_renewed: Option<Instant>,
    pub state: CredentialState,
    pub attempts: u32,
}

impl Session {
    pub fn from_login(login: LoginToken, now: Instant) -> Self {
        Self {
            token: login.token,
            ttl: login.ttl,
            renewable: login.renewable,
            issued_at: now,
            last_renewed: None,
            state: CredentialState::Active,
            attempts: 0,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.ttl.map(|ttl| deadline_after(self.issued_at, ttl))
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        match self.expires_at() {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}
