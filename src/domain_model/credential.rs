use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for deadlines past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + span`, saturating to roughly thirty years out instead of
/// overflowing on backend-supplied TTLs.
pub fn deadline_after(start: Instant, span: Duration) -> Instant {
    start
        .checked_add(span)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(pub String);

impl LeaseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LeaseId {
    fn from(value: &str) -> Self {
        LeaseId(value.to_owned())
    }
}

impl From<String> for LeaseId {
    fn from(value: String) -> Self {
        LeaseId(value)
    }
}

/// Lifecycle state shared by the session and every lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialState {
    Active,
    Renewing,
    Rotated,
    Expired,
    Error,
}

impl CredentialState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CredentialState::Rotated | CredentialState::Expired)
    }

    /// ACTIVE -> RENEWING -> {ACTIVE, ERROR}; ACTIVE/ERROR -> {ROTATED, EXPIRED}.
    pub fn can_transition_to(self, next: CredentialState) -> bool {
        use CredentialState::*;
        matches!(
            (self, next),
            (Active | Error, Renewing)
                | (Renewing, Active | Error)
                | (Active | Error, Rotated | Expired)
        )
    }
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialState::Active => "ACTIVE",
            CredentialState::Renewing => "RENEWING",
            CredentialState::Rotated => "ROTATED",
            CredentialState::Expired => "EXPIRED",
            CredentialState::Error => "ERROR",
        };
        f.write_str(name)
    }
}
