use super::{Lease, LeaseId};
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum LeaseEvent {
    Created {
        lease: Lease,
    },
    Renewed {
        lease: Lease,
    },
    Rotated {
        previous: LeaseId,
        lease: Lease,
    },
    Revoked {
        id: LeaseId,
        path: String,
    },
    Expired {
        id: LeaseId,
        path: String,
    },
    Error {
        id: LeaseId,
        path: String,
        attempt: u32,
        error: String,
        retrying: bool,
    },
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoggedIn {
        fingerprint: String,
        ttl: Option<Duration>,
    },
    TokenRenewed {
        fingerprint: String,
        ttl: Option<Duration>,
    },
    TokenExpired {
        fingerprint: String,
    },
    TokenRevoked {
        fingerprint: String,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    Lease(LeaseEvent),
    Session(SessionEvent),
}

#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl LifecycleEvent {
    pub fn lease(event: LeaseEvent) -> Self {
        Self {
            occurred_at: Utc::now(),
            payload: EventPayload::Lease(event),
        }
    }

    pub fn session(event: SessionEvent) -> Self {
        Self {
            occurred_at: Utc::now(),
            payload: EventPayload::Session(event),
        }
    }

    /// The lease this event concerns. For rotations this is the new lease.
    pub fn lease_id(&self) -> Option<&LeaseId> {
        match &self.payload {
            EventPayload::Lease(event) => Some(match event {
                LeaseEvent::Created { lease }
                | LeaseEvent::Renewed { lease }
                | LeaseEvent::Rotated { lease, .. } => &lease.id,
                LeaseEvent::Revoked { id, .. }
                | LeaseEvent::Expired { id, .. }
                | LeaseEvent::Error { id, .. } => id,
            }),
            EventPayload::Session(_) => None,
        }
    }

    pub fn concerns(&self, id: &LeaseId) -> bool {
        match &self.payload {
            EventPayload::Lease(LeaseEvent::Rotated { previous, lease }) => {
                previous == id || &lease.id == id
            }
            _ => self.lease_id() == Some(id),
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.payload {
            EventPayload::Lease(event) => match event {
                LeaseEvent::Created { .. } => "CREATED",
                LeaseEvent::Renewed { .. } => "RENEWED",
                LeaseEvent::Rotated { .. } => "ROTATED",
                LeaseEvent::Revoked { .. } => "REVOKED",
                LeaseEvent::Expired { .. } => "EXPIRED",
                LeaseEvent::Error { .. } => "ERROR",
            },
            EventPayload::Session(event) => match event {
                SessionEvent::LoggedIn { .. } => "LOGGED_IN",
                SessionEvent::TokenRenewed { .. } => "TOKEN_RENEWED",
                SessionEvent::TokenExpired { .. } => "TOKEN_EXPIRED",
                SessionEvent::TokenRevoked { .. } => "TOKEN_REVOKED",
                SessionEvent::Error { .. } => "ERROR",
            },
        }
    }
}
