use crate::domain_model::{CredentialState, Lease, LeaseId};
use crate::domain_port::TaskHandle;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Identifies one scheduling of one registry entry. Every mutation coming
/// from a timer must present the ticket it was armed with; anything else is
/// a stale or duplicate fire and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

struct Entry {
    lease: Lease,
    ticket: Ticket,
    task: Option<TaskHandle>,
}

impl Entry {
    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }
}

/// In-memory registry of active leases. All mutations for one id are
/// serialized by the map's entry lock.
#[derive(Default)]
pub struct LeaseRegistry {
    entries: DashMap<LeaseId, Entry>,
    next_ticket: AtomicU64,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue_ticket(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    /// Inserts `lease` as ACTIVE, replacing any entry with the same id.
    /// Returns the ticket to arm with, the stored snapshot and the replaced
    /// lease (whose pending task has been cancelled).
    pub fn insert(&self, mut lease: Lease) -> (Ticket, Lease, Option<Lease>) {
        lease.state = CredentialState::Active;
        lease.attempts = 0;
        let ticket = self.issue_ticket();
        let stored = lease.clone();
        let replaced = self.entries.insert(
            lease.id.clone(),
            Entry {
                lease,
                ticket,
                task: None,
            },
        );
        let replaced = replaced.map(|mut entry| {
            entry.cancel_task();
            entry.lease
        });
        (ticket, stored, replaced)
    }

    /// Stores the handle of the task armed with `ticket`. A handle for a
    /// ticket that is no longer current is cancelled instead.
    pub fn attach_task(&self, id: &LeaseId, ticket: Ticket, handle: TaskHandle) -> bool {
        if let Some(mut entry) = self.entries.get_mut(id) {
            if entry.ticket == ticket {
                entry.task = Some(handle);
                return true;
            }
        }
        handle.cancel();
        false
    }

    /// Marks the lease RENEWING. Only one caller per ticket can win.
    pub fn begin_renewal(&self, id: &LeaseId, ticket: Ticket) -> Option<Lease> {
        let mut entry = self.entries.get_mut(id)?;
        if entry.ticket != ticket || !entry.lease.state.can_transition_to(CredentialState::Renewing)
        {
            return None;
        }
        entry.lease.state = CredentialState::Renewing;
        entry.task = None;
        Some(entry.lease.clone())
    }

    /// RENEWING -> ACTIVE with a fresh issue time. Returns the ticket for
    /// the next renewal.
    pub fn complete_renewal(
        &self,
        id: &LeaseId,
        ticket: Ticket,
        ttl: Duration,
        now: Instant,
    ) -> Option<(Ticket, Lease)> {
        let mut entry = self.entries.get_mut(id)?;
        if entry.ticket != ticket || entry.lease.state != CredentialState::Renewing {
            return None;
        }
        let next = self.issue_ticket();
        entry.ticket = next;
        let lease = &mut entry.lease;
        lease.ttl = ttl;
        lease.issued_at = now;
        lease.last_renewed = Some(now);
        lease.state = CredentialState::Active;
        lease.attempts = 0;
        Some((next, lease.clone()))
    }

    /// RENEWING -> ERROR, counting the failed attempt.
    pub fn record_failure(&self, id: &LeaseId, ticket: Ticket) -> Option<Lease> {
        let mut entry = self.entries.get_mut(id)?;
        if entry.ticket != ticket || entry.lease.state != CredentialState::Renewing {
            return None;
        }
        entry.lease.state = CredentialState::Error;
        entry.lease.attempts += 1;
        Some(entry.lease.clone())
    }

    /// Issues a new ticket for a retry of a lease in ERROR.
    pub fn rearm(&self, id: &LeaseId, ticket: Ticket) -> Option<Ticket> {
        let mut entry = self.entries.get_mut(id)?;
        if entry.ticket != ticket || entry.lease.state != CredentialState::Error {
            return None;
        }
        let next = self.issue_ticket();
        entry.ticket = next;
        Some(next)
    }

    /// Removes the entry into a terminal state. Succeeds at most once per
    /// entry, and only for the current ticket.
    pub fn retire(&self, id: &LeaseId, ticket: Ticket, terminal: CredentialState) -> Option<Lease> {
        debug_assert!(terminal.is_terminal());
        let (_, mut entry) = self.entries.remove_if(id, |_, entry| {
            entry.ticket == ticket && entry.lease.state.can_transition_to(terminal)
        })?;
        entry.cancel_task();
        entry.lease.state = terminal;
        Some(entry.lease)
    }

    /// Unconditional removal. The pending task, if any, is cancelled before
    /// this returns; a task already past its timer finds no entry.
    pub fn remove(&self, id: &LeaseId) -> Option<Lease> {
        let (_, mut entry) = self.entries.remove(id)?;
        entry.cancel_task();
        Some(entry.lease)
    }

    pub fn drain(&self) -> Vec<Lease> {
        let ids: Vec<LeaseId> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn lookup(&self, id: &LeaseId) -> Option<Lease> {
        self.entries.get(id).map(|entry| entry.lease.clone())
    }

    pub fn list(&self) -> Vec<Lease> {
        let mut leases: Vec<Lease> = self
            .entries
            .iter()
            .map(|entry| entry.lease.clone())
            .collect();
        leases.sort_by(|a, b| a.id.cmp(&b.id));
        leases
    }

    pub fn has_pending_task(&self, id: &LeaseId) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.task.as_ref().is_some_and(|task| !task.is_cancelled()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
