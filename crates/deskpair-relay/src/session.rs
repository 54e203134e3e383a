//! Session registry: maps session tokens to their producer/consumer slots.
//!
//! Storage is a `DashMap`, so every mutation of one session holds that
//! session's shard lock and nothing else. Unrelated pairs never contend on a
//! global lock, and the sweep takes the same locks as live traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use deskpair_common::{ConnectionId, RelayError, SessionId, DEFAULT_TOKEN_LENGTH};
use tracing::info;

use crate::protocol::{Role, SessionStatus};

/// The connection holding a slot, tagged with the bind that put it there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub connection: ConnectionId,
    pub epoch: u64,
}

/// A pairing context with one slot per role.
#[derive(Debug, Clone)]
pub struct Session {
    pub producer: Option<Occupant>,
    pub consumer: Option<Occupant>,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            producer: None,
            consumer: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn slot(&self, role: Role) -> Option<Occupant> {
        match role {
            Role::Producer => self.producer,
            Role::Consumer => self.consumer,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Occupant> {
        match role {
            Role::Producer => &mut self.producer,
            Role::Consumer => &mut self.consumer,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.producer.is_none() && self.consumer.is_none()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            exists: true,
            producer_bound: self.producer.is_some(),
            consumer_bound: self.consumer.is_some(),
        }
    }

    /// Connections currently bound to either slot.
    pub fn occupants(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.producer
            .iter()
            .chain(self.consumer.iter())
            .map(|o| o.connection)
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Result of binding a connection into a slot.
#[derive(Debug, Clone, Copy)]
pub struct BindOutcome {
    /// Epoch of this bind; the caller stores it alongside its binding.
    pub epoch: u64,
    /// Whoever held the slot before, now evicted without notice.
    pub superseded: Option<Occupant>,
    /// Occupant of the other role at bind time.
    pub partner: Option<Occupant>,
}

/// Result of a successful conditional release.
#[derive(Debug, Clone, Copy)]
pub struct Release {
    /// Occupant of the other role, still bound.
    pub partner: Option<ConnectionId>,
}

/// Thread-safe session registry.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
    token_length: usize,
    next_epoch: AtomicU64,
}

/// Shared, reference-counted session registry.
pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new(token_length: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            token_length,
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Create an empty session under a fresh token. Collisions regenerate.
    pub fn create(&self) -> SessionId {
        loop {
            let id = SessionId::generate(self.token_length);
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                slot.insert(Session::new(Instant::now()));
                info!(session = %id, "Session created");
                return id;
            }
        }
    }

    /// Snapshot of a session. Does not count as activity.
    pub fn get(&self, id: &SessionId) -> Result<Session, RelayError> {
        self.sessions
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| RelayError::SessionNotFound(id.clone()))
    }

    /// Occupancy of a session; unknown ids report `exists = false`.
    pub fn status(&self, id: &SessionId) -> SessionStatus {
        self.sessions
            .get(id)
            .map(|s| s.status())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn touch(&self, id: &SessionId) -> Result<(), RelayError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.clone()))?;
        session.touch();
        Ok(())
    }

    /// Put `connection` into the `role` slot, evicting any previous occupant.
    pub fn bind_role(
        &self,
        id: &SessionId,
        role: Role,
        connection: ConnectionId,
    ) -> Result<BindOutcome, RelayError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.clone()))?;

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let superseded = session
            .slot_mut(role)
            .replace(Occupant { connection, epoch });
        let partner = session.slot(role.other());
        session.touch();

        Ok(BindOutcome {
            epoch,
            superseded,
            partner,
        })
    }

    /// Empty a slot unconditionally. Unknown sessions and empty slots are fine.
    pub fn clear_role(&self, id: &SessionId, role: Role) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            *session.slot_mut(role) = None;
        }
    }

    /// Empty a slot only if it still holds the bind identified by `epoch`.
    ///
    /// Returns `None` when the slot was already taken over (or the session is
    /// gone), so a superseded connection cannot clear its successor.
    pub fn release_role(&self, id: &SessionId, role: Role, epoch: u64) -> Option<Release> {
        let mut session = self.sessions.get_mut(id)?;
        let slot = session.slot_mut(role);
        if slot.map(|o| o.epoch) != Some(epoch) {
            return None;
        }
        *slot = None;
        Some(Release {
            partner: session.slot(role.other()).map(|o| o.connection),
        })
    }

    /// Resolve where a payload from the `role` slot should go, refreshing
    /// activity. Fails with `SessionNotFound` if the session is gone and with
    /// `NotBound` if `epoch` no longer owns the slot.
    pub fn relay_target(
        &self,
        id: &SessionId,
        role: Role,
        connection: ConnectionId,
        epoch: u64,
    ) -> Result<Option<ConnectionId>, RelayError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.clone()))?;
        if session.slot(role).map(|o| o.epoch) != Some(epoch) {
            return Err(RelayError::NotBound(connection));
        }
        session.touch();
        Ok(session.slot(role.other()).map(|o| o.connection))
    }

    /// True iff neither slot is bound. A missing session has nothing bound.
    pub fn is_empty(&self, id: &SessionId) -> bool {
        self.sessions.get(id).map(|s| s.is_empty()).unwrap_or(true)
    }

    /// Remove a session. Returns whether it existed.
    pub fn delete(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!(session = %id, "Session removed");
        }
        removed
    }

    /// Remove a session only if both slots are empty, atomically with respect
    /// to concurrent binds.
    pub fn delete_if_empty(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove_if(id, |_, s| s.is_empty()).is_some();
        if removed {
            info!(session = %id, "Session removed (both roles gone)");
        }
        removed
    }

    /// Delete every session idle for longer than `idle` as of `now`.
    pub fn sweep_expired(&self, now: Instant, idle: Duration) -> Vec<SessionId> {
        let mut removed = Vec::new();
        self.sessions.retain(|id, session| {
            let expired = now.saturating_duration_since(session.last_activity) > idle;
            if expired {
                removed.push(id.clone());
            }
            !expired
        });
        removed
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LENGTH)
    }
}
