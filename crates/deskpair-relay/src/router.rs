//! Relay router: binds live connections to session roles and moves payloads
//! and lifecycle notifications between the two ends of each session.
//!
//! The router keeps a reverse index from connection to its binding, so
//! detach is a direct lookup. Deliveries go through bounded per-connection
//! outboxes with `try_send`; a full or closed outbox drops the event.

use std::sync::Arc;

use dashmap::DashMap;
use deskpair_common::{ConnectionId, RelayError, SessionId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::protocol::{Payload, Role, SessionStatus};
use crate::session::SharedSessionRegistry;

/// Something the router wants written to a connection's socket.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Attached { session_id: SessionId, role: Role },
    PartnerConnected(Role),
    PartnerDisconnected(Role),
    ConnectionStatus(SessionStatus),
    Payload(Payload),
}

/// Router-side record of which slot a connection holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub session_id: SessionId,
    pub role: Role,
    epoch: u64,
}

/// What happened to a relayed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The other role is empty.
    NoPartner,
    /// The partner's outbox was full or already closed.
    Dropped,
}

pub struct RelayRouter {
    registry: SharedSessionRegistry,
    outboxes: DashMap<ConnectionId, mpsc::Sender<RelayEvent>>,
    bindings: DashMap<ConnectionId, Binding>,
}

impl RelayRouter {
    pub fn new(registry: SharedSessionRegistry) -> Self {
        Self {
            registry,
            outboxes: DashMap::new(),
            bindings: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &SharedSessionRegistry {
        &self.registry
    }

    /// Register a freshly opened connection's outbox.
    pub fn open(&self, connection: ConnectionId, outbox: mpsc::Sender<RelayEvent>) {
        self.outboxes.insert(connection, outbox);
    }

    /// Bind `connection` to `role` in `session_id`.
    ///
    /// Any previous occupant of the slot loses its binding silently. If the
    /// connection was bound elsewhere, that old slot is released afterwards.
    pub fn attach(
        &self,
        connection: ConnectionId,
        session_id: &SessionId,
        role: Role,
    ) -> Result<(), RelayError> {
        let outcome = self.registry.bind_role(session_id, role, connection)?;

        let previous = self.bindings.insert(
            connection,
            Binding {
                session_id: session_id.clone(),
                role,
                epoch: outcome.epoch,
            },
        );

        if let Some(old) = outcome.superseded.filter(|o| o.connection != connection) {
            self.bindings
                .remove_if(&old.connection, |_, b| b.epoch == old.epoch);
            info!(
                session = %session_id,
                role = %role,
                superseded = %old.connection,
                connection = %connection,
                "Role taken over by new connection"
            );
        }

        if let Some(previous) = previous {
            self.release(connection, previous);
        }

        info!(session = %session_id, role = %role, connection = %connection, "Client attached");

        self.notify(
            connection,
            RelayEvent::Attached {
                session_id: session_id.clone(),
                role,
            },
        );

        if let Some(partner) = outcome.partner.filter(|p| p.connection != connection) {
            self.notify(partner.connection, RelayEvent::PartnerConnected(role));
            self.notify(connection, RelayEvent::PartnerConnected(role.other()));
        }

        self.broadcast_status(session_id);
        Ok(())
    }

    /// Forward `payload` unmodified to the other role of the sender's session.
    pub fn relay(&self, connection: ConnectionId, payload: Payload) -> Result<Delivery, RelayError> {
        let binding = self
            .bindings
            .get(&connection)
            .map(|b| b.value().clone())
            .ok_or(RelayError::NotBound(connection))?;

        let target = match self.registry.relay_target(
            &binding.session_id,
            binding.role,
            connection,
            binding.epoch,
        ) {
            Ok(target) => target,
            Err(e @ RelayError::SessionNotFound(_)) => {
                // Session swept underneath a live binding; forget it so the
                // connection starts over with a fresh attach.
                self.bindings
                    .remove_if(&connection, |_, b| b.epoch == binding.epoch);
                info!(session = %binding.session_id, connection = %connection, "Relay into expired session");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let Some(partner) = target else {
            return Ok(Delivery::NoPartner);
        };
        if self.notify(partner, RelayEvent::Payload(payload)) {
            Ok(Delivery::Delivered)
        } else {
            Ok(Delivery::Dropped)
        }
    }

    /// Drop the connection's binding, tell the partner, and delete the
    /// session once both roles are empty.
    pub fn detach(&self, connection: ConnectionId) {
        if let Some((_, binding)) = self.bindings.remove(&connection) {
            self.release(connection, binding);
        }
    }

    /// Detach and forget the connection's outbox. Runs on every socket close.
    pub fn close(&self, connection: ConnectionId) {
        self.detach(connection);
        self.outboxes.remove(&connection);
    }

    /// Current binding of a connection, if any.
    pub fn binding(&self, connection: ConnectionId) -> Option<Binding> {
        self.bindings.get(&connection).map(|b| b.value().clone())
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    fn release(&self, connection: ConnectionId, binding: Binding) {
        let Some(release) =
            self.registry
                .release_role(&binding.session_id, binding.role, binding.epoch)
        else {
            debug!(
                session = %binding.session_id,
                connection = %connection,
                "Binding already superseded or session gone"
            );
            return;
        };

        info!(
            session = %binding.session_id,
            role = %binding.role,
            connection = %connection,
            "Client detached"
        );

        if let Some(partner) = release.partner.filter(|p| *p != connection) {
            self.notify(partner, RelayEvent::PartnerDisconnected(binding.role));
        }

        self.registry.delete_if_empty(&binding.session_id);
    }

    fn broadcast_status(&self, session_id: &SessionId) {
        let Ok(session) = self.registry.get(session_id) else {
            return;
        };
        let status = session.status();
        for connection in session.occupants() {
            self.notify(connection, RelayEvent::ConnectionStatus(status));
        }
    }

    /// Queue an event for a connection. Returns whether it was queued.
    fn notify(&self, connection: ConnectionId, event: RelayEvent) -> bool {
        let Some(outbox) = self.outboxes.get(&connection) else {
            debug!(connection = %connection, "No outbox for connection");
            return false;
        };
        match outbox.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %connection, "Outbox full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %connection, "Outbox closed");
                false
            }
        }
    }
}

/// Shared router handle.
pub type SharedRelayRouter = Arc<RelayRouter>;
