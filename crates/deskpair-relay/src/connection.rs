//! Per-connection handler: attach, then pump frames between the socket and
//! the router until either side goes away.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use deskpair_common::{ConnectionId, RelayError, SessionId};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::protocol::{ClientMessage, Payload, Role, ServerMessage};
use crate::router::{Delivery, RelayEvent, RelayRouter};

type WsSink = SplitSink<WebSocket, Message>;

/// Per-socket limits taken from the server config.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    pub outbox_capacity: usize,
    pub attach_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            attach_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Closes the connection in the router however the handler exits.
struct CloseGuard {
    router: Arc<RelayRouter>,
    connection: ConnectionId,
    peer: SocketAddr,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.router.close(self.connection);
        tracing::info!(peer = %self.peer, connection = %self.connection, "Client disconnected");
    }
}

/// Handle a single WebSocket connection.
///
/// `initial` carries an attach request taken from the upgrade URL.
pub async fn handle_connection(
    socket: WebSocket,
    peer: SocketAddr,
    router: Arc<RelayRouter>,
    options: ConnectionOptions,
    initial: Option<(SessionId, Role)>,
) {
    let connection = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<RelayEvent>(options.outbox_capacity);
    router.open(connection, tx);
    let _guard = CloseGuard {
        router: Arc::clone(&router),
        connection,
        peer,
    };

    let (mut sink, mut stream) = socket.split();
    tracing::info!(peer = %peer, connection = %connection, "Client connected");

    let mut attached = false;
    if let Some((session_id, role)) = initial {
        match try_attach(&router, &mut sink, connection, &session_id, role).await {
            Ok(ok) => attached = ok,
            Err(_) => return,
        }
    }

    let deadline = options.attach_timeout.map(|t| Instant::now() + t);

    loop {
        tokio::select! {
            // Events routed to us → this client's socket
            Some(event) = rx.recv() => {
                if sink.send(encode_event(event)).await.is_err() {
                    break;
                }
            }

            // Frames from this client → router
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ClientMessage::parse(text.as_str()) {
                        Ok(ClientMessage::Attach { session_id, role }) => {
                            match try_attach(&router, &mut sink, connection, &session_id, role).await {
                                Ok(ok) => attached |= ok,
                                Err(_) => break,
                            }
                        }
                        Ok(ClientMessage::Payload { data }) => {
                            if relay(&router, &mut sink, connection, Payload::Json(data)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(peer = %peer, connection = %connection, error = %e, "Invalid client message");
                            let reply = ServerMessage::error("bad_request", e);
                            if send_message(&mut sink, &reply).await.is_err() {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Binary(bytes))) => {
                        if relay(&router, &mut sink, connection, Payload::Binary(bytes.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    // Pongs are queued by the socket itself.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %peer, connection = %connection, error = %e, "WS error");
                        break;
                    }
                }
            }

            _ = attach_deadline(deadline), if !attached => {
                tracing::warn!(peer = %peer, connection = %connection, "No attach before timeout, closing");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Attach and report failure to the client. `Ok(false)` means the attach was
/// refused but the socket is still usable; `Err` means the socket is gone.
async fn try_attach(
    router: &RelayRouter,
    sink: &mut WsSink,
    connection: ConnectionId,
    session_id: &SessionId,
    role: Role,
) -> Result<bool, axum::Error> {
    match router.attach(connection, session_id, role) {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::info!(session = %session_id, connection = %connection, error = %e, "Attach refused");
            send_message(sink, &ServerMessage::error(e.code(), e.to_string())).await?;
            Ok(false)
        }
    }
}

/// Relay a payload. Unbound senders are dropped silently; a session that
/// expired underneath the sender is reported so the client can start over.
async fn relay(
    router: &RelayRouter,
    sink: &mut WsSink,
    connection: ConnectionId,
    payload: Payload,
) -> Result<(), axum::Error> {
    match router.relay(connection, payload) {
        Ok(Delivery::Delivered) => Ok(()),
        Ok(outcome) => {
            tracing::debug!(connection = %connection, ?outcome, "Payload not delivered");
            Ok(())
        }
        Err(RelayError::NotBound(_)) => {
            tracing::debug!(connection = %connection, "Dropping payload from unbound connection");
            Ok(())
        }
        Err(e @ RelayError::SessionNotFound(_)) => {
            send_message(sink, &ServerMessage::error(e.code(), e.to_string())).await
        }
    }
}

async fn attach_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Turn a routed event into the frame the client sees.
fn encode_event(event: RelayEvent) -> Message {
    let message = match event {
        RelayEvent::Payload(Payload::Binary(bytes)) => return Message::Binary(bytes.into()),
        RelayEvent::Payload(Payload::Json(data)) => ServerMessage::Payload { data },
        RelayEvent::Attached { session_id, role } => ServerMessage::Attached { session_id, role },
        RelayEvent::PartnerConnected(role) => ServerMessage::PartnerConnected { role },
        RelayEvent::PartnerDisconnected(role) => ServerMessage::PartnerDisconnected { role },
        RelayEvent::ConnectionStatus(status) => ServerMessage::ConnectionStatus {
            producer_bound: status.producer_bound,
            consumer_bound: status.consumer_bound,
        },
    };
    Message::Text(message.to_json().into())
}

/// Send a ServerMessage as a JSON text frame.
async fn send_message(sink: &mut WsSink, message: &ServerMessage) -> Result<(), axum::Error> {
    sink.send(Message::Text(message.to_json().into())).await
}
