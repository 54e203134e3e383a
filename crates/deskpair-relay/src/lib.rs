//! deskpair-relay: session pairing and relay broker.
//!
//! Hands out short session tokens, binds at most one producer and one
//! consumer socket to each token, and forwards messages between the pair.
//! Payloads are never inspected. Idle sessions are swept in the background.

pub mod connection;
pub mod http;
pub mod protocol;
pub mod router;
pub mod session;
pub mod sweep;

pub use http::{app, AppState};
pub use protocol::{ClientMessage, Payload, Role, ServerMessage, SessionStatus};
pub use router::{Delivery, RelayEvent, RelayRouter};
pub use session::{Session, SessionRegistry};
pub use sweep::spawn_sweeper;
