pub mod errors;
pub mod id;

pub use errors::{ConfigError, DeskpairError, RelayError};
pub use id::{ConnectionId, SessionId, DEFAULT_TOKEN_LENGTH};
