//! Configuration schema types for the relay.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod server;
mod sessions;

pub use logging::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskpairConfig {
    pub server: ServerConfig,
    pub sessions: SessionConfig,
    pub logging: LoggingConfig,
}
