use std::time::Duration;

use deskpair_common::DEFAULT_TOKEN_LENGTH;
use serde::{Deserialize, Serialize};

/// Session token and idle-expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Characters in a generated session token.
    pub token_length: usize,
    /// Seconds without a bind or relay before a session may be swept.
    pub idle_timeout_secs: u64,
    /// Seconds between sweeps.
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_length: DEFAULT_TOKEN_LENGTH,
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}
