use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Listener and per-connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port for HTTP and WebSocket traffic.
    pub port: u16,
    /// Directory of collaborator pages served at `/`, if any.
    pub static_dir: Option<PathBuf>,
    /// Events queued per connection before further ones are dropped.
    pub outbox_capacity: usize,
    /// Seconds a socket may stay open without attaching. 0 disables the limit.
    pub attach_timeout_secs: u64,
}

impl ServerConfig {
    /// `host:port` as a socket address string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn attach_timeout(&self) -> Option<Duration> {
        (self.attach_timeout_secs > 0).then(|| Duration::from_secs(self.attach_timeout_secs))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            static_dir: None,
            outbox_capacity: 256,
            attach_timeout_secs: 30,
        }
    }
}
