use serde::{Deserialize, Serialize};

/// Log output settings. `RUST_LOG`, when set, wins over `filter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "deskpair_relay=info,tower_http=info".into(),
        }
    }
}
